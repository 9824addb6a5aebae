use std::{sync::Arc, thread};

use schwa::{SymbolEnvironment, Type};

#[test]
fn define_is_idempotent() {
    let env = SymbolEnvironment::new();
    let first = env.define("x", Type::Int);
    let second = env.define("x", Type::String);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.ty(), &Type::Int);
}

#[test]
fn lookup_walks_parents() {
    let root = SymbolEnvironment::new();
    let outer = root.define("x", Type::Int);
    let child = SymbolEnvironment::with_parent(&root);
    let found = child.lookup("x").expect("visible from child");
    assert_eq!(found.id(), outer.id());
    assert!(child.is_defined("x"));
    assert!(!child.is_defined_locally("x"));
}

#[test]
fn child_definitions_shadow_and_stay_local() {
    let root = SymbolEnvironment::new();
    let outer = root.define("x", Type::Int);
    let child = SymbolEnvironment::with_parent(&root);
    let inner = child.define("x", Type::String);
    child.define("y", Type::Bool);
    assert_ne!(inner.id(), outer.id());
    assert_eq!(child.lookup("x").expect("shadowed").ty(), &Type::String);
    assert!(root.lookup("y").is_none());
    assert!(child.parent().is_some());
}

#[test]
fn concurrent_definitions_converge_on_one_binding() {
    let root = SymbolEnvironment::new();
    let bindings: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| root.define("shared", Type::Long)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect()
    });
    let first = &bindings[0];
    assert!(bindings.iter().all(|binding| Arc::ptr_eq(binding, first)));
}

#[test]
fn children_of_a_shared_root_compile_in_parallel() {
    let root = SymbolEnvironment::new();
    root.define("base", Type::Int);
    thread::scope(|scope| {
        for idx in 0..4 {
            let root = &root;
            scope.spawn(move || {
                let child = SymbolEnvironment::with_parent(root);
                let name = format!("local{idx}");
                child.define(&name, Type::Int);
                assert!(child.is_defined("base"));
                assert!(child.is_defined(&name));
            });
        }
    });
    assert!(!root.is_defined("local0"));
}
