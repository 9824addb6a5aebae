use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, PoisonError, RwLock,
};

use indexmap::IndexMap;

use crate::types::Type;

static NEXT_BINDING: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a binding; runtime frames are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

#[derive(Debug)]
pub struct Binding {
    id: BindingId,
    name: String,
    ty: Type,
}

impl Binding {
    fn new(name: &str, ty: Type) -> Self {
        Self {
            id: BindingId(NEXT_BINDING.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            ty,
        }
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

/// Lexically scoped name table. A child borrows its parent, so a shared root
/// can serve many compilations while each one owns its own child scopes.
#[derive(Debug, Default)]
pub struct SymbolEnvironment<'p> {
    parent: Option<&'p SymbolEnvironment<'p>>,
    bindings: RwLock<IndexMap<String, Arc<Binding>>>,
}

impl<'p> SymbolEnvironment<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: &'p SymbolEnvironment<'p>) -> Self {
        Self {
            parent: Some(parent),
            bindings: RwLock::new(IndexMap::new()),
        }
    }

    /// Defines `name` in this scope. The first definition wins: a later call
    /// with the same name returns the original binding and ignores `ty`.
    pub fn define(&self, name: &str, ty: Type) -> Arc<Binding> {
        if let Some(existing) = self.local(name) {
            return existing;
        }
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let binding = bindings
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Binding::new(name, ty)));
        Arc::clone(binding)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Binding>> {
        self.local(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.local(name).is_some()
    }

    pub fn parent(&self) -> Option<&'p SymbolEnvironment<'p>> {
        self.parent
    }

    fn local(&self, name: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
