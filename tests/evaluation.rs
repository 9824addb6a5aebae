use indexmap::IndexMap;
use rust_decimal::Decimal;
use schwa::{
    compile,
    diagnostics::{DiagnosticKind, ErrorCode, SchwaError},
    run, Closure, CompileOptions, Engine, Type, TypeDef, Value,
};
use std::{str::FromStr, sync::Arc};

fn eval(source: &str) -> Value {
    compile(source)
        .and_then(|unit| unit.invoke())
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> SchwaError {
    match compile(source).and_then(|unit| unit.invoke()) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn error_code(source: &str) -> ErrorCode {
    eval_error(source).code().expect("diagnostic error")
}

fn expect_int(value: &Value) -> i32 {
    match value {
        Value::Int(n) => *n,
        other => panic!("expected int, found {}", other.type_name()),
    }
}

fn expect_closure(value: Value) -> Closure {
    match value.as_closure() {
        Some(closure) => closure.clone(),
        None => panic!("expected lambda, found {}", value.type_name()),
    }
}

fn zoo() -> Engine {
    let mut engine = Engine::new();
    let animal = engine.register_type(TypeDef::new("Animal"));
    engine.register_type(
        TypeDef::new("Dog")
            .with_base(animal.clone())
            .with_constructor(vec![], |_| Ok(Value::object("Dog", ()))),
    );
    engine.register_type(
        TypeDef::new("Cat")
            .with_base(animal)
            .with_constructor(vec![], |_| Ok(Value::object("Cat", ()))),
    );
    engine.register_type(
        TypeDef::new("Point")
            .with_constructor(vec![Type::Int, Type::Int], |args| match args {
                [Value::Int(x), Value::Int(y)] => Ok(Value::object("Point", (*x, *y))),
                _ => Err("Point expects two ints".into()),
            })
            .with_constructor(vec![Type::String], |_| Err("cannot parse points yet".into()))
            .with_indexer(vec![Type::String], Type::Int, |target, args| {
                let (x, y) = target
                    .as_object()
                    .and_then(|object| object.downcast_ref::<(i32, i32)>())
                    .ok_or("not a point")?;
                match args.first().and_then(Value::as_str) {
                    Some("x") => Ok(Value::Int(*x)),
                    Some("y") => Ok(Value::Int(*y)),
                    _ => Err("unknown coordinate".into()),
                }
            }),
    );
    engine
}

#[test]
fn evaluates_arithmetic() {
    assert_eq!(run::<i32>("(+ 1 2 3)").expect("run"), 6);
    assert_eq!(run::<i32>("(* (+ 1 2) 4)").expect("run"), 12);
    assert_eq!(run::<i32>("(- 10 3 2)").expect("run"), 5);
    assert_eq!(run::<i32>("(% 17 5)").expect("run"), 2);
    assert_eq!(run::<f64>("(/ 7.0 2.0)").expect("run"), 3.5);
}

#[test]
fn single_operand_nary_form_yields_operand() {
    assert_eq!(expect_int(&eval("(+ 5)")), 5);
}

#[test]
fn integer_arithmetic_wraps() {
    assert_eq!(expect_int(&eval("(+ 2147483647 1)")), i32::MIN);
}

#[test]
fn integer_division_by_zero_fails() {
    assert_eq!(error_code("(/ 1 0)"), ErrorCode::DivideByZero);
    assert_eq!(error_code("(% 1l 0l)"), ErrorCode::DivideByZero);
}

#[test]
fn decimal_arithmetic_is_exact_and_checked() {
    let sum = run::<Decimal>("(+ 0.1m 0.2m)").expect("run");
    assert_eq!(sum, Decimal::from_str("0.3").expect("decimal"));
    assert_eq!(
        error_code("(* 79228162514264337593543950335m 2m)"),
        ErrorCode::Overflow
    );
}

#[test]
fn conditional_selects_branch() {
    assert_eq!(run::<String>("(if (> 3 2) \"a\" \"b\")").expect("run"), "a");
    assert_eq!(run::<String>("(?: (< 3 2) \"a\" \"b\")").expect("run"), "b");
}

#[test]
fn conditional_requires_bool_and_matching_branches() {
    assert_eq!(error_code("(if 1 2 3)"), ErrorCode::TypeMismatch);
    assert_eq!(error_code("(if true 1 \"a\")"), ErrorCode::TypeMismatch);
}

#[test]
fn list_literal_infers_element_type() {
    let unit = compile("[1 2 3]").expect("compile");
    assert_eq!(*unit.ty(), Type::list(Type::Int));
    assert_eq!(unit.run::<Vec<i32>>().expect("run"), vec![1, 2, 3]);
}

#[test]
fn mixed_list_widens_to_object() {
    let unit = compile("[1 \"a\"]").expect("compile");
    assert_eq!(*unit.ty(), Type::list(Type::Object));
}

#[test]
fn empty_list_has_no_element_type() {
    assert_eq!(error_code("[]"), ErrorCode::NoCommonBaseType);
}

#[test]
fn mapping_literal_infers_key_and_value_types() {
    let unit = compile("{ \"a\" 1 \"b\" 2 }").expect("compile");
    assert_eq!(*unit.ty(), Type::map(Type::String, Type::Int));
    let map = unit.run::<IndexMap<String, i32>>().expect("run");
    assert_eq!(map.len(), 2);
    assert_eq!(map["b"], 2);
}

#[test]
fn mapping_literal_errors() {
    assert_eq!(error_code("{ \"a\" }"), ErrorCode::ArityMismatch);
    assert_eq!(error_code("{ \"a\" 1 \"a\" 2 }"), ErrorCode::DuplicateKey);
}

#[test]
fn lambda_is_callable_from_host() {
    let closure = run::<Closure>("(=> ((int x)) (+ x 1))").expect("run");
    assert_eq!(closure.arity(), 1);
    assert_eq!(*closure.ty(), Type::function(vec![Type::Int], Type::Int));
    let result = closure.call(&[Value::Int(5)]).expect("call");
    assert_eq!(expect_int(&result), 6);
}

#[test]
fn nested_lambdas_capture_outer_parameters() {
    let outer = expect_closure(eval("(=> ((int x)) (=> ((int y)) (- x y)))"));
    let inner = expect_closure(outer.call(&[Value::Int(10)]).expect("call outer"));
    let result = inner.call(&[Value::Int(3)]).expect("call inner");
    assert_eq!(expect_int(&result), 7);
}

#[test]
fn lambda_call_checks_arguments() {
    let closure = run::<Closure>("(=> ((int x) (string s)) s)").expect("run");
    let arity = closure.call(&[Value::Int(1)]).expect_err("arity");
    assert_eq!(arity.code(), Some(ErrorCode::ArityMismatch));
    let mismatch = closure
        .call(&["x".into(), "y".into()])
        .expect_err("type mismatch");
    assert_eq!(mismatch.code(), Some(ErrorCode::TypeMismatch));
    let ok = closure.call(&[Value::Int(1), Value::Null]).expect("null string");
    assert!(ok.is_null());
}

#[test]
fn lambda_rejects_malformed_parameters() {
    assert_eq!(error_code("(=> ((int x) (int x)) x)"), ErrorCode::MalformedForm);
    assert_eq!(error_code("(=> (int x) x)"), ErrorCode::MalformedForm);
    assert_eq!(error_code("(=> [(int x)] x)"), ErrorCode::MalformedForm);
    assert_eq!(error_code("(=> ((whatever x)) x)"), ErrorCode::UnresolvedType);
}

#[test]
fn undefined_variable_is_named() {
    let err = eval_error("(+ 1 undefined_var)");
    assert_eq!(err.code(), Some(ErrorCode::UndefinedVariable));
    assert!(err.to_string().contains("undefined_var"));
    let location = err.location().expect("location");
    assert_eq!((location.line, location.column), (1, 6));
}

#[test]
fn lenient_closers_are_accepted() {
    assert_eq!(expect_int(&eval("(+ 1 2]")), 3);
}

#[test]
fn strict_engine_rejects_mismatched_closers() {
    let engine = Engine::with_options(CompileOptions {
        strict_brackets: true,
        ..CompileOptions::default()
    });
    let err = engine.compile("(+ 1 2]").expect_err("mismatched closer");
    assert_eq!(err.code(), Some(ErrorCode::MismatchedCloser));
}

#[test]
fn compile_rejects_trailing_content() {
    assert_eq!(error_code("(+ 1 2) 3"), ErrorCode::TrailingContent);
}

#[test]
fn malformed_forms_are_reported() {
    assert_eq!(error_code("()"), ErrorCode::EmptyForm);
    assert_eq!(error_code("(frobnicate 1)"), ErrorCode::UnsupportedForm);
    assert_eq!(error_code("((+ 1 2) 3)"), ErrorCode::UnsupportedForm);
    assert_eq!(error_code("(! true false)"), ErrorCode::ArityMismatch);
    assert_eq!(error_code("(+)"), ErrorCode::ArityMismatch);
}

#[test]
fn nesting_beyond_the_limit_is_rejected() {
    let engine = Engine::with_options(CompileOptions {
        max_depth: 3,
        ..CompileOptions::default()
    });
    assert!(engine.compile("(+ 1 (+ 1 (+ 1 1)))").is_ok());
    let err = engine
        .compile("(+ 1 (+ 1 (+ 1 (+ 1 1))))")
        .expect_err("too deep");
    assert_eq!(err.code(), Some(ErrorCode::TooDeeplyNested));
}

#[test]
fn very_deep_source_is_rejected_not_crashed() {
    let depth = 200_000;
    let source = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
    let err = Engine::new().compile(&source).expect_err("too deep");
    assert_eq!(err.code(), Some(ErrorCode::TooDeeplyNested));
}

#[test]
fn unary_operators() {
    assert_eq!(run::<bool>("(! true)").expect("run"), false);
    assert_eq!(run::<i32>("(~ 5)").expect("run"), -6);
    assert_eq!(run::<i32>("(! 0)").expect("run"), -1);
    assert_eq!(run::<i32>("(++ 41)").expect("run"), 42);
    assert_eq!(run::<f64>("(-- 1.5)").expect("run"), 0.5);
    assert_eq!(error_code("(~ true)"), ErrorCode::OperatorNotDefined);
}

#[test]
fn operands_must_share_a_type() {
    assert_eq!(error_code("(+ 1 1l)"), ErrorCode::OperatorNotDefined);
    assert_eq!(error_code("(< \"a\" \"b\")"), ErrorCode::OperatorNotDefined);
}

#[test]
fn strings_concatenate() {
    assert_eq!(run::<String>("(+ \"ab\" \"cd\" \"e\")").expect("run"), "abcde");
}

#[test]
fn comparisons_and_equality() {
    assert!(run::<bool>("(<= 2 2)").expect("run"));
    assert!(run::<bool>("(>= 2.5 1.5)").expect("run"));
    assert!(run::<bool>("(== \"a\" \"a\")").expect("run"));
    assert!(run::<bool>("(!= 1u 2u)").expect("run"));
    assert!(run::<bool>("(== null \"x\")").map(|eq| !eq).expect("run"));
}

#[test]
fn collections_compare_by_reference() {
    assert!(!run::<bool>("(== [1] [1])").expect("run"));
    assert!(run::<bool>("(!= { \"a\" 1 } { \"a\" 1 })").expect("run"));

    let mut engine = Engine::new();
    engine
        .define_global("xs", Value::list(Type::Int, vec![Value::Int(1)]))
        .expect("define");
    assert!(engine.run::<bool>("(== xs xs)").expect("run"));
    assert!(!engine.run::<bool>("(== xs [1])").expect("run"));
}

#[test]
fn logical_operators_short_circuit() {
    assert!(!run::<bool>("(&& false (== (/ 1 0) 0))").expect("run"));
    assert!(run::<bool>("(or true (== (/ 1 0) 0))").expect("run"));
    assert!(run::<bool>("(and true true true)").expect("run"));
    assert_eq!(error_code("(&& 1 2)"), ErrorCode::OperatorNotDefined);
}

#[test]
fn bitwise_and_shift_operators() {
    assert_eq!(run::<i32>("(& 12 10)").expect("run"), 8);
    assert_eq!(run::<i32>("(| 12 10)").expect("run"), 14);
    assert_eq!(run::<i32>("(^ 12 10)").expect("run"), 6);
    assert!(run::<bool>("(xor true false)").expect("run"));
    assert!(!run::<bool>("(& true false)").expect("run"));
    assert_eq!(run::<i32>("(<< 1 4)").expect("run"), 16);
    assert_eq!(run::<i32>("(>> -16 2)").expect("run"), -4);
    assert_eq!(run::<i64>("(<< 1l 40)").expect("run"), 1 << 40);
    assert_eq!(error_code("(<< 1 1l)"), ErrorCode::OperatorNotDefined);
}

#[test]
fn coalesce_prefers_non_null_left() {
    assert_eq!(run::<String>("(?? (as string null) \"x\")").expect("run"), "x");
    assert_eq!(run::<String>("(?? \"y\" \"x\")").expect("run"), "y");
    assert_eq!(error_code("(?? 1 2)"), ErrorCode::OperatorNotDefined);
}

#[test]
fn integer_literals_and_suffixes() {
    assert!(matches!(eval("5u"), Value::UInt(5)));
    assert!(matches!(eval("5l"), Value::Long(5)));
    assert!(matches!(eval("5ul"), Value::ULong(5)));
    assert!(matches!(eval("-7"), Value::Int(-7)));
    assert!(matches!(eval("+7"), Value::Int(7)));
    assert!(matches!(eval("2147483648l"), Value::Long(2_147_483_648)));
    assert!(matches!(eval("-2147483648"), Value::Int(i32::MIN)));
    assert_eq!(error_code("2147483648"), ErrorCode::InvalidLiteral);
    assert_eq!(error_code("-1u"), ErrorCode::InvalidLiteral);
}

#[test]
fn floating_literals_and_suffixes() {
    assert_eq!(run::<f64>("1.5").expect("run"), 1.5);
    assert_eq!(run::<f32>(".5f").expect("run"), 0.5);
    assert_eq!(run::<f64>("1e3").expect("run"), 1000.0);
    assert_eq!(run::<f64>("-2.5e-1").expect("run"), -0.25);
    assert_eq!(
        run::<Decimal>("1.5e2m").expect("run"),
        Decimal::from_str("150").expect("decimal")
    );
    assert_eq!(
        run::<Decimal>("-2.25m").expect("run"),
        Decimal::from_str("-2.25").expect("decimal")
    );
}

#[test]
fn keyword_atoms() {
    assert!(eval("null").is_null());
    assert!(run::<bool>("true").expect("run"));
    assert_eq!(*compile("null").expect("compile").ty(), Type::Object);
}

#[test]
fn string_literals_are_interned() {
    let first = eval("\"shared literal\"");
    let second = eval("\"shared literal\"");
    match (first, second) {
        (Value::String(a), Value::String(b)) => assert!(Arc::ptr_eq(&a, &b)),
        _ => panic!("expected strings"),
    }
}

#[test]
fn typeof_and_default() {
    assert_eq!(run::<Type>("(typeof int)").expect("run"), Type::Int);
    assert_eq!(run::<i32>("(default int)").expect("run"), 0);
    assert_eq!(run::<Option<String>>("(default string)").expect("run"), None);
    assert_eq!(error_code("(typeof nothing)"), ErrorCode::UnresolvedType);
}

#[test]
fn type_tests() {
    assert!(run::<bool>("(is int 5)").expect("run"));
    assert!(!run::<bool>("(is string 5)").expect("run"));
    assert!(run::<bool>("(is object \"s\")").expect("run"));
    assert!(!run::<bool>("(is object null)").expect("run"));
}

#[test]
fn as_converts_or_yields_null() {
    assert_eq!(run::<String>("(as string (cast object \"s\"))").expect("run"), "s");
    assert_eq!(
        run::<Option<String>>("(as string (cast object 1))").expect("run"),
        None
    );
    assert_eq!(error_code("(as int 5)"), ErrorCode::InvalidConversion);
}

#[test]
fn numeric_casts() {
    assert_eq!(run::<i64>("(cast long 5)").expect("run"), 5);
    assert_eq!(run::<i32>("(cast int 3.9)").expect("run"), 3);
    assert_eq!(run::<u8>("(cast byte 300)").expect("run"), 44);
    assert_eq!(run::<char>("(cast char 65)").expect("run"), 'A');
    assert_eq!(run::<i32>("(cast int (cast char 97))").expect("run"), 97);
    assert_eq!(
        run::<Decimal>("(cast decimal 7)").expect("run"),
        Decimal::from(7)
    );
    assert_eq!(run::<i32>("(cast int -2.75m)").expect("run"), -2);
    assert_eq!(error_code("(cast int 100000000000m)"), ErrorCode::Overflow);
}

#[test]
fn reference_casts_are_checked() {
    assert_eq!(run::<i32>("(cast int (cast object 5))").expect("run"), 5);
    assert_eq!(error_code("(cast int (cast object \"s\"))"), ErrorCode::InvalidCast);
    assert_eq!(error_code("(cast int (cast object 5l))"), ErrorCode::InvalidCast);
    assert_eq!(error_code("(cast int null)"), ErrorCode::NullReference);
    assert_eq!(error_code("(cast string 5)"), ErrorCode::InvalidConversion);
}

#[test]
fn built_in_indexers() {
    assert_eq!(run::<i32>("(# [10 20 30] 1)").expect("run"), 20);
    assert_eq!(run::<i32>("(# { \"a\" 1 } \"a\")").expect("run"), 1);
    assert_eq!(run::<char>("(# \"hey\" 1)").expect("run"), 'e');
    assert_eq!(
        run::<i32>("(# (# [[1 2] [3 4]] 1) 0)").expect("run"),
        3
    );
}

#[test]
fn indexer_failures() {
    assert_eq!(error_code("(# [1] 5)"), ErrorCode::IndexOutOfRange);
    assert_eq!(error_code("(# [1] -1)"), ErrorCode::IndexOutOfRange);
    assert_eq!(error_code("(# { \"a\" 1 } \"b\")"), ErrorCode::KeyNotFound);
    assert_eq!(error_code("(# 5 0)"), ErrorCode::NoMatchingIndexer);
    assert_eq!(error_code("(# [1] \"a\")"), ErrorCode::NoMatchingIndexer);
    assert_eq!(error_code("(# [1] 0 0)"), ErrorCode::NoMatchingIndexer);
    assert_eq!(error_code("(# (as string null) 0)"), ErrorCode::NullReference);
}

#[test]
fn host_types_construct_and_index() {
    let engine = zoo();
    assert_eq!(engine.run::<i32>("(# (new Point 1 2) \"y\")").expect("run"), 2);
    let unit = engine.compile("(new Point 3 4)").expect("compile");
    assert_eq!(*unit.ty(), Type::named("Point"));
    let err = engine.compile("(new Point 1)").expect_err("no constructor");
    assert_eq!(err.code(), Some(ErrorCode::NoMatchingConstructor));
    let err = engine.compile("(new Nowhere)").expect_err("unknown type");
    assert_eq!(err.code(), Some(ErrorCode::UnresolvedType));
}

#[test]
fn host_callback_errors_surface_as_host_errors() {
    let engine = zoo();
    let err = engine
        .compile("(new Point \"1,2\")")
        .and_then(|unit| unit.invoke())
        .expect_err("constructor fails");
    assert_eq!(err.code(), Some(ErrorCode::Host));
    assert_eq!(err.code().map(ErrorCode::kind), Some(DiagnosticKind::Runtime));
    let err = engine
        .compile("(# (new Point 1 2) \"z\")")
        .and_then(|unit| unit.invoke())
        .expect_err("indexer fails");
    assert_eq!(err.code(), Some(ErrorCode::Host));
}

#[test]
fn collections_widen_to_nearest_shared_base() {
    let engine = zoo();
    let animals = Type::list(Type::named("Animal"));
    for source in ["[(new Dog) (new Cat)]", "[(new Dog) (cast Animal (new Cat))]"] {
        let unit = engine.compile(source).expect("compile");
        assert_eq!(*unit.ty(), animals, "{source}");
    }
    let unit = engine.compile("[(new Dog) 1]").expect("compile");
    assert_eq!(*unit.ty(), Type::list(Type::Object));
}

#[test]
fn downcasts_are_checked_at_runtime() {
    let engine = zoo();
    assert!(engine
        .run::<bool>("(is Dog (cast Animal (new Dog)))")
        .expect("run"));
    let err = engine
        .compile("(cast Dog (cast Animal (new Cat)))")
        .and_then(|unit| unit.invoke())
        .expect_err("bad downcast");
    assert_eq!(err.code(), Some(ErrorCode::InvalidCast));
    assert!(engine
        .run::<Value>("(as Dog (cast Animal (new Cat)))")
        .expect("run")
        .is_null());
}

#[test]
fn globals_are_visible_to_compiled_units() {
    let mut engine = Engine::new();
    engine.define_global("answer", 41).expect("define");
    assert!(engine.root().is_defined("answer"));
    assert_eq!(engine.run::<i32>("(+ answer 1)").expect("run"), 42);
    engine.define_global("answer", 1).expect("redefine");
    assert_eq!(engine.run::<i32>("(+ answer 1)").expect("run"), 2);
    let err = engine.define_global("answer", "text").expect_err("wrong type");
    assert_eq!(err.code(), Some(ErrorCode::TypeMismatch));
}

#[test]
fn lambda_parameters_shadow_globals() {
    let mut engine = Engine::new();
    engine.define_global("x", 100).expect("define");
    let closure = engine.run::<Closure>("(=> ((int x)) (* x 2))").expect("run");
    assert_eq!(expect_int(&closure.call(&[Value::Int(4)]).expect("call")), 8);
}

#[test]
fn host_can_add_type_keywords() {
    let mut engine = Engine::new();
    engine.registry_mut().define_keyword("i32", Type::Int);
    assert_eq!(engine.run::<i32>("(cast i32 5l)").expect("run"), 5);
    let closure = engine.run::<Closure>("(=> ((i32 n)) n)").expect("run");
    assert_eq!(*closure.ty(), Type::function(vec![Type::Int], Type::Int));
    assert_eq!(engine.registry().resolve("i32"), Some(Type::Int));
}

#[test]
fn form_table_accepts_aliases() {
    let mut engine = Engine::new();
    assert!(engine.forms().names().any(|name| name == "=>"));
    assert!(engine.forms().get("plus").is_none());
    assert!(engine.forms_mut().alias("plus", "+"));
    assert!(!engine.forms_mut().alias("nothing", "missing"));
    assert_eq!(engine.run::<i32>("(plus 1 2)").expect("run"), 3);
}

#[test]
fn run_checks_the_requested_type() {
    let err = run::<i32>("\"text\"").expect_err("wrong type");
    assert_eq!(err.code(), Some(ErrorCode::TypeMismatch));
    let value = run::<Value>("[1 2]").expect("any value");
    assert_eq!(value.to_string(), "[1, 2]");
}

#[test]
fn execute_checks_assignability() {
    let unit = compile("(+ 1 2)").expect("compile");
    assert_eq!(expect_int(&unit.execute(&Type::Object).expect("boxed")), 3);
    let err = unit.execute(&Type::String).expect_err("not a string");
    assert_eq!(err.code(), Some(ErrorCode::TypeMismatch));
}

#[test]
fn error_codes_map_to_categories() {
    assert_eq!(ErrorCode::UnexpectedEndOfCombo.kind(), DiagnosticKind::Lexer);
    assert_eq!(ErrorCode::UndefinedVariable.kind(), DiagnosticKind::Parser);
    assert_eq!(ErrorCode::NoCommonBaseType.kind(), DiagnosticKind::Type);
    assert_eq!(ErrorCode::DivideByZero.kind(), DiagnosticKind::Runtime);
}
