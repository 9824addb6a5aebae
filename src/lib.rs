//! Schwa: an embeddable expression language written as bracketed prefix
//! forms. Source text is read into a token tree, compiled against a type
//! registry and symbol environment into typed IR, and executed by the
//! runtime.

pub mod compiler;
pub mod diagnostics;
pub mod environment;
pub mod forms;
pub mod ir;
pub mod lexer;
pub mod repl;
pub mod runtime;
pub mod token;
pub mod types;
pub mod value;

pub use compiler::{CompileOptions, Compiler};
pub use diagnostics::{Diagnostic, DiagnosticKind, ErrorCode, Location, Result, SchwaError};
pub use environment::{Binding, SymbolEnvironment};
pub use repl::Repl;
pub use runtime::{CompiledUnit, Engine};
pub use token::{ComboKind, Token, TokenKind};
pub use types::{Type, TypeDef, TypeRegistry};
pub use value::{Closure, FromValue, HostObject, Value};

/// Compiles a single expression with a default [`Engine`].
pub fn compile(source: &str) -> Result<CompiledUnit> {
    Engine::new().compile(source)
}

/// Compiles and runs a single expression, extracting its result as `T`.
pub fn run<T: FromValue>(source: &str) -> Result<T> {
    Engine::new().run(source)
}
