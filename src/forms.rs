use indexmap::IndexMap;

use crate::ir::{BinaryOp, UnaryOp};

/// What a leading atom of a `( ... )` combo selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `if` / `?:`
    Conditional,
    /// Left-associative fold over one or more operands.
    NAry(BinaryOp),
    /// `#`: read-only indexer access.
    Index,
    TypeIs,
    TypeAs,
    Cast,
    TypeOf,
    Default,
    New,
    Lambda,
}

/// Operator and special-form dispatch table.
#[derive(Debug, Clone)]
pub struct FormTable {
    forms: IndexMap<String, Form>,
}

impl Default for FormTable {
    fn default() -> Self {
        use BinaryOp::*;
        let forms = [
            ("!", Form::Unary(UnaryOp::Not)),
            ("~", Form::Unary(UnaryOp::OnesComplement)),
            ("++", Form::Unary(UnaryOp::Increment)),
            ("--", Form::Unary(UnaryOp::Decrement)),
            ("<", Form::Binary(Less)),
            ("<=", Form::Binary(LessEqual)),
            (">", Form::Binary(Greater)),
            (">=", Form::Binary(GreaterEqual)),
            ("<<", Form::Binary(LeftShift)),
            (">>", Form::Binary(RightShift)),
            ("??", Form::Binary(Coalesce)),
            ("==", Form::Binary(Equal)),
            ("!=", Form::Binary(NotEqual)),
            ("if", Form::Conditional),
            ("?:", Form::Conditional),
            ("&", Form::NAry(And)),
            ("|", Form::NAry(Or)),
            ("&&", Form::NAry(AndAlso)),
            ("and", Form::NAry(AndAlso)),
            ("||", Form::NAry(OrElse)),
            ("or", Form::NAry(OrElse)),
            ("^", Form::NAry(ExclusiveOr)),
            ("xor", Form::NAry(ExclusiveOr)),
            ("+", Form::NAry(Add)),
            ("-", Form::NAry(Subtract)),
            ("*", Form::NAry(Multiply)),
            ("/", Form::NAry(Divide)),
            ("%", Form::NAry(Modulo)),
            ("#", Form::Index),
            ("is", Form::TypeIs),
            ("as", Form::TypeAs),
            ("cast", Form::Cast),
            ("typeof", Form::TypeOf),
            ("default", Form::Default),
            ("new", Form::New),
            ("=>", Form::Lambda),
        ]
        .into_iter()
        .map(|(name, form)| (name.to_string(), form))
        .collect();
        Self { forms }
    }
}

impl FormTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Form> {
        self.forms.get(name).copied()
    }

    pub fn define(&mut self, name: impl Into<String>, form: Form) {
        self.forms.insert(name.into(), form);
    }

    /// Makes `alias` dispatch like `existing`. Returns false if `existing`
    /// is not in the table.
    pub fn alias(&mut self, alias: impl Into<String>, existing: &str) -> bool {
        match self.get(existing) {
            Some(form) => {
                self.define(alias, form);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }
}
