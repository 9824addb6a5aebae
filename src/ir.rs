use std::sync::Arc;

use crate::{
    diagnostics::Location,
    environment::Binding,
    types::{Constructor, Indexer, Type},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical not on `bool`, bitwise complement on integers.
    Not,
    OnesComplement,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LeftShift,
    RightShift,
    Coalesce,
    Equal,
    NotEqual,
    /// Non-short-circuit `&`.
    And,
    /// Non-short-circuit `|`.
    Or,
    AndAlso,
    OrElse,
    ExclusiveOr,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::Coalesce => "??",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::OnesComplement => "~",
            UnaryOp::Increment => "++",
            UnaryOp::Decrement => "--",
        }
    }
}

/// A typed expression node. `ty` is the static result type.
#[derive(Debug, Clone)]
pub struct Ir {
    pub kind: IrKind,
    pub ty: Type,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub enum IrKind {
    Constant(Value),
    Variable(Arc<Binding>),
    Unary {
        op: UnaryOp,
        operand: Box<Ir>,
    },
    /// N-ary operator forms are left-folded into nested binary nodes.
    Binary {
        op: BinaryOp,
        left: Box<Ir>,
        right: Box<Ir>,
    },
    Conditional {
        condition: Box<Ir>,
        then: Box<Ir>,
        otherwise: Box<Ir>,
    },
    New {
        constructor: Constructor,
        args: Vec<Ir>,
    },
    Lambda {
        params: Arc<[Arc<Binding>]>,
        body: Arc<Ir>,
    },
    IndexerGet {
        target: Box<Ir>,
        indexer: Indexer,
        args: Vec<Ir>,
    },
    TypeIs {
        operand: Box<Ir>,
        target: Type,
    },
    TypeAs {
        operand: Box<Ir>,
        target: Type,
    },
    Convert {
        operand: Box<Ir>,
        target: Type,
    },
    TypeOf(Type),
    Default(Type),
    ListInit {
        element: Type,
        items: Vec<Ir>,
    },
    MapInit {
        key: Type,
        value: Type,
        entries: Vec<(Ir, Ir)>,
    },
}

impl Ir {
    pub fn new(kind: IrKind, ty: Type, location: Location) -> Self {
        Self { kind, ty, location }
    }
}
