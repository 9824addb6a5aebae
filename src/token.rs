use std::{fmt, mem};

use crate::diagnostics::Location;

/// Which bracket pair delimits a composite token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboKind {
    /// `( ... )`: operator or special-form application.
    Paren,
    /// `[ ... ]`: ordered collection literal.
    Square,
    /// `{ ... }`: mapping literal, children alternate key and value.
    Curly,
}

impl ComboKind {
    pub fn from_opener(ch: char) -> Option<Self> {
        match ch {
            '(' => Some(ComboKind::Paren),
            '[' => Some(ComboKind::Square),
            '{' => Some(ComboKind::Curly),
            _ => None,
        }
    }

    pub fn from_closer(ch: char) -> Option<Self> {
        match ch {
            ')' => Some(ComboKind::Paren),
            ']' => Some(ComboKind::Square),
            '}' => Some(ComboKind::Curly),
            _ => None,
        }
    }

    pub fn opener(self) -> char {
        match self {
            ComboKind::Paren => '(',
            ComboKind::Square => '[',
            ComboKind::Curly => '{',
        }
    }

    pub fn closer(self) -> char {
        match self {
            ComboKind::Paren => ')',
            ComboKind::Square => ']',
            ComboKind::Curly => '}',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal or identifier text. String literals keep their quotes.
    Atom(String),
    Combo(Vec<Token>),
    SquareCombo(Vec<Token>),
    CurlyCombo(Vec<Token>),
}

/// A token tree node and the location of its first character.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn atom(literal: impl Into<String>, location: Location) -> Self {
        Self {
            kind: TokenKind::Atom(literal.into()),
            location,
        }
    }

    pub fn combo(kind: ComboKind, children: Vec<Token>, location: Location) -> Self {
        let kind = match kind {
            ComboKind::Paren => TokenKind::Combo(children),
            ComboKind::Square => TokenKind::SquareCombo(children),
            ComboKind::Curly => TokenKind::CurlyCombo(children),
        };
        Self { kind, location }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Atom(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn combo_kind(&self) -> Option<ComboKind> {
        match &self.kind {
            TokenKind::Atom(_) => None,
            TokenKind::Combo(_) => Some(ComboKind::Paren),
            TokenKind::SquareCombo(_) => Some(ComboKind::Square),
            TokenKind::CurlyCombo(_) => Some(ComboKind::Curly),
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Token>> {
        match &mut self.kind {
            TokenKind::Atom(_) => None,
            TokenKind::Combo(children)
            | TokenKind::SquareCombo(children)
            | TokenKind::CurlyCombo(children) => Some(children),
        }
    }

    /// Children of a composite token; empty for atoms.
    pub fn children(&self) -> &[Token] {
        match &self.kind {
            TokenKind::Atom(_) => &[],
            TokenKind::Combo(children)
            | TokenKind::SquareCombo(children)
            | TokenKind::CurlyCombo(children) => children,
        }
    }
}

/// Tears the tree down with a heap stack so arbitrarily deep trees drop
/// without recursing.
impl Drop for Token {
    fn drop(&mut self) {
        let Some(children) = self.children_mut() else {
            return;
        };
        let mut pending = mem::take(children);
        while let Some(mut token) = pending.pop() {
            if let Some(children) = token.children_mut() {
                pending.append(children);
            }
        }
    }
}

/// Structural equality: locations are ignored.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, children) = match &self.kind {
            TokenKind::Atom(literal) => return write!(f, "{literal}"),
            TokenKind::Combo(children) => (ComboKind::Paren, children),
            TokenKind::SquareCombo(children) => (ComboKind::Square, children),
            TokenKind::CurlyCombo(children) => (ComboKind::Curly, children),
        };
        write!(f, "{}", kind.opener())?;
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{child}")?;
        }
        write!(f, "{}", kind.closer())
    }
}
