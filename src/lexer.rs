use std::{fs, iter::Peekable, path::Path, str::Chars, sync::Arc};

use crate::{
    diagnostics::{Diagnostic, ErrorCode, Location, Result},
    token::{ComboKind, Token},
};

pub const DEFAULT_SOURCE_NAME: &str = "<input>";

/// Deepest bracket nesting accepted unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Reads a single token tree from `source`. Anything after it is left unread.
pub fn read_one(source: &str) -> std::result::Result<Token, Diagnostic> {
    Reader::new(source, DEFAULT_SOURCE_NAME).read_token()
}

/// Reads every top-level token tree in `source`.
pub fn read_all(source: &str) -> std::result::Result<Vec<Token>, Diagnostic> {
    Reader::new(source, DEFAULT_SOURCE_NAME).read_all()
}

/// Reads every top-level token tree in the file at `path`, recording the path
/// in each token's location.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Token>> {
    read_file_with(path, |reader| reader)
}

/// Like [`read_file`], with the reader adjusted by `configure` first.
pub(crate) fn read_file_with<F>(path: impl AsRef<Path>, configure: F) -> Result<Vec<Token>>
where
    F: for<'s> FnOnce(Reader<'s>) -> Reader<'s>,
{
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    let name = path.display().to_string();
    let tokens = configure(Reader::new(&source, name.as_str())).read_all()?;
    for token in &tokens {
        log::trace!("read top-level form at {}", token.location);
    }
    Ok(tokens)
}

/// One step of the reader: an opening bracket, a closing bracket (the combo
/// terminator) or a complete atom.
enum Piece {
    Open(ComboKind, Location),
    End(ComboKind, Location),
    Atom(Token),
}

/// Character-level reader that tracks line and column.
///
/// Combos are read with an explicit stack of open brackets, so nesting depth
/// is bounded by memory rather than the call stack.
pub struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    file: Arc<str>,
    line: usize,
    column: usize,
    strict_brackets: bool,
    max_depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str, file: impl Into<Arc<str>>) -> Self {
        Self {
            chars: source.chars().peekable(),
            file: file.into(),
            line: 1,
            column: 1,
            strict_brackets: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Require each closing bracket to match the kind of its opener.
    pub fn strict_brackets(mut self, strict: bool) -> Self {
        self.strict_brackets = strict;
        self
    }

    /// Reject combos nested more than `max_depth` brackets deep.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn location(&self) -> Location {
        Location {
            file: Arc::clone(&self.file),
            line: self.line,
            column: self.column,
        }
    }

    /// Skips whitespace and reports whether any input remains.
    pub fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.chars.peek().is_none()
    }

    pub fn read_all(&mut self) -> std::result::Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        while !self.at_end() {
            tokens.push(self.read_token()?);
        }
        Ok(tokens)
    }

    pub fn read_token(&mut self) -> std::result::Result<Token, Diagnostic> {
        let mut open: Vec<(ComboKind, Location, Vec<Token>)> = Vec::new();
        loop {
            let token = match self.next_piece()? {
                None => {
                    let location = self.location();
                    return Err(match open.last() {
                        None => Diagnostic::at(
                            ErrorCode::UnexpectedEndOfFile,
                            "unexpected end of file",
                            &location,
                        ),
                        Some((kind, start, _)) => Diagnostic::at(
                            ErrorCode::UnexpectedEndOfCombo,
                            format!("unexpected end of input inside `{}`", kind.opener()),
                            &location,
                        )
                        .with_note(format!("combo opened at {start}")),
                    });
                }
                Some(Piece::Open(kind, location)) => {
                    if open.len() >= self.max_depth {
                        return Err(Diagnostic::at(
                            ErrorCode::TooDeeplyNested,
                            format!("brackets nest deeper than {} levels", self.max_depth),
                            &location,
                        ));
                    }
                    open.push((kind, location, Vec::new()));
                    continue;
                }
                Some(Piece::End(closer, location)) => {
                    let Some((kind, start, children)) = open.pop() else {
                        return Err(Diagnostic::at(
                            ErrorCode::UnbalancedCloser,
                            format!("`{}` without a matching opener", closer.closer()),
                            &location,
                        ));
                    };
                    if self.strict_brackets && kind != closer {
                        return Err(Diagnostic::at(
                            ErrorCode::MismatchedCloser,
                            format!(
                                "`{}` closes a combo opened with `{}`",
                                closer.closer(),
                                kind.opener()
                            ),
                            &location,
                        )
                        .with_note(format!("combo opened at {start}")));
                    }
                    Token::combo(kind, children, start)
                }
                Some(Piece::Atom(token)) => token,
            };
            match open.last_mut() {
                Some((_, _, children)) => children.push(token),
                None => return Ok(token),
            }
        }
    }

    fn next_piece(&mut self) -> std::result::Result<Option<Piece>, Diagnostic> {
        self.skip_whitespace();
        let location = self.location();
        let Some(&ch) = self.chars.peek() else {
            return Ok(None);
        };
        if let Some(kind) = ComboKind::from_opener(ch) {
            self.bump();
            return Ok(Some(Piece::Open(kind, location)));
        }
        if let Some(kind) = ComboKind::from_closer(ch) {
            self.bump();
            return Ok(Some(Piece::End(kind, location)));
        }
        let literal = if ch == '"' {
            self.string_literal(&location)?
        } else {
            self.literal()
        };
        Ok(Some(Piece::Atom(Token::atom(literal, location))))
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        match ch {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\r' => {}
            _ => self.column += 1,
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump();
        }
    }

    fn literal(&mut self) -> String {
        let mut literal = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || is_bracket(ch) {
                break;
            }
            literal.push(ch);
            self.bump();
        }
        literal
    }

    /// Reads through the next `"`. The quotes stay part of the literal and
    /// there are no escape sequences.
    fn string_literal(&mut self, start: &Location) -> std::result::Result<String, Diagnostic> {
        let mut literal = String::new();
        if let Some(quote) = self.bump() {
            literal.push(quote);
        }
        while let Some(ch) = self.bump() {
            literal.push(ch);
            if ch == '"' {
                return Ok(literal);
            }
        }
        Err(
            Diagnostic::at(ErrorCode::UnterminatedString, "unterminated string literal", start)
                .with_note(format!("input ended at {}", self.location())),
        )
    }
}

fn is_bracket(ch: char) -> bool {
    matches!(ch, '(' | ')' | '[' | ']' | '{' | '}')
}
