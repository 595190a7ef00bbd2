use std::fmt;

use crate::error::{Diagnostics, SyntaxError, SyntaxErrorKind};
use crate::lexer::cursor::Cursor;
use crate::span::Span;
use crate::symbol::Opcode;

pub mod cursor;

/// Represents a single "word" inside the source, with the line it was found on.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based line number inside the file
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, line: u32) -> Self {
        Token { kind, span, line }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Op(Opcode),
    Int(i64),
    /// Label name, including the `#` prefix
    Label(String),
    Colon,
    Eof,
}

impl TokenKind {
    /// Upper-case category name used when listing tokens.
    pub fn category(&self) -> &'static str {
        match self {
            TokenKind::Op(op) => match op {
                Opcode::Add => "ADD",
                Opcode::Sub => "SUB",
                Opcode::Mul => "MUL",
                Opcode::Mov => "MOV",
                Opcode::Lod => "LOD",
                Opcode::Str => "STR",
                Opcode::Jmp => "JMP",
                Opcode::Beq => "BEQ",
                Opcode::Bgt => "BGT",
                Opcode::Rdn => "RDN",
                Opcode::Ptn => "PTN",
                Opcode::Hlt => "HLT",
            },
            TokenKind::Int(_) => "INT",
            TokenKind::Label(_) => "LABEL",
            TokenKind::Colon => "COLON",
            TokenKind::Eof => "EOF",
        }
    }
}

/// Used in diagnostics, e.g. "found integer 4".
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Op(op) => write!(f, "instruction '{op}'"),
            TokenKind::Int(val) => write!(f, "integer {val}"),
            TokenKind::Label(name) => write!(f, "label '{name}'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

/// Renders as `{line}: {CATEGORY} {literal}`.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.line, self.kind.category())?;
        match &self.kind {
            TokenKind::Int(val) => write!(f, " {val}"),
            TokenKind::Label(name) => write!(f, " {name}"),
            _ => Ok(()),
        }
    }
}

/// Test if a character is skipped between tokens. Newlines are counted by the cursor.
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Test if a character can continue a mnemonic or label.
pub(crate) fn is_id(c: char) -> bool {
    c.is_alphanumeric()
}

/// Turn source text into tokens, always ending with a single `Eof`.
/// Errors are reported to `diag` and scanning carries on after them.
pub fn lex(src: &str, diag: &mut Diagnostics) -> Vec<Token> {
    let mut cursor = Cursor::new(src);
    let mut toks = Vec::new();
    loop {
        match cursor.advance_token() {
            Ok(Some(tok)) => {
                let is_eof = tok.kind == TokenKind::Eof;
                toks.push(tok);
                if is_eof {
                    break;
                }
            }
            // Whitespace or comment
            Ok(None) => {}
            Err(e) => diag.report(e),
        }
    }
    log::debug!("lexed {} tokens", toks.len());
    toks
}

impl Cursor<'_> {
    /// Scan the next token. `Ok(None)` means trivia was skipped.
    pub fn advance_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        self.reset_pos();
        let line = self.line();
        let first_char = match self.bump() {
            Some(c) => c,
            None => return Ok(Some(Token::new(TokenKind::Eof, self.token_span(), line))),
        };
        let kind = match first_char {
            c if is_whitespace(c) => None,
            ';' => {
                self.take_while(|c| c != '\n');
                None
            }
            ':' => Some(TokenKind::Colon),
            '#' => {
                self.take_while(is_id);
                Some(TokenKind::Label(self.token_text().to_string()))
            }
            '-' => {
                if !self.first().is_ascii_digit() {
                    return Err(self.error(line, SyntaxErrorKind::StrayMinus));
                }
                Some(self.int(line)?)
            }
            c if c.is_ascii_digit() => Some(self.int(line)?),
            // Mnemonics are checked after everything that could overlap.
            c if c.is_alphabetic() => {
                self.take_while(is_id);
                let text = self.token_text();
                match text.parse::<Opcode>() {
                    Ok(op) => Some(TokenKind::Op(op)),
                    Err(()) => {
                        return Err(self.error(
                            line,
                            SyntaxErrorKind::UnknownMnemonic(text.to_string()),
                        ))
                    }
                }
            }
            c => return Err(self.error(line, SyntaxErrorKind::UnexpectedChar(c))),
        };
        Ok(kind.map(|kind| Token::new(kind, self.token_span(), line)))
    }

    fn int(&mut self, line: u32) -> Result<TokenKind, SyntaxError> {
        self.take_while(|c| c.is_ascii_digit());
        let text = self.token_text();
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| self.error(line, SyntaxErrorKind::IntegerOutOfRange(text.to_string())))
    }

    fn error(&self, line: u32, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError::new(line, self.token_span(), kind)
    }
}
