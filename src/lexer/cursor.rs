// Heavily inspired by `rustc_lexer` and adapted to suit the project.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

use crate::span::{Idx, Span};

pub(crate) const EOF_CHAR: char = '\0';

/// Peekable iterator over a char sequence that tracks the current token and line.
pub struct Cursor<'a> {
    src: &'a str,
    /// Byte length of the input left when the current token started
    len_remaining: usize,
    chars: Chars<'a>,
    /// 1-based line the cursor is on
    line: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            src: input,
            len_remaining: input.len(),
            chars: input.chars(),
            line: 1,
        }
    }

    /// Peek the next char without consuming it. Returns `EOF_CHAR` at the end of input.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Move to the next char, bumping the line counter on newlines.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Eat chars while the predicate holds or until the end of input.
    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.is_eof() {
            self.bump();
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Byte offset of the cursor from the start of the source.
    pub fn abs_pos(&self) -> usize {
        self.src.len() - self.chars.as_str().len()
    }

    /// Bytes consumed since the current token started.
    pub fn pos_in_token(&self) -> usize {
        self.len_remaining - self.chars.as_str().len()
    }

    /// Span of the current token.
    pub fn token_span(&self) -> Span {
        let len = self.pos_in_token();
        Span::new(Idx(self.abs_pos() - len), len)
    }

    /// Text of the current token.
    pub fn token_text(&self) -> &'a str {
        &self.src[self.token_span().as_range()]
    }

    /// Start a new token at the current position.
    pub fn reset_pos(&mut self) {
        self.len_remaining = self.chars.as_str().len();
    }
}
