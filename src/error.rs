use std::{error::Error, fmt};

use miette::{Diagnostic, LabeledSpan};

use crate::{span::Span, symbol::Opcode};

// Syntax errors

/// Collects syntax errors raised while lexing and parsing so that several problems can be
/// surfaced in a single pass. Interpretation must not start once anything has been reported.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<SyntaxError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, error: SyntaxError) {
        log::debug!("reported: {error}");
        self.errors.push(error);
    }

    /// Sticky: once set it stays set for the lifetime of the collector.
    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyntaxError> {
        self.errors.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = SyntaxError;
    type IntoIter = std::vec::IntoIter<SyntaxError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "{error}")?;
        }
        Ok(())
    }
}

/// A single problem found while lexing or parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: u32,
    pub span: Span,
    pub kind: SyntaxErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    UnexpectedChar(char),
    /// `-` that is not immediately followed by a digit.
    StrayMinus,
    UnknownMnemonic(String),
    IntegerOutOfRange(String),
    /// Integer or colon where an instruction or label should start.
    UnexpectedToken {
        found: String,
    },
    MissingColon {
        label: String,
    },
    MissingInstruction {
        label: String,
        found: String,
    },
    BadOperand {
        opcode: Opcode,
        found: String,
    },
    DuplicateLabel {
        label: String,
        first_line: u32,
    },
}

impl SyntaxError {
    pub fn new(line: u32, span: Span, kind: SyntaxErrorKind) -> Self {
        SyntaxError { line, span, kind }
    }
}

impl Error for SyntaxError {}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Syntax error: {}", self.line, self.kind)
    }
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar(c) => write!(f, "Unexpected character '{c}'"),
            Self::StrayMinus => f.write_str("Unexpected character '-'"),
            Self::UnknownMnemonic(text) => write!(f, "Unexpected character(s) '{text}'"),
            Self::IntegerOutOfRange(text) => {
                write!(f, "Integer literal '{text}' does not fit in 64 bits")
            }
            Self::UnexpectedToken { found } => {
                write!(f, "Expected an instruction or label, found {found}")
            }
            Self::MissingColon { label } => write!(f, "Expected ':' after label '{label}'"),
            Self::MissingInstruction { label, found } => write!(
                f,
                "Expected an instruction after label '{label}:', found {found}"
            ),
            Self::BadOperand { opcode, found } => write!(
                f,
                "Instruction '{opcode}' takes {} integer or label operand(s), found {found}",
                opcode.arity()
            ),
            Self::DuplicateLabel { label, first_line } => write!(
                f,
                "Label '{label}' was already declared on line {first_line}"
            ),
        }
    }
}

impl Diagnostic for SyntaxError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            SyntaxErrorKind::UnexpectedChar(_) | SyntaxErrorKind::StrayMinus => {
                "lex::unexpected_char"
            }
            SyntaxErrorKind::UnknownMnemonic(_) => "lex::unknown_mnemonic",
            SyntaxErrorKind::IntegerOutOfRange(_) => "lex::bad_lit",
            SyntaxErrorKind::UnexpectedToken { .. } => "parse::unexpected_token",
            SyntaxErrorKind::MissingColon { .. } => "parse::missing_colon",
            SyntaxErrorKind::MissingInstruction { .. } => "parse::missing_instruction",
            SyntaxErrorKind::BadOperand { .. } => "parse::bad_operand",
            SyntaxErrorKind::DuplicateLabel { .. } => "parse::duplicate_label",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self.kind {
            SyntaxErrorKind::UnexpectedChar(_) => {
                "only mnemonics, integers, `#labels`, `:` and `;` comments are allowed"
            }
            SyntaxErrorKind::StrayMinus => "negative integers are written with no space, like -4",
            SyntaxErrorKind::UnknownMnemonic(_) => {
                "mnemonics are lowercase: add sub mul mov lod str jmp beq bgt rdn ptn hlt"
            }
            SyntaxErrorKind::IntegerOutOfRange(_) => {
                "integers range from -9223372036854775808 to 9223372036854775807"
            }
            SyntaxErrorKind::UnexpectedToken { .. } => {
                "lines should start with an instruction or a `#label:` declaration"
            }
            SyntaxErrorKind::MissingColon { .. } => "declare labels as `#name:`",
            SyntaxErrorKind::MissingInstruction { .. } => {
                "a label must mark the instruction that follows it"
            }
            SyntaxErrorKind::BadOperand { .. } => "check the number of operands for this instruction",
            SyntaxErrorKind::DuplicateLabel { .. } => "labels may only be declared once per file",
        };
        Some(Box::new(help))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let text = match self.kind {
            SyntaxErrorKind::UnexpectedChar(_) | SyntaxErrorKind::StrayMinus => "unknown token",
            SyntaxErrorKind::UnknownMnemonic(_) => "unknown mnemonic",
            SyntaxErrorKind::IntegerOutOfRange(_) => "incorrect literal",
            SyntaxErrorKind::UnexpectedToken { .. } => "unexpected token",
            SyntaxErrorKind::MissingColon { .. } => "label without colon",
            SyntaxErrorKind::MissingInstruction { .. } => "dangling label",
            SyntaxErrorKind::BadOperand { .. } => "bad operand",
            SyntaxErrorKind::DuplicateLabel { .. } => "duplicate label",
        };
        Some(Box::new(std::iter::once(LabeledSpan::at(self.span, text))))
    }
}

// Runtime faults

/// Unrecoverable error raised while executing a program. Aborts the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeFault {
    /// Source line of the offending instruction, if there is one.
    pub line: Option<u32>,
    pub span: Option<Span>,
    pub kind: FaultKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    IllegalRegister(i64),
    IllegalNatural(i64),
    MemoryOutOfBounds(i64),
    IllegalJumpTarget(i64),
    UndefinedLabel(String),
    MalformedInput(String),
    PcOutOfBounds(i64),
    Overflow(Opcode),
    StepLimit(u64),
    Io(String),
}

impl RuntimeFault {
    pub fn new(line: Option<u32>, span: Option<Span>, kind: FaultKind) -> Self {
        RuntimeFault { line, span, kind }
    }
}

impl Error for RuntimeFault {}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[line {line}] Runtime error: {}", self.kind),
            None => write!(f, "Runtime error: {}", self.kind),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalRegister(reg) => write!(f, "Illegal register number {reg}"),
            Self::IllegalNatural(val) => write!(f, "Illegal natural number {val}"),
            Self::MemoryOutOfBounds(addr) => write!(f, "Memory address {addr} is out of bounds"),
            Self::IllegalJumpTarget(target) => write!(f, "Illegal jump target {target}"),
            Self::UndefinedLabel(label) => write!(f, "Undefined label '{label}'"),
            Self::MalformedInput(input) if input.is_empty() => {
                f.write_str("Expected a natural number, found no input")
            }
            Self::MalformedInput(input) => {
                write!(f, "Malformed input '{input}', expected a natural number")
            }
            Self::PcOutOfBounds(pc) => write!(f, "Program counter {pc} is outside of the program"),
            Self::Overflow(opcode) => write!(f, "Arithmetic overflow in '{opcode}'"),
            Self::StepLimit(limit) => write!(f, "Step limit of {limit} instructions exceeded"),
            Self::Io(e) => write!(f, "Console I/O failed: {e}"),
        }
    }
}

impl Diagnostic for RuntimeFault {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self.kind {
            FaultKind::IllegalRegister(_) => "runtime::illegal_register",
            FaultKind::IllegalNatural(_) => "runtime::illegal_natural",
            FaultKind::MemoryOutOfBounds(_) => "runtime::memory_bounds",
            FaultKind::IllegalJumpTarget(_) => "runtime::jump_target",
            FaultKind::UndefinedLabel(_) => "runtime::undefined_label",
            FaultKind::MalformedInput(_) => "runtime::malformed_input",
            FaultKind::PcOutOfBounds(_) => "runtime::pc_bounds",
            FaultKind::Overflow(_) => "runtime::overflow",
            FaultKind::StepLimit(_) => "runtime::step_limit",
            FaultKind::Io(_) => "runtime::io",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self.kind {
            FaultKind::IllegalRegister(_) => "registers are numbered 0 to 7",
            FaultKind::IllegalNatural(_) => "this operand must not be negative",
            FaultKind::MemoryOutOfBounds(_) => "memory is addressed from 0 to 65535",
            FaultKind::IllegalJumpTarget(_) => "jump targets must not be negative",
            FaultKind::UndefinedLabel(_) => "declare the label as `#name:` before an instruction",
            FaultKind::MalformedInput(_) => "enter a whole number of zero or more",
            FaultKind::PcOutOfBounds(_) => "make sure every path through the program ends in `hlt`",
            FaultKind::Overflow(_) => "values must fit in a signed 64-bit integer",
            FaultKind::StepLimit(_) => "raise the limit with --max-steps or DISM_MAX_STEPS",
            FaultKind::Io(_) => return None,
        };
        Some(Box::new(help))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::at(
            span,
            "while executing this instruction",
        ))))
    }
}
