// Parsing
pub mod lexer;
pub mod parser;
pub mod program;
pub use program::{Instruction, Operand, Program};

// Running
pub mod runtime;
pub use runtime::{Halt, RunState};

pub mod error;
pub use error::{Diagnostics, FaultKind, RuntimeFault, SyntaxError, SyntaxErrorKind};

pub mod span;
pub mod symbol;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;

/// Lex and parse `src` into a runnable program. Lexing errors stop the pipeline before
/// parsing; any syntax error means the program must not run.
pub fn assemble(src: &str) -> Result<Program, Diagnostics> {
    let mut diag = Diagnostics::new();
    let toks = lexer::lex(src, &mut diag);
    if diag.had_error() {
        return Err(diag);
    }
    let program = parser::parse(toks, &mut diag);
    if diag.had_error() {
        return Err(diag);
    }
    Ok(program)
}
