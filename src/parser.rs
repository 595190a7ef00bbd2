use std::{iter::Peekable, vec::IntoIter};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::{
    error::{Diagnostics, SyntaxError, SyntaxErrorKind},
    lexer::{Token, TokenKind},
    program::{Instruction, Operand, Program},
    symbol::{FxMap, Opcode},
};

/// Build a program out of a token stream. Problems are reported to `diag`; the returned
/// program is only meaningful when nothing was reported.
pub fn parse(toks: Vec<Token>, diag: &mut Diagnostics) -> Program {
    Parser::new(toks, diag).parse()
}

/// Transforms a token stream into a `Program`
pub struct Parser<'d> {
    /// Peekable iterator over lexed tokens
    toks: Peekable<IntoIter<Token>>,
    program: Program,
    /// Line each label was first declared on
    label_lines: FxMap<String, u32>,
    diag: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    pub fn new(toks: Vec<Token>, diag: &'d mut Diagnostics) -> Self {
        Parser {
            toks: toks.into_iter().peekable(),
            program: Program::new(),
            label_lines: IndexMap::with_hasher(FxBuildHasher::default()),
            diag,
        }
    }

    pub fn parse(mut self) -> Program {
        while let Some(tok) = self.toks.next() {
            let res = match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Op(op) => self.parse_instr(op, &tok),
                TokenKind::Label(ref name) => self.parse_labeled(name, &tok),
                // Items should not start with these tokens
                TokenKind::Int(_) | TokenKind::Colon => Err(SyntaxError::new(
                    tok.line,
                    tok.span,
                    SyntaxErrorKind::UnexpectedToken {
                        found: tok.kind.to_string(),
                    },
                )),
            };
            if let Err(e) = res {
                self.diag.report(e);
                self.synchronize();
            }
        }
        log::debug!(
            "parsed {} instructions and {} labels",
            self.program.len(),
            self.program.labels().len()
        );
        self.program
    }

    /// `LABEL ":" instruction`
    fn parse_labeled(&mut self, name: &str, label: &Token) -> Result<(), SyntaxError> {
        if self.toks.next_if(|tok| tok.kind == TokenKind::Colon).is_none() {
            return Err(SyntaxError::new(
                label.line,
                label.span,
                SyntaxErrorKind::MissingColon {
                    label: name.to_string(),
                },
            ));
        }

        match self.program.declare_label(name) {
            Ok(_) => {
                self.label_lines.insert(name.to_string(), label.line);
            }
            // Keep the first declaration and carry on with the instruction
            Err(_) => {
                let first_line = self.label_lines.get(name).copied().unwrap_or(label.line);
                self.diag.report(SyntaxError::new(
                    label.line,
                    label.span,
                    SyntaxErrorKind::DuplicateLabel {
                        label: name.to_string(),
                        first_line,
                    },
                ));
            }
        }

        match self.toks.next_if(|tok| matches!(tok.kind, TokenKind::Op(_))) {
            Some(tok) => match tok.kind {
                TokenKind::Op(op) => self.parse_instr(op, &tok),
                _ => unreachable!(),
            },
            // Leave the offending token for the main loop
            None => {
                let found = self
                    .toks
                    .peek()
                    .map_or_else(|| TokenKind::Eof.to_string(), |tok| tok.kind.to_string());
                Err(SyntaxError::new(
                    label.line,
                    label.span,
                    SyntaxErrorKind::MissingInstruction {
                        label: name.to_string(),
                        found,
                    },
                ))
            }
        }
    }

    /// `OPCODE operand*`, with the operand count fixed by the opcode
    fn parse_instr(&mut self, opcode: Opcode, op_tok: &Token) -> Result<(), SyntaxError> {
        let mut operands = Vec::with_capacity(opcode.arity());
        let mut span = op_tok.span;
        for _ in 0..opcode.arity() {
            let tok = self.expect_operand(opcode, op_tok)?;
            span = span.to(tok.span);
            operands.push(match tok.kind {
                TokenKind::Int(val) => Operand::Int(val),
                TokenKind::Label(name) => Operand::Label(name),
                _ => unreachable!(),
            });
        }

        self.program.add_instr(Instruction {
            opcode,
            operands,
            line: op_tok.line,
            span,
        });
        Ok(())
    }

    fn expect_operand(&mut self, opcode: Opcode, op_tok: &Token) -> Result<Token, SyntaxError> {
        if let Some(tok) = self
            .toks
            .next_if(|tok| matches!(tok.kind, TokenKind::Int(_) | TokenKind::Label(_)))
        {
            return Ok(tok);
        }
        let (line, span, found) = match self.toks.peek() {
            Some(tok) => (tok.line, tok.span, tok.kind.to_string()),
            None => (op_tok.line, op_tok.span, TokenKind::Eof.to_string()),
        };
        Err(SyntaxError::new(
            line,
            span,
            SyntaxErrorKind::BadOperand { opcode, found },
        ))
    }

    /// Skip ahead to the next token that can start an item.
    fn synchronize(&mut self) {
        while self
            .toks
            .next_if(|tok| !matches!(tok.kind, TokenKind::Op(_) | TokenKind::Label(_) | TokenKind::Eof))
            .is_some()
        {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> (Program, Diagnostics) {
        let mut diag = Diagnostics::new();
        let toks = lex(src, &mut diag);
        assert!(!diag.had_error(), "lexing failed:\n{diag}");
        let program = parse(toks, &mut diag);
        (program, diag)
    }

    fn parse_ok(src: &str) -> Program {
        let (program, diag) = parse_src(src);
        assert!(!diag.had_error(), "parsing failed:\n{diag}");
        program
    }

    fn error_kinds(src: &str) -> Vec<(u32, SyntaxErrorKind)> {
        let (_, diag) = parse_src(src);
        diag.iter().map(|e| (e.line, e.kind.clone())).collect()
    }

    #[test]
    fn parse_add_basic() {
        let program = parse_ok("add 0 1 2");
        assert_eq!(program.len(), 1);
        let instr = program.get(0).unwrap();
        assert_eq!(instr.opcode, Opcode::Add);
        assert_eq!(
            instr.operands,
            vec![Operand::Int(0), Operand::Int(1), Operand::Int(2)]
        );
        assert_eq!(instr.line, 1);
        assert_eq!(instr.span.as_range(), 0..9);
    }

    #[test]
    fn parse_every_arity() {
        let program = parse_ok(
            r#"
            add 0 1 2
            sub 0 1 2
            mul 0 1 2
            mov 0 5
            lod 0 1 -1
            str 0 3 1
            jmp 0 2
            beq 0 1 #end
            bgt 0 1 4
            rdn 0
            ptn 0
            #end: hlt 0
            "#,
        );
        assert_eq!(program.len(), 12);
        for instr in &program {
            assert_eq!(instr.operands.len(), instr.opcode.arity());
        }
        assert_eq!(program.get(4).unwrap().operands[2], Operand::Int(-1));
    }

    #[test]
    fn labels_point_at_next_instruction() {
        let program = parse_ok(
            r#"
            mov 0 1
            #loop: ptn 0
            #done:
                hlt 0
            "#,
        );
        assert_eq!(program.label("#loop"), Some(1));
        assert_eq!(program.label("#done"), Some(2));
        assert_eq!(program.label("#missing"), None);
        let names = program.labels().keys().cloned().collect::<Vec<_>>();
        assert_eq!(names, vec!["#loop", "#done"]);
    }

    #[test]
    fn label_operands_stay_unresolved() {
        let program = parse_ok("beq 0 0 #later\n#later: hlt 0");
        assert_eq!(
            program.get(0).unwrap().operands[2],
            Operand::Label("#later".into())
        );
    }

    #[test]
    fn unexpected_item_start() {
        assert_eq!(
            error_kinds("5 hlt 0"),
            vec![(
                1,
                SyntaxErrorKind::UnexpectedToken {
                    found: "integer 5".into()
                }
            )]
        );
        assert_eq!(
            error_kinds("hlt 0\n: hlt 0"),
            vec![(
                2,
                SyntaxErrorKind::UnexpectedToken {
                    found: "':'".into()
                }
            )]
        );
    }

    #[test]
    fn missing_operand() {
        assert_eq!(
            error_kinds("add 0 1\nhlt 0"),
            vec![(
                2,
                SyntaxErrorKind::BadOperand {
                    opcode: Opcode::Add,
                    found: "instruction 'hlt'".into()
                }
            )]
        );
        assert_eq!(
            error_kinds("mov 0"),
            vec![(
                1,
                SyntaxErrorKind::BadOperand {
                    opcode: Opcode::Mov,
                    found: "end of file".into()
                }
            )]
        );
    }

    #[test]
    fn recovers_after_errors() {
        let (program, diag) = parse_src("add 0 : 1\nptn 0\n#x ptn 1\nhlt 0");
        assert_eq!(diag.len(), 2);
        // Everything after the broken `add` and the colon-less label still parses
        assert_eq!(program.len(), 3);
        assert_eq!(program.get(1).unwrap().operands, vec![Operand::Int(1)]);
        assert_eq!(program.get(2).unwrap().opcode, Opcode::Hlt);
    }

    #[test]
    fn label_without_colon() {
        assert_eq!(
            error_kinds("#x hlt 0"),
            vec![(
                1,
                SyntaxErrorKind::MissingColon {
                    label: "#x".into()
                }
            )]
        );
    }

    #[test]
    fn dangling_label() {
        assert_eq!(
            error_kinds("hlt 0\n#end:"),
            vec![(
                2,
                SyntaxErrorKind::MissingInstruction {
                    label: "#end".into(),
                    found: "end of file".into()
                }
            )]
        );
    }

    #[test]
    fn duplicate_label_keeps_first() {
        let (program, diag) = parse_src("#a: ptn 0\n#a: hlt 0");
        let errors = diag.iter().map(|e| (e.line, e.kind.clone())).collect::<Vec<_>>();
        assert_eq!(
            errors,
            vec![(
                2,
                SyntaxErrorKind::DuplicateLabel {
                    label: "#a".into(),
                    first_line: 1
                }
            )]
        );
        assert_eq!(program.label("#a"), Some(0));
    }
}
