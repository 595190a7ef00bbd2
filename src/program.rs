use std::fmt;

use crate::{
    span::Span,
    symbol::{new_label_table, LabelTable, Opcode},
};

/// Parsed program: a flat instruction list indexed by PC, plus the label table.
#[derive(Debug)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: LabelTable,
}

impl Program {
    pub fn new() -> Self {
        Program {
            instructions: Vec::new(),
            labels: new_label_table(),
        }
    }

    pub fn add_instr(&mut self, instr: Instruction) {
        self.instructions.push(instr)
    }

    /// Bind `name` to the index the next added instruction will occupy.
    /// Returns the previously bound index if the label already exists, leaving it untouched.
    pub fn declare_label(&mut self, name: &str) -> Result<usize, usize> {
        let idx = self.instructions.len();
        match self.labels.get(name) {
            Some(&existing) => Err(existing),
            None => {
                self.labels.insert(name.to_string(), idx);
                Ok(idx)
            }
        }
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

/// Single DISM statement. Operand count always matches `opcode.arity()`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// Line of the opcode token
    pub line: u32,
    /// Covers the opcode and its operands
    pub span: Span,
}

/// Labels are kept by name and only resolved when the instruction executes,
/// so forward references need no fix-up pass.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Int(i64),
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(val) => write!(f, "{val}"),
            Operand::Label(name) => f.write_str(name),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}
