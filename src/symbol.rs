use std::{fmt, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label name (including the `#` prefix) -> instruction index.
/// Keeps declaration order so listings come out the way they were written.
pub type LabelTable = FxMap<String, usize>;

pub fn new_label_table() -> LabelTable {
    IndexMap::with_hasher(FxBuildHasher::default())
}

/// Size of the register file.
pub const NUM_REGISTERS: usize = 8;

/// DISM can address 64K memory cells.
pub const MEMORY_SIZE: usize = 64 * 1024;

/// The closed DISM instruction set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// `add d s1 s2`: R[d] <- R[s1] + R[s2]
    Add,
    /// `sub d s1 s2`: R[d] <- R[s1] - R[s2], or 0 when R[s2] > R[s1]
    Sub,
    /// `mul d s1 s2`: R[d] <- R[s1] * R[s2]
    Mul,
    /// `mov d n`: R[d] <- n
    Mov,
    /// `lod d s i`: R[d] <- M[R[s] + i]
    Lod,
    /// `str d i s`: M[R[d] + i] <- R[s]
    Str,
    /// `jmp s i`: PC <- R[s] + i
    Jmp,
    /// `beq s1 s2 n`: PC <- n if R[s1] = R[s2]
    Beq,
    /// `bgt s1 s2 n`: PC <- n if R[s1] > R[s2]
    Bgt,
    /// `rdn d`: read a natural number from the console into R[d]
    Rdn,
    /// `ptn s`: print R[s]
    Ptn,
    /// `hlt s`: halt with code R[s]
    Hlt,
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Mov,
        Opcode::Lod,
        Opcode::Str,
        Opcode::Jmp,
        Opcode::Beq,
        Opcode::Bgt,
        Opcode::Rdn,
        Opcode::Ptn,
        Opcode::Hlt,
    ];

    /// Number of operands the instruction takes.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Lod
            | Opcode::Str
            | Opcode::Beq
            | Opcode::Bgt => 3,
            Opcode::Mov | Opcode::Jmp => 2,
            Opcode::Rdn | Opcode::Ptn | Opcode::Hlt => 1,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Mov => "mov",
            Opcode::Lod => "lod",
            Opcode::Str => "str",
            Opcode::Jmp => "jmp",
            Opcode::Beq => "beq",
            Opcode::Bgt => "bgt",
            Opcode::Rdn => "rdn",
            Opcode::Ptn => "ptn",
            Opcode::Hlt => "hlt",
        }
    }
}

impl FromStr for Opcode {
    type Err = ();

    // Mnemonics are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.mnemonic() == s)
            .ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
