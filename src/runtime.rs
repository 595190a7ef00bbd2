use std::io::{self, BufRead, Write};

use crate::{
    error::{FaultKind, RuntimeFault},
    program::{Instruction, Operand, Program},
    span::Span,
    symbol::{Opcode, MEMORY_SIZE, NUM_REGISTERS},
};

const PROMPT: &str = "Enter a natural number: ";

/// Terminal result of a run: `hlt` executed with `code` at `pc`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Halt {
    pub code: i64,
    pub pc: usize,
}

impl Halt {
    /// Process exit status for this halt. Codes that do not fit a byte saturate to 255.
    pub fn exit_status(&self) -> i32 {
        u8::try_from(self.code).unwrap_or(u8::MAX) as i32
    }
}

/// Represents complete program state during runtime.
pub struct RunState {
    program: Program,
    /// 8x signed registers
    reg: [i64; NUM_REGISTERS],
    /// Data memory, 64K cells
    mem: Box<[i64]>,
    /// Index into the instruction list, not a byte address
    pc: usize,
    /// Instructions executed so far
    steps: u64,
    step_limit: Option<u64>,
    /// Line and span of the instruction being executed, for faults
    current: Option<(u32, Span)>,
    halted: Option<Halt>,
}

impl RunState {
    pub fn new(program: Program) -> Self {
        RunState {
            program,
            reg: [0; NUM_REGISTERS],
            mem: vec![0; MEMORY_SIZE].into_boxed_slice(),
            pc: 0,
            steps: 0,
            step_limit: None,
            current: None,
            halted: None,
        }
    }

    /// Fault once `limit` instructions have executed without halting.
    pub fn with_step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn registers(&self) -> &[i64; NUM_REGISTERS] {
        &self.reg
    }

    pub fn memory(&self) -> &[i64] {
        &self.mem
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run against the process console until `hlt` or a fault.
    pub fn run(&mut self) -> Result<Halt, RuntimeFault> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout().lock();
        self.run_with(&mut input, &mut output)
    }

    /// Run with console input and output redirected.
    pub fn run_with<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<Halt, RuntimeFault>
    where
        R: BufRead,
        W: Write,
    {
        loop {
            if let Some(halt) = self.step(input, output)? {
                log::debug!(
                    "halted with code {} at pc {} after {} steps",
                    halt.code,
                    halt.pc,
                    self.steps
                );
                return Ok(halt);
            }
        }
    }

    /// Fetch, resolve and execute a single instruction.
    pub fn step<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<Option<Halt>, RuntimeFault>
    where
        R: BufRead,
        W: Write,
    {
        if let Some(halt) = self.halted {
            return Ok(Some(halt));
        }
        if let Some(limit) = self.step_limit {
            if self.steps >= limit {
                return Err(self.fault(FaultKind::StepLimit(limit)));
            }
        }

        let (opcode, args) = {
            let Some(instr) = self.program.get(self.pc) else {
                return Err(self.fault(FaultKind::PcOutOfBounds(self.pc as i64)));
            };
            log::trace!("pc {:>5}: {instr}", self.pc);
            self.current = Some((instr.line, instr.span));
            (instr.opcode, self.resolve(instr)?)
        };

        let halt = match opcode {
            Opcode::Add => self.add(args),
            Opcode::Sub => self.sub(args),
            Opcode::Mul => self.mul(args),
            Opcode::Mov => self.mov(args),
            Opcode::Lod => self.lod(args),
            Opcode::Str => self.str(args),
            Opcode::Jmp => self.jmp(args),
            Opcode::Beq => self.beq(args),
            Opcode::Bgt => self.bgt(args),
            Opcode::Rdn => self.rdn(args, input, output),
            Opcode::Ptn => self.ptn(args, output),
            Opcode::Hlt => self.hlt(args, output).map(Some),
        }?;
        self.steps += 1;
        self.halted = halt;
        Ok(halt)
    }

    /// Replace label operands with the instruction index they name.
    fn resolve(&self, instr: &Instruction) -> Result<[i64; 3], RuntimeFault> {
        let mut args = [0; 3];
        for (slot, operand) in args.iter_mut().zip(&instr.operands) {
            *slot = match operand {
                Operand::Int(val) => *val,
                Operand::Label(name) => match self.program.label(name) {
                    Some(idx) => idx as i64,
                    None => return Err(self.fault(FaultKind::UndefinedLabel(name.clone()))),
                },
            };
        }
        Ok(args)
    }

    fn fault(&self, kind: FaultKind) -> RuntimeFault {
        match self.current {
            Some((line, span)) => RuntimeFault::new(Some(line), Some(span), kind),
            None => RuntimeFault::new(None, None, kind),
        }
    }

    /// Validate a register operand.
    fn reg_idx(&self, reg: i64) -> Result<usize, RuntimeFault> {
        usize::try_from(reg)
            .ok()
            .filter(|&idx| idx < NUM_REGISTERS)
            .ok_or_else(|| self.fault(FaultKind::IllegalRegister(reg)))
    }

    fn reg(&self, reg: i64) -> Result<i64, RuntimeFault> {
        Ok(self.reg[self.reg_idx(reg)?])
    }

    fn natural(&self, val: i64) -> Result<i64, RuntimeFault> {
        if val < 0 {
            return Err(self.fault(FaultKind::IllegalNatural(val)));
        }
        Ok(val)
    }

    /// Validate a computed memory address `base + offs`.
    fn addr(&self, base: i64, offs: i64) -> Result<usize, RuntimeFault> {
        let addr = base.saturating_add(offs);
        usize::try_from(addr)
            .ok()
            .filter(|&addr| addr < MEMORY_SIZE)
            .ok_or_else(|| self.fault(FaultKind::MemoryOutOfBounds(addr)))
    }

    fn checked(&self, opcode: Opcode, val: Option<i64>) -> Result<i64, RuntimeFault> {
        val.ok_or_else(|| self.fault(FaultKind::Overflow(opcode)))
    }

    fn add(&mut self, [d, s1, s2]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let dr = self.reg_idx(d)?;
        let (a, b) = (self.reg(s1)?, self.reg(s2)?);
        self.reg[dr] = self.checked(Opcode::Add, a.checked_add(b))?;
        self.pc += 1;
        Ok(None)
    }

    fn sub(&mut self, [d, s1, s2]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let dr = self.reg_idx(d)?;
        let (a, b) = (self.reg(s1)?, self.reg(s2)?);
        // Clamped at zero
        self.reg[dr] = if b > a {
            0
        } else {
            self.checked(Opcode::Sub, a.checked_sub(b))?
        };
        self.pc += 1;
        Ok(None)
    }

    fn mul(&mut self, [d, s1, s2]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let dr = self.reg_idx(d)?;
        let (a, b) = (self.reg(s1)?, self.reg(s2)?);
        self.reg[dr] = self.checked(Opcode::Mul, a.checked_mul(b))?;
        self.pc += 1;
        Ok(None)
    }

    fn mov(&mut self, [d, n, _]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let dr = self.reg_idx(d)?;
        self.reg[dr] = self.natural(n)?;
        self.pc += 1;
        Ok(None)
    }

    fn lod(&mut self, [d, s, i]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let dr = self.reg_idx(d)?;
        let addr = self.addr(self.reg(s)?, i)?;
        self.reg[dr] = self.mem[addr];
        self.pc += 1;
        Ok(None)
    }

    fn str(&mut self, [d, i, s]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let addr = self.addr(self.reg(d)?, i)?;
        self.mem[addr] = self.reg(s)?;
        self.pc += 1;
        Ok(None)
    }

    fn jmp(&mut self, [s, i, _]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let target = self.reg(s)?.saturating_add(i);
        self.pc = usize::try_from(target)
            .map_err(|_| self.fault(FaultKind::IllegalJumpTarget(target)))?;
        Ok(None)
    }

    fn beq(&mut self, [s1, s2, n]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let (a, b) = (self.reg(s1)?, self.reg(s2)?);
        let target = self.natural(n)?;
        self.branch(a == b, target);
        Ok(None)
    }

    fn bgt(&mut self, [s1, s2, n]: [i64; 3]) -> Result<Option<Halt>, RuntimeFault> {
        let (a, b) = (self.reg(s1)?, self.reg(s2)?);
        let target = self.natural(n)?;
        self.branch(a > b, target);
        Ok(None)
    }

    fn branch(&mut self, taken: bool, target: i64) {
        if taken {
            // Checked non-negative by the caller
            self.pc = target as usize;
        } else {
            self.pc += 1;
        }
    }

    fn rdn<R, W>(
        &mut self,
        [d, _, _]: [i64; 3],
        input: &mut R,
        output: &mut W,
    ) -> Result<Option<Halt>, RuntimeFault>
    where
        R: BufRead,
        W: Write,
    {
        let dr = self.reg_idx(d)?;
        write!(output, "{PROMPT}")
            .and_then(|_| output.flush())
            .map_err(|e| self.fault(FaultKind::Io(e.to_string())))?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| self.fault(FaultKind::Io(e.to_string())))?;
        let text = line.trim();
        let val = match text.parse::<i64>() {
            Ok(val) if read > 0 && val >= 0 => val,
            _ => return Err(self.fault(FaultKind::MalformedInput(text.to_string()))),
        };

        self.reg[dr] = val;
        self.pc += 1;
        Ok(None)
    }

    fn ptn<W: Write>(&mut self, [s, _, _]: [i64; 3], output: &mut W) -> Result<Option<Halt>, RuntimeFault> {
        let val = self.reg(s)?;
        writeln!(output, "{val}").map_err(|e| self.fault(FaultKind::Io(e.to_string())))?;
        self.pc += 1;
        Ok(None)
    }

    fn hlt<W: Write>(&mut self, [s, _, _]: [i64; 3], output: &mut W) -> Result<Halt, RuntimeFault> {
        let code = self.reg(s)?;
        writeln!(output, "Simulation completed with code {code} at PC={}.", self.pc)
            .and_then(|_| output.flush())
            .map_err(|e| self.fault(FaultKind::Io(e.to_string())))?;
        Ok(Halt { code, pc: self.pc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble;

    struct Outcome {
        state: RunState,
        result: Result<Halt, RuntimeFault>,
        output: String,
    }

    fn run(src: &str, input: &str) -> Outcome {
        let program = assemble(src).expect("program should assemble");
        let mut state = RunState::new(program).with_step_limit(Some(10_000));
        let mut output = Vec::new();
        let result = state.run_with(&mut input.as_bytes(), &mut output);
        Outcome {
            state,
            result,
            output: String::from_utf8(output).unwrap(),
        }
    }

    fn fault_kind(src: &str) -> FaultKind {
        run(src, "").result.unwrap_err().kind
    }

    #[test]
    fn add_registers() {
        let out = run("mov 1 3\nmov 2 4\nadd 0 1 2\nhlt 0", "");
        assert_eq!(out.state.registers()[0], 7);
        assert_eq!(out.result, Ok(Halt { code: 7, pc: 3 }));
    }

    #[test]
    fn add_advances_pc_by_one() {
        let program = assemble("add 0 1 2\nhlt 0").unwrap();
        let mut state = RunState::new(program);
        state.reg[1] = 3;
        state.reg[2] = 4;
        let res = state.step(&mut "".as_bytes(), &mut Vec::new());
        assert_eq!(res, Ok(None));
        assert_eq!(state.registers()[0], 7);
        assert_eq!(state.pc(), 1);
    }

    #[test]
    fn sub_clamps_at_zero() {
        let out = run("mov 1 2\nmov 2 5\nsub 0 1 2\nhlt 0", "");
        assert_eq!(out.state.registers()[0], 0);
        let out = run("mov 1 5\nmov 2 2\nsub 0 1 2\nhlt 0", "");
        assert_eq!(out.state.registers()[0], 3);
    }

    #[test]
    fn mul_registers() {
        let out = run("mov 1 6\nmov 2 7\nmul 3 1 2\nhlt 3", "");
        assert_eq!(out.result.map(|h| h.code), Ok(42));
    }

    #[test]
    fn store_then_load() {
        let out = run("mov 1 9\nmov 0 5\nstr 0 0 1\nlod 2 0 0\nhlt 2", "");
        assert_eq!(out.state.memory()[5], 9);
        assert_eq!(out.state.registers()[2], 9);
    }

    #[test]
    fn load_and_store_offsets() {
        let out = run("mov 0 10\nmov 1 1\nstr 0 -3 1\nlod 2 0 -3\nhlt 2", "");
        assert_eq!(out.state.memory()[7], 1);
        assert_eq!(out.result.map(|h| h.code), Ok(1));
    }

    #[test]
    fn jump_register_plus_offset() {
        let out = run("mov 0 1\njmp 0 2\nptn 0\nhlt 0", "");
        assert_eq!(out.output, "Simulation completed with code 1 at PC=3.\n");
    }

    #[test]
    fn beq_skips_to_label() {
        let src = "mov 0 4\nmov 1 4\nbeq 0 1 #done\nptn 0\nptn 1\n#done: hlt 0";
        let out = run(src, "");
        assert_eq!(out.output, "Simulation completed with code 4 at PC=5.\n");
        assert_eq!(out.result, Ok(Halt { code: 4, pc: 5 }));
    }

    #[test]
    fn beq_falls_through() {
        let out = run("mov 0 1\nbeq 0 1 3\nptn 0\nhlt 1", "");
        assert_eq!(out.output, "1\nSimulation completed with code 0 at PC=3.\n");
    }

    #[test]
    fn bgt_loop_counts_down() {
        let src = r#"
            mov 0 3         ; counter
            mov 1 1
            mov 2 0
            #loop: ptn 0
            sub 0 0 1
            bgt 0 2 #loop
            hlt 0
        "#;
        let out = run(src, "");
        assert_eq!(
            out.output,
            "3\n2\n1\nSimulation completed with code 0 at PC=6.\n"
        );
    }

    #[test]
    fn forward_and_backward_labels() {
        let src = "jmp 0 #fwd\n#back: hlt 1\n#fwd: mov 1 1\nbeq 1 1 #back";
        let out = run(src, "");
        assert_eq!(out.result, Ok(Halt { code: 1, pc: 1 }));
    }

    #[test]
    fn rdn_reads_natural() {
        let out = run("rdn 3\nptn 3\nhlt 3", " 42 \n");
        assert_eq!(
            out.output,
            "Enter a natural number: 42\nSimulation completed with code 42 at PC=2.\n"
        );
    }

    #[test]
    fn rdn_rejects_bad_input() {
        let out = run("rdn 0\nhlt 0", "-4\n");
        assert_eq!(
            out.result.unwrap_err().kind,
            FaultKind::MalformedInput("-4".into())
        );
        let out = run("rdn 0\nhlt 0", "four\n");
        assert_eq!(
            out.result.unwrap_err().kind,
            FaultKind::MalformedInput("four".into())
        );
        let out = run("rdn 0\nhlt 0", "");
        assert_eq!(
            out.result.unwrap_err().kind,
            FaultKind::MalformedInput(String::new())
        );
    }

    #[test]
    fn illegal_register_faults_without_mutation() {
        let out = run("mov 0 1\nmov 1 2\nadd 8 0 1\nhlt 0", "");
        let fault = out.result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::IllegalRegister(8));
        assert_eq!(fault.line, Some(3));
        assert_eq!(fault.to_string(), "[line 3] Runtime error: Illegal register number 8");
        assert_eq!(out.state.registers(), &[1, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(out.state.pc(), 2);
    }

    #[test]
    fn register_operands_checked() {
        assert_eq!(fault_kind("ptn -1"), FaultKind::IllegalRegister(-1));
        assert_eq!(fault_kind("sub 0 1 9"), FaultKind::IllegalRegister(9));
        assert_eq!(fault_kind("hlt 12"), FaultKind::IllegalRegister(12));
    }

    #[test]
    fn natural_operands_checked() {
        assert_eq!(fault_kind("mov 0 -1"), FaultKind::IllegalNatural(-1));
        assert_eq!(fault_kind("beq 0 0 -2"), FaultKind::IllegalNatural(-2));
        // Checked even when the branch is not taken
        assert_eq!(fault_kind("mov 0 1\nbgt 1 0 -2"), FaultKind::IllegalNatural(-2));
    }

    #[test]
    fn memory_bounds_checked() {
        assert_eq!(fault_kind("lod 0 0 -1"), FaultKind::MemoryOutOfBounds(-1));
        assert_eq!(fault_kind("str 0 65536 0"), FaultKind::MemoryOutOfBounds(65536));
        let out = run("str 0 65535 0\nhlt 0", "");
        assert!(out.result.is_ok());
    }

    #[test]
    fn jump_target_checked() {
        assert_eq!(fault_kind("jmp 0 -1"), FaultKind::IllegalJumpTarget(-1));
    }

    #[test]
    fn undefined_label_faults_at_use() {
        let fault = run("ptn 0\nbeq 0 0 #nowhere\nhlt 0", "").result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::UndefinedLabel("#nowhere".into()));
        assert_eq!(fault.line, Some(2));
    }

    #[test]
    fn running_off_the_end() {
        let fault = run("mov 0 1\nptn 0", "").result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::PcOutOfBounds(2));
        assert_eq!(fault.line, Some(2));

        let fault = run("", "").result.unwrap_err();
        assert_eq!(fault.kind, FaultKind::PcOutOfBounds(0));
        assert_eq!(fault.line, None);

        assert_eq!(fault_kind("jmp 0 50"), FaultKind::PcOutOfBounds(50));
    }

    #[test]
    fn overflow_faults() {
        let src = "mov 0 9223372036854775807\nmov 1 1\nadd 2 0 1\nhlt 2";
        assert_eq!(fault_kind(src), FaultKind::Overflow(Opcode::Add));
        let src = "mov 0 9223372036854775807\nmul 2 0 0\nhlt 2";
        assert_eq!(fault_kind(src), FaultKind::Overflow(Opcode::Mul));
    }

    #[test]
    fn step_limit_bounds_infinite_loop() {
        let out = run("#spin: beq 0 0 #spin", "");
        assert_eq!(out.result.unwrap_err().kind, FaultKind::StepLimit(10_000));
        assert_eq!(out.state.steps(), 10_000);
    }

    #[test]
    fn deterministic_given_same_input() {
        let src = r#"
            rdn 0
            rdn 1
            mov 2 100
            str 2 0 0
            str 2 1 1
            mul 3 0 1
            #spin: add 4 4 3
            jmp 5 6
        "#;
        let first = run(src, "3\n5\n");
        let second = run(src, "3\n5\n");
        assert_eq!(first.result, second.result);
        assert_eq!(first.output, second.output);
        assert_eq!(first.state.registers(), second.state.registers());
        assert_eq!(first.state.memory(), second.state.memory());
        assert_eq!(&first.state.memory()[100..102], &[3, 5]);
    }

    #[test]
    fn halt_is_terminal() {
        let program = assemble("hlt 0\nptn 0").unwrap();
        let mut state = RunState::new(program);
        let mut output = Vec::new();
        let first = state.step(&mut "".as_bytes(), &mut output);
        let again = state.step(&mut "".as_bytes(), &mut output);
        assert_eq!(first, again);
        assert_eq!(state.steps(), 1);
        assert_eq!(output, b"Simulation completed with code 0 at PC=0.\n");
    }

    #[test]
    fn exit_status_saturates() {
        assert_eq!(Halt { code: 3, pc: 0 }.exit_status(), 3);
        assert_eq!(Halt { code: 300, pc: 0 }.exit_status(), 255);
    }
}
