// This module models the t86 target: a small register machine with a configurable number of
// general purpose registers, a stack pointer, a frame pointer and a flags register. The code
// generator talks to it through ProgramBuilder, which appends fully formed instructions and
// hands back their index as a relocatable label; jump, call and label-load instructions are
// emitted without a destination and patched once the target address is known. Doubles have
// no register file of their own and travel as IEEE-754 bit patterns in general registers,
// operated on by the FADD/FSUB/FMUL/FDIV/FCMP family. Cpu is a reference executor used by the
// tests and the command line runner.

//! The t86 target machine.

mod builder;
mod cpu;

pub use builder::ProgramBuilder;
pub use cpu::{Cpu, CpuError, DEFAULT_MEMORY_SIZE, DEFAULT_TICK_LIMIT};

use std::fmt;

/// Address of an emitted instruction.
pub type Label = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Gp(u8),
    Sp,
    Bp,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Gp(n) => write!(f, "R{}", n),
            Register::Sp => f.write_str("SP"),
            Register::Bp => f.write_str("BP"),
        }
    }
}

/// Memory addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemRef {
    Abs(i64),
    Reg(Register),
    RegOffset(Register, i64),
}

impl MemRef {
    /// `[BP - offset]`, the frame slot addressing used for locals and parameters.
    pub fn frame(offset: i64) -> Self {
        MemRef::RegOffset(Register::Bp, -offset)
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemRef::Abs(addr) => write!(f, "[{}]", addr),
            MemRef::Reg(reg) => write!(f, "[{}]", reg),
            MemRef::RegOffset(reg, off) if *off < 0 => write!(f, "[{} - {}]", reg, -off),
            MemRef::RegOffset(reg, off) => write!(f, "[{} + {}]", reg, off),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
    Mem(MemRef),
    Flags,
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Imm(value)
    }
}

impl From<MemRef> for Operand {
    fn from(mem: MemRef) -> Self {
        Operand::Mem(mem)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(value) => write!(f, "{}", value),
            Operand::Mem(mem) => write!(f, "{}", mem),
            Operand::Flags => f.write_str("F"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Lsh,
    Rsh,
}

impl AluOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::Mul => "MUL",
            AluOp::Div => "DIV",
            AluOp::Mod => "MOD",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Lsh => "LSH",
            AluOp::Rsh => "RSH",
        }
    }
}

/// Arithmetic on double bit patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FAluOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl FAluOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            FAluOp::Add => "FADD",
            FAluOp::Sub => "FSUB",
            FAluOp::Mul => "FMUL",
            FAluOp::Div => "FDIV",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryAluOp {
    /// Two's complement negation.
    Neg,
    /// Bitwise complement.
    Not,
    Inc,
    Dec,
}

impl UnaryAluOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryAluOp::Neg => "NEG",
            UnaryAluOp::Not => "NOT",
            UnaryAluOp::Inc => "INC",
            UnaryAluOp::Dec => "DEC",
        }
    }
}

/// Conditional jump predicates, read from the flags of the last compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    E,
    Ne,
    G,
    Ge,
    L,
    Le,
}

impl Cond {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::E => "JE",
            Cond::Ne => "JNE",
            Cond::G => "JG",
            Cond::Ge => "JGE",
            Cond::L => "JL",
            Cond::Le => "JLE",
        }
    }

    /// Whether the predicate holds for the given flags value.
    pub fn holds(self, flags: i64) -> bool {
        let sign = flags & FLAG_SIGN != 0;
        let zero = flags & FLAG_ZERO != 0;
        match self {
            Cond::E => zero,
            Cond::Ne => !zero,
            Cond::G => !sign && !zero,
            Cond::Ge => !sign,
            Cond::L => sign,
            Cond::Le => sign || zero,
        }
    }
}

/// Set by a compare when the left operand is smaller.
pub const FLAG_SIGN: i64 = 1;
/// Set by a compare when both operands are equal.
pub const FLAG_ZERO: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    Mov { dst: Operand, src: Operand },
    Lea { dst: Register, addr: MemRef },
    Alu { op: AluOp, dst: Register, src: Operand },
    FAlu { op: FAluOp, dst: Register, src: Operand },
    Unary { op: UnaryAluOp, reg: Register },
    Cmp { lhs: Register, rhs: Operand },
    FCmp { lhs: Register, rhs: Operand },
    Jmp { target: Option<Label> },
    Jcc { cond: Cond, target: Option<Label> },
    Call { target: Option<Label> },
    CallReg { reg: Register },
    /// Load the address of an instruction into a register.
    LoadLabel { dst: Register, target: Option<Label> },
    Ret,
    Halt,
    Push(Operand),
    Pop(Register),
    Nop,
    /// Integer to double.
    Ext { dst: Register, src: Register },
    /// Double to integer, truncating.
    Nrw { dst: Register, src: Register },
    Dbg(Register),
}

impl Instr {
    /// Fill in the destination of a patchable instruction.
    ///
    /// Returns `false` for instructions without a destination.
    pub fn patch(&mut self, dest: Label) -> bool {
        match self {
            Instr::Jmp { target }
            | Instr::Jcc { target, .. }
            | Instr::Call { target }
            | Instr::LoadLabel { target, .. } => {
                *target = Some(dest);
                true
            }
            _ => false,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Instr::Push(_))
    }

    pub fn is_pop(&self) -> bool {
        matches!(self, Instr::Pop(_))
    }
}

fn fmt_target(f: &mut fmt::Formatter<'_>, target: &Option<Label>) -> fmt::Result {
    match target {
        Some(label) => write!(f, "{}", label),
        None => f.write_str("?"),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { dst, src } => write!(f, "MOV {}, {}", dst, src),
            Instr::Lea { dst, addr } => write!(f, "LEA {}, {}", dst, addr),
            Instr::Alu { op, dst, src } => write!(f, "{} {}, {}", op.mnemonic(), dst, src),
            Instr::FAlu { op, dst, src } => write!(f, "{} {}, {}", op.mnemonic(), dst, src),
            Instr::Unary { op, reg } => write!(f, "{} {}", op.mnemonic(), reg),
            Instr::Cmp { lhs, rhs } => write!(f, "CMP {}, {}", lhs, rhs),
            Instr::FCmp { lhs, rhs } => write!(f, "FCMP {}, {}", lhs, rhs),
            Instr::Jmp { target } => {
                f.write_str("JMP ")?;
                fmt_target(f, target)
            }
            Instr::Jcc { cond, target } => {
                write!(f, "{} ", cond.mnemonic())?;
                fmt_target(f, target)
            }
            Instr::Call { target } => {
                f.write_str("CALL ")?;
                fmt_target(f, target)
            }
            Instr::CallReg { reg } => write!(f, "CALL {}", reg),
            Instr::LoadLabel { dst, target } => {
                write!(f, "MOV {}, ", dst)?;
                fmt_target(f, target)
            }
            Instr::Ret => f.write_str("RET"),
            Instr::Halt => f.write_str("HALT"),
            Instr::Push(op) => write!(f, "PUSH {}", op),
            Instr::Pop(reg) => write!(f, "POP {}", reg),
            Instr::Nop => f.write_str("NOP"),
            Instr::Ext { dst, src } => write!(f, "EXT {}, {}", dst, src),
            Instr::Nrw { dst, src } => write!(f, "NRW {}, {}", dst, src),
            Instr::Dbg(reg) => write!(f, "DBG {}", reg),
        }
    }
}

/// Output of the code generator.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetProgram {
    pub instructions: Vec<Instr>,
    /// Initial contents of the data segment, loaded at address 0.
    pub data: Vec<i64>,
    /// Allocatable general purpose registers; `R{register_count}` holds return values.
    pub register_count: usize,
}

impl TargetProgram {
    pub fn return_register(&self) -> Register {
        Register::Gp(self.register_count as u8)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for TargetProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".data")?;
        for value in &self.data {
            writeln!(f, "  {}", value)?;
        }
        writeln!(f, ".text")?;
        for (addr, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{:>5}  {}", addr, instr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_listing() {
        let mov = Instr::Mov {
            dst: Register::Gp(1).into(),
            src: MemRef::frame(2).into(),
        };
        assert_eq!(mov.to_string(), "MOV R1, [BP - 2]");

        let param = Instr::Mov {
            dst: Register::Gp(0).into(),
            src: MemRef::frame(-3).into(),
        };
        assert_eq!(param.to_string(), "MOV R0, [BP + 3]");

        assert_eq!(Instr::Jmp { target: None }.to_string(), "JMP ?");
        assert_eq!(
            Instr::Jcc {
                cond: Cond::Le,
                target: Some(12)
            }
            .to_string(),
            "JLE 12"
        );
        assert_eq!(Instr::Push(Operand::Flags).to_string(), "PUSH F");
    }

    #[test]
    fn test_patch_only_touches_transfers() {
        let mut jump = Instr::Call { target: None };
        assert!(jump.patch(7));
        assert_eq!(jump, Instr::Call { target: Some(7) });

        let mut nop = Instr::Nop;
        assert!(!nop.patch(7));
    }

    #[test]
    fn test_condition_flags() {
        // 1 < 2
        assert!(Cond::L.holds(FLAG_SIGN));
        assert!(Cond::Le.holds(FLAG_SIGN));
        assert!(!Cond::Ge.holds(FLAG_SIGN));
        // 2 == 2
        assert!(Cond::E.holds(FLAG_ZERO));
        assert!(Cond::Ge.holds(FLAG_ZERO));
        assert!(!Cond::G.holds(FLAG_ZERO));
        // 3 > 2
        assert!(Cond::G.holds(0));
        assert!(Cond::Ne.holds(0));
    }
}
