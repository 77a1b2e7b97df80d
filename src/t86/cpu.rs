//! Reference executor for t86 programs.
//!
//! One instruction per tick, no pipeline. Memory is word addressed; the data segment is
//! copied to address 0 and the stack grows down from the top.

use thiserror::Error;

use super::{
    AluOp, FAluOp, Instr, MemRef, Operand, Register, TargetProgram, UnaryAluOp, FLAG_SIGN,
    FLAG_ZERO,
};

pub const DEFAULT_MEMORY_SIZE: usize = 4096;
pub const DEFAULT_TICK_LIMIT: u64 = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpuError {
    #[error("invalid memory address {address} at pc {pc}")]
    InvalidAddress { address: i64, pc: usize },

    #[error("division by zero at pc {pc}")]
    DivisionByZero { pc: usize },

    #[error("tick limit of {limit} exceeded")]
    TickLimitExceeded { limit: u64 },

    #[error("program counter {pc} is outside the program")]
    PcOutOfRange { pc: usize },

    #[error("transfer at pc {pc} was never patched")]
    UnresolvedTarget { pc: usize },

    #[error("'{instr}' at pc {pc} has an invalid operand")]
    InvalidOperand { instr: String, pc: usize },
}

pub struct Cpu {
    program: Vec<Instr>,
    regs: Vec<i64>,
    sp: i64,
    bp: i64,
    flags: i64,
    pc: usize,
    memory: Vec<i64>,
    ticks: u64,
    tick_limit: u64,
    output: Vec<i64>,
    halted: bool,
}

impl Cpu {
    pub fn new(program: &TargetProgram) -> Self {
        Self::with_limits(program, DEFAULT_MEMORY_SIZE, DEFAULT_TICK_LIMIT)
    }

    pub fn with_limits(program: &TargetProgram, memory_size: usize, tick_limit: u64) -> Self {
        let mut memory = vec![0; memory_size.max(program.data.len())];
        memory[..program.data.len()].copy_from_slice(&program.data);
        Self {
            program: program.instructions.clone(),
            // one extra register for return values
            regs: vec![0; program.register_count + 1],
            sp: memory.len() as i64,
            bp: memory.len() as i64,
            flags: 0,
            pc: 0,
            memory,
            ticks: 0,
            tick_limit,
            output: Vec::new(),
            halted: false,
        }
    }

    /// Execute until `HALT`.
    pub fn run(&mut self) -> Result<(), CpuError> {
        while !self.halted {
            self.step()?;
        }
        log::debug!("cpu halted after {} ticks", self.ticks);
        Ok(())
    }

    pub fn step(&mut self) -> Result<(), CpuError> {
        if self.ticks >= self.tick_limit {
            return Err(CpuError::TickLimitExceeded {
                limit: self.tick_limit,
            });
        }
        self.ticks += 1;

        let pc = self.pc;
        let instr = *self
            .program
            .get(pc)
            .ok_or(CpuError::PcOutOfRange { pc })?;
        self.pc += 1;

        match instr {
            Instr::Mov { dst, src } => {
                let value = self.read(src)?;
                self.write(dst, value, &instr)?;
            }
            Instr::Lea { dst, addr } => {
                let address = self.address(addr);
                self.set(dst, address);
            }
            Instr::Alu { op, dst, src } => {
                let a = self.get(dst);
                let b = self.read(src)?;
                let result = match op {
                    AluOp::Add => a.wrapping_add(b),
                    AluOp::Sub => a.wrapping_sub(b),
                    AluOp::Mul => a.wrapping_mul(b),
                    AluOp::Div if b == 0 => return Err(CpuError::DivisionByZero { pc }),
                    AluOp::Div => a.wrapping_div(b),
                    AluOp::Mod if b == 0 => return Err(CpuError::DivisionByZero { pc }),
                    AluOp::Mod => a.wrapping_rem(b),
                    AluOp::And => a & b,
                    AluOp::Or => a | b,
                    AluOp::Xor => a ^ b,
                    AluOp::Lsh => a.wrapping_shl(b as u32),
                    AluOp::Rsh => a.wrapping_shr(b as u32),
                };
                self.set(dst, result);
            }
            Instr::FAlu { op, dst, src } => {
                let a = f64::from_bits(self.get(dst) as u64);
                let b = f64::from_bits(self.read(src)? as u64);
                let result = match op {
                    FAluOp::Add => a + b,
                    FAluOp::Sub => a - b,
                    FAluOp::Mul => a * b,
                    FAluOp::Div => a / b,
                };
                self.set(dst, result.to_bits() as i64);
            }
            Instr::Unary { op, reg } => {
                let a = self.get(reg);
                let result = match op {
                    UnaryAluOp::Neg => a.wrapping_neg(),
                    UnaryAluOp::Not => !a,
                    UnaryAluOp::Inc => a.wrapping_add(1),
                    UnaryAluOp::Dec => a.wrapping_sub(1),
                };
                self.set(reg, result);
            }
            Instr::Cmp { lhs, rhs } => {
                let a = self.get(lhs);
                let b = self.read(rhs)?;
                self.flags = compare(a.cmp(&b));
            }
            Instr::FCmp { lhs, rhs } => {
                let a = f64::from_bits(self.get(lhs) as u64);
                let b = f64::from_bits(self.read(rhs)? as u64);
                // unordered compares as "not equal, not less"
                self.flags = a.partial_cmp(&b).map(compare).unwrap_or(0);
            }
            Instr::Jmp { target } => self.pc = resolved(target, pc)?,
            Instr::Jcc { cond, target } => {
                let dest = resolved(target, pc)?;
                if cond.holds(self.flags) {
                    self.pc = dest;
                }
            }
            Instr::Call { target } => {
                let dest = resolved(target, pc)?;
                self.push(self.pc as i64, pc)?;
                self.pc = dest;
            }
            Instr::CallReg { reg } => {
                let dest = self.get(reg);
                self.push(self.pc as i64, pc)?;
                self.pc = usize::try_from(dest).map_err(|_| CpuError::PcOutOfRange { pc })?;
            }
            Instr::LoadLabel { dst, target } => {
                let dest = resolved(target, pc)?;
                self.set(dst, dest as i64);
            }
            Instr::Ret => {
                let dest = self.pop(pc)?;
                self.pc = usize::try_from(dest).map_err(|_| CpuError::PcOutOfRange { pc })?;
            }
            Instr::Halt => self.halted = true,
            Instr::Push(src) => {
                let value = self.read(src)?;
                self.push(value, pc)?;
            }
            Instr::Pop(reg) => {
                let value = self.pop(pc)?;
                self.set(reg, value);
            }
            Instr::Nop => {}
            Instr::Ext { dst, src } => {
                let value = self.get(src) as f64;
                self.set(dst, value.to_bits() as i64);
            }
            Instr::Nrw { dst, src } => {
                let value = f64::from_bits(self.get(src) as u64);
                self.set(dst, value as i64);
            }
            Instr::Dbg(reg) => {
                let value = self.get(reg);
                log::debug!("dbg: {}", value);
                self.output.push(value);
            }
        }
        Ok(())
    }

    pub fn register(&self, reg: Register) -> i64 {
        self.get(reg)
    }

    /// Value left in the return register.
    pub fn return_value(&self) -> i64 {
        self.regs[self.regs.len() - 1]
    }

    pub fn memory(&self, address: usize) -> Option<i64> {
        self.memory.get(address).copied()
    }

    pub fn output(&self) -> &[i64] {
        &self.output
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn get(&self, reg: Register) -> i64 {
        match reg {
            Register::Gp(n) => self.regs.get(n as usize).copied().unwrap_or(0),
            Register::Sp => self.sp,
            Register::Bp => self.bp,
        }
    }

    fn set(&mut self, reg: Register, value: i64) {
        match reg {
            Register::Gp(n) => {
                let n = n as usize;
                if n >= self.regs.len() {
                    self.regs.resize(n + 1, 0);
                }
                self.regs[n] = value;
            }
            Register::Sp => self.sp = value,
            Register::Bp => self.bp = value,
        }
    }

    fn address(&self, mem: MemRef) -> i64 {
        match mem {
            MemRef::Abs(addr) => addr,
            MemRef::Reg(reg) => self.get(reg),
            MemRef::RegOffset(reg, off) => self.get(reg).wrapping_add(off),
        }
    }

    fn slot(&self, address: i64, pc: usize) -> Result<usize, CpuError> {
        usize::try_from(address)
            .ok()
            .filter(|&a| a < self.memory.len())
            .ok_or(CpuError::InvalidAddress { address, pc })
    }

    fn load(&self, address: i64, pc: usize) -> Result<i64, CpuError> {
        let slot = self.slot(address, pc)?;
        Ok(self.memory[slot])
    }

    fn store(&mut self, address: i64, value: i64, pc: usize) -> Result<(), CpuError> {
        let slot = self.slot(address, pc)?;
        self.memory[slot] = value;
        Ok(())
    }

    fn read(&self, op: Operand) -> Result<i64, CpuError> {
        match op {
            Operand::Reg(reg) => Ok(self.get(reg)),
            Operand::Imm(value) => Ok(value),
            Operand::Mem(mem) => self.load(self.address(mem), self.pc - 1),
            Operand::Flags => Ok(self.flags),
        }
    }

    fn write(&mut self, op: Operand, value: i64, instr: &Instr) -> Result<(), CpuError> {
        let pc = self.pc - 1;
        match op {
            Operand::Reg(reg) => {
                self.set(reg, value);
                Ok(())
            }
            Operand::Mem(mem) => self.store(self.address(mem), value, pc),
            Operand::Flags => {
                self.flags = value;
                Ok(())
            }
            Operand::Imm(_) => Err(CpuError::InvalidOperand {
                instr: instr.to_string(),
                pc,
            }),
        }
    }

    fn push(&mut self, value: i64, pc: usize) -> Result<(), CpuError> {
        self.sp -= 1;
        self.store(self.sp, value, pc)
    }

    fn pop(&mut self, pc: usize) -> Result<i64, CpuError> {
        let value = self.load(self.sp, pc)?;
        self.sp += 1;
        Ok(value)
    }
}

fn compare(ordering: std::cmp::Ordering) -> i64 {
    match ordering {
        std::cmp::Ordering::Less => FLAG_SIGN,
        std::cmp::Ordering::Equal => FLAG_ZERO,
        std::cmp::Ordering::Greater => 0,
    }
}

fn resolved(target: Option<usize>, pc: usize) -> Result<usize, CpuError> {
    target.ok_or(CpuError::UnresolvedTarget { pc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::t86::{Cond, ProgramBuilder};

    fn r(n: u8) -> Register {
        Register::Gp(n)
    }

    fn run(instrs: Vec<Instr>) -> Result<Cpu, CpuError> {
        let mut builder = ProgramBuilder::new();
        for instr in instrs {
            builder.add(instr);
        }
        let program = builder.program(vec![0; 4], 2);
        let mut cpu = Cpu::new(&program);
        cpu.run()?;
        Ok(cpu)
    }

    #[test]
    fn test_arithmetic_and_return_register() {
        let cpu = run(vec![
            Instr::Mov { dst: r(0).into(), src: Operand::Imm(6) },
            Instr::Alu { op: AluOp::Mul, dst: r(0), src: Operand::Imm(7) },
            Instr::Mov { dst: r(2).into(), src: r(0).into() },
            Instr::Halt,
        ])
        .unwrap();
        assert_eq!(cpu.return_value(), 42);
        assert_eq!(cpu.ticks(), 4);
    }

    #[test]
    fn test_stack_and_call() {
        let cpu = run(vec![
            // call the routine at 4
            Instr::Push(Operand::Imm(5)),
            Instr::Call { target: Some(4) },
            Instr::Halt,
            Instr::Nop,
            // 4: R0 = arg + 1, arg lives above the return address
            Instr::Mov { dst: r(0).into(), src: MemRef::RegOffset(Register::Sp, 1).into() },
            Instr::Unary { op: UnaryAluOp::Inc, reg: r(0) },
            Instr::Dbg(r(0)),
            Instr::Ret,
        ])
        .unwrap();
        assert_eq!(cpu.output(), &[6]);
        assert_eq!(cpu.register(Register::Sp), DEFAULT_MEMORY_SIZE as i64 - 1);
    }

    #[test]
    fn test_flags_drive_jumps() {
        let cpu = run(vec![
            Instr::Mov { dst: r(0).into(), src: Operand::Imm(1) },
            Instr::Cmp { lhs: r(0), rhs: Operand::Imm(2) },
            Instr::Jcc { cond: Cond::L, target: Some(5) },
            Instr::Mov { dst: r(1).into(), src: Operand::Imm(100) },
            Instr::Halt,
            Instr::Mov { dst: r(1).into(), src: Operand::Flags },
            Instr::Halt,
        ])
        .unwrap();
        assert_eq!(cpu.register(r(1)), FLAG_SIGN);
    }

    #[test]
    fn test_double_bits() {
        let cpu = run(vec![
            Instr::Mov { dst: r(0).into(), src: Operand::Imm(3) },
            Instr::Ext { dst: r(0), src: r(0) },
            Instr::Mov { dst: r(1).into(), src: Operand::Imm(0.5f64.to_bits() as i64) },
            Instr::FAlu { op: FAluOp::Mul, dst: r(0), src: r(1).into() },
            Instr::Nrw { dst: r(0), src: r(0) },
            Instr::Halt,
        ])
        .unwrap();
        assert_eq!(cpu.register(r(0)), 1);
    }

    #[test]
    fn test_errors() {
        let div = run(vec![
            Instr::Mov { dst: r(0).into(), src: Operand::Imm(1) },
            Instr::Alu { op: AluOp::Div, dst: r(0), src: Operand::Imm(0) },
            Instr::Halt,
        ]);
        assert_eq!(div.err(), Some(CpuError::DivisionByZero { pc: 1 }));

        let unpatched = run(vec![Instr::Jmp { target: None }]);
        assert_eq!(unpatched.err(), Some(CpuError::UnresolvedTarget { pc: 0 }));

        let runaway = run(vec![Instr::Nop]);
        assert_eq!(runaway.err(), Some(CpuError::PcOutOfRange { pc: 1 }));

        let bad = run(vec![
            Instr::Mov { dst: r(0).into(), src: MemRef::Abs(-1).into() },
            Instr::Halt,
        ]);
        assert!(matches!(bad, Err(CpuError::InvalidAddress { address: -1, .. })));
    }

    #[test]
    fn test_tick_limit() {
        let program = TargetProgram {
            instructions: vec![Instr::Jmp { target: Some(0) }],
            data: vec![],
            register_count: 2,
        };
        let mut cpu = Cpu::with_limits(&program, 64, 100);
        assert_eq!(cpu.run(), Err(CpuError::TickLimitExceeded { limit: 100 }));
    }
}
