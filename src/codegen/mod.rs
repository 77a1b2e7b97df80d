// This module generates t86 code from the optimized IR in a single walk that allocates
// registers and emits instructions at the same time. Every value lives in exactly one place
// (a register, a frame slot, a data slot, the machine stack or an immediate) recorded in the
// instruction's storage field. Registers are handed out greedily, lowest first; whenever a
// freshly produced result leaves fewer than two registers free it is pushed to the machine
// stack right away, so the allocator never runs dry and never needs live ranges. Spilled
// values are consumed in LIFO order, which the lowering guarantees by evaluating operands in
// the order they are used. Around a call every occupied register is pushed and popped back
// afterwards; arguments are pushed by the caller and dropped with one SP adjustment after the
// call returns; results come back in the extra return register, which is never allocatable.
// All transfers are emitted unresolved and patched in a second pass: block jumps at the end
// of each function, calls and function addresses at the end of the program.

//! IR to t86 code generation.

mod select;

use hashbrown::HashMap;

use crate::core::{
    CompilationSession, CompileError, CompileResult, RegId, RegisterFile, MAX_REGISTERS,
};
use crate::ir::{BlockId, FuncId, InstrId, IrProgram, Storage};
use crate::t86::{AluOp, Cond, Instr, Label, MemRef, Operand, ProgramBuilder, Register, TargetProgram};

/// Name of the function the program starts in.
pub const ENTRY_POINT: &str = "main";

pub struct Generator<'s> {
    session: &'s CompilationSession,
    builder: ProgramBuilder,
    regs: RegisterFile,
    /// Remaining readers of each instruction's value.
    uses: Vec<u32>,
    block_labels: HashMap<BlockId, Label>,
    function_labels: HashMap<FuncId, Label>,
    /// Block transfers waiting for their target, resolved per function.
    pending_jumps: Vec<(Label, BlockId)>,
    /// Calls and function address loads, resolved at the end of the program.
    pending_calls: Vec<(Label, FuncId)>,
    /// `return` jumps of the current function, patched to its epilogue.
    return_jumps: Vec<Label>,
    /// Registers pushed at each open call window, innermost last.
    saved: Vec<Vec<RegId>>,
    /// Comparisons whose flags feed the next conditional jump.
    fused: HashMap<InstrId, Cond>,
}

impl<'s> Generator<'s> {
    pub fn new(register_count: usize, session: &'s CompilationSession) -> CompileResult<Self> {
        if !(2..=MAX_REGISTERS).contains(&register_count) {
            return Err(CompileError::Configuration {
                reason: format!(
                    "register count must be between 2 and {}, got {}",
                    MAX_REGISTERS, register_count
                ),
            });
        }
        Ok(Self {
            session,
            builder: ProgramBuilder::new(),
            regs: RegisterFile::new(register_count),
            uses: Vec::new(),
            block_labels: HashMap::new(),
            function_labels: HashMap::new(),
            pending_jumps: Vec::new(),
            pending_calls: Vec::new(),
            return_jumps: Vec::new(),
            saved: Vec::new(),
            fused: HashMap::new(),
        })
    }

    pub fn register_count(&self) -> usize {
        self.regs.register_count()
    }

    /// The register results are returned in.
    pub fn return_register(&self) -> Register {
        Register::Gp(self.regs.register_count() as u8)
    }

    /// Generate the whole program: a jump over the functions to the global initializers,
    /// every function, the initializers, and finally a jump into `main`.
    pub fn generate(mut self, prog: &mut IrProgram) -> CompileResult<TargetProgram> {
        let entry = prog
            .function_by_name(ENTRY_POINT)
            .ok_or(CompileError::MissingEntryPoint)?;

        self.count_uses(prog);

        for (slot, global) in prog.globals.clone().into_iter().enumerate() {
            prog.instr_mut(global).storage = Storage::Memory(slot as i64);
        }
        let data = vec![0; prog.globals.len()];

        let to_init = self.builder.add(Instr::Jmp { target: None });

        let functions: Vec<FuncId> = prog.function_ids().collect();
        for func in functions {
            self.generate_function(prog, func)?;
        }

        let init = self.builder.add(Instr::Nop);
        self.builder.patch(to_init, init)?;
        self.regs.reset();
        let decls = prog.decls.clone();
        for id in decls {
            self.emit(prog, id)?;
        }
        let to_main = self.builder.add(Instr::Jmp { target: None });
        self.pending_calls.push((to_main, entry));

        for (label, func) in std::mem::take(&mut self.pending_calls) {
            let dest = *self.function_labels.get(&func).ok_or_else(|| {
                CompileError::internal(format!("function {} was never generated", func.index()))
            })?;
            self.builder.patch(label, dest)?;
        }

        self.session.record_target_instructions(self.builder.len());
        log::info!(
            "generated {} instructions for {} functions",
            self.builder.len(),
            prog.functions.len()
        );
        let register_count = self.regs.register_count();
        Ok(self.builder.program(data, register_count))
    }

    fn count_uses(&mut self, prog: &IrProgram) {
        self.uses = vec![0; prog.instr_count()];
        for id in prog.placed_instrs() {
            for operand in prog.kind(id).operands() {
                self.uses[operand.index()] += 1;
            }
        }
    }

    fn generate_function(&mut self, prog: &mut IrProgram, func: FuncId) -> CompileResult<()> {
        let start = self.builder.len();
        self.function_labels.insert(func, start);
        self.regs.reset();
        self.saved.clear();
        self.fused.clear();

        self.builder.add(Instr::Push(Register::Bp.into()));
        self.builder.add(Instr::Mov {
            dst: Register::Bp.into(),
            src: Register::Sp.into(),
        });

        // arguments sit above the return address, the last one closest to BP
        let function = prog.function(func).clone();
        let arg_count = function.args.len() as i64;
        for (index, &arg) in function.args.iter().enumerate() {
            prog.instr_mut(arg).storage = Storage::Stack(index as i64 - (arg_count + 1));
        }
        for (index, &local) in function.allocs.iter().enumerate() {
            prog.instr_mut(local).storage = Storage::Stack(index as i64 + 1);
        }
        if !function.allocs.is_empty() {
            self.builder.add(Instr::Alu {
                op: AluOp::Sub,
                dst: Register::Sp,
                src: Operand::Imm(function.allocs.len() as i64),
            });
        }

        for &block in &function.blocks {
            self.block_labels.insert(block, self.builder.len());
            let instrs = prog.block(block).instrs.clone();
            for id in instrs {
                self.emit(prog, id)?;
            }
        }

        let epilogue = self.builder.add(Instr::Mov {
            dst: Register::Sp.into(),
            src: Register::Bp.into(),
        });
        self.builder.add(Instr::Pop(Register::Bp));
        if function.name == ENTRY_POINT {
            self.builder.add(Instr::Halt);
        } else {
            self.builder.add(Instr::Ret);
        }

        for label in std::mem::take(&mut self.return_jumps) {
            self.builder.patch(label, epilogue)?;
        }
        for (label, block) in std::mem::take(&mut self.pending_jumps) {
            let dest = *self.block_labels.get(&block).ok_or_else(|| {
                CompileError::internal(format!(
                    "jump at {} in {} targets {} which was never emitted",
                    label, function.name, block
                ))
            })?;
            self.builder.patch(label, dest)?;
        }

        if self.regs.free_count() != self.regs.register_count() {
            log::debug!(
                "{}: registers {:?} still held at the end of the function",
                function.name,
                self.regs.used_regs()
            );
        }

        let size = self.builder.len() - start;
        self.session.record_function_generated(&function.name, size);
        log::debug!("generated {} ({} instructions at {})", function.name, size, start);
        Ok(())
    }

    // ---- register and storage helpers --------------------------------------

    fn gp(reg: RegId) -> Register {
        Register::Gp(reg)
    }

    fn take_register(&mut self) -> CompileResult<RegId> {
        self.regs
            .take()
            .ok_or_else(|| CompileError::internal("register file exhausted"))
    }

    fn free(&mut self, reg: Option<RegId>) {
        if let Some(reg) = reg {
            self.regs.release(reg);
        }
    }

    /// Materialize a value into a register the caller then owns.
    fn to_register(&mut self, prog: &IrProgram, id: InstrId) -> CompileResult<RegId> {
        let storage = prog.instr(id).storage;
        let src = match storage {
            Storage::Register(reg) => return Ok(reg),
            Storage::Spilled => {
                let reg = self.take_register()?;
                self.builder.add(Instr::Pop(Self::gp(reg)));
                self.session.record_reload();
                return Ok(reg);
            }
            Storage::Stack(offset) => Operand::Mem(MemRef::frame(offset)),
            Storage::Memory(addr) => Operand::Mem(MemRef::Abs(addr)),
            Storage::Immediate(value) => Operand::Imm(value),
            Storage::Unassigned => {
                return Err(CompileError::internal(format!(
                    "{} is read before it has a value",
                    prog.display_instr(id)
                )))
            }
        };
        if prog.kind(id).is_alloc() {
            return Err(CompileError::internal(format!(
                "storage slot {} used as a value",
                id
            )));
        }
        let reg = self.take_register()?;
        self.builder.add(Instr::Mov {
            dst: Self::gp(reg).into(),
            src,
        });
        Ok(reg)
    }

    /// Operand form of a value: immediates stay inline, everything else gets a register.
    fn to_operand(&mut self, prog: &IrProgram, id: InstrId) -> CompileResult<(Operand, Option<RegId>)> {
        match prog.instr(id).storage {
            Storage::Immediate(value) => Ok((Operand::Imm(value), None)),
            _ => {
                let reg = self.to_register(prog, id)?;
                Ok((Self::gp(reg).into(), Some(reg)))
            }
        }
    }

    /// Memory operand of a storage slot.
    fn slot(prog: &IrProgram, alloc: InstrId) -> CompileResult<MemRef> {
        match prog.instr(alloc).storage {
            Storage::Stack(offset) => Ok(MemRef::frame(offset)),
            Storage::Memory(addr) => Ok(MemRef::Abs(addr)),
            other => Err(CompileError::internal(format!(
                "slot {} has storage {:?}",
                alloc, other
            ))),
        }
    }

    /// Record a result held in `reg`: dropped if nothing reads it, spilled if it would leave
    /// fewer than two registers free.
    fn produce(&mut self, prog: &mut IrProgram, id: InstrId, reg: RegId) {
        if self.uses[id.index()] == 0 {
            self.regs.release(reg);
            prog.instr_mut(id).storage = Storage::Register(reg);
            return;
        }
        if self.regs.free_count() < 2 {
            self.builder.add(Instr::Push(Self::gp(reg).into()));
            self.regs.release(reg);
            self.session.record_spill();
            prog.instr_mut(id).storage = Storage::Spilled;
        } else {
            prog.instr_mut(id).storage = Storage::Register(reg);
        }
    }

    /// Give `id` the storage of `source` without emitting anything.
    fn alias(&mut self, prog: &mut IrProgram, id: InstrId, source: InstrId) -> CompileResult<()> {
        let storage = prog.instr(source).storage;
        prog.instr_mut(id).storage = storage;
        if self.uses[id.index()] == 0 {
            match storage {
                Storage::Register(reg) => self.regs.release(reg),
                Storage::Spilled => {
                    let reg = self.to_register(prog, id)?;
                    self.regs.release(reg);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn jump_to(&mut self, instr: Instr, target: Option<BlockId>, from: InstrId) -> CompileResult<()> {
        let block = target
            .ok_or_else(|| CompileError::internal(format!("jump {} has no target", from)))?;
        let label = self.builder.add(instr);
        self.pending_jumps.push((label, block));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{InstrKind, ResultType};

    fn main_with(prog: &mut IrProgram, build: impl FnOnce(&mut IrProgram) -> Vec<InstrId>) {
        let address = prog.add(ResultType::Void, InstrKind::FunAddress { func: FuncId(0) });
        let block = prog.new_block();
        let instrs = build(prog);
        prog.block_mut(block).instrs = instrs;
        prog.functions.push(crate::ir::Function {
            name: ENTRY_POINT.into(),
            ret: ResultType::Integer,
            args: Vec::new(),
            allocs: Vec::new(),
            blocks: vec![block],
            address,
        });
    }

    #[test]
    fn test_register_count_is_validated() {
        let session = CompilationSession::new();
        assert!(matches!(
            Generator::new(1, &session),
            Err(CompileError::Configuration { .. })
        ));
        assert!(Generator::new(2, &session).is_ok());
        assert!(Generator::new(MAX_REGISTERS + 1, &session).is_err());
    }

    #[test]
    fn test_missing_main() {
        let session = CompilationSession::new();
        let mut prog = IrProgram::new();
        let err = Generator::new(4, &session).unwrap().generate(&mut prog).unwrap_err();
        assert_eq!(err, CompileError::MissingEntryPoint);
    }

    #[test]
    fn test_layout_and_return_register() {
        let session = CompilationSession::new();
        let mut prog = IrProgram::new();
        main_with(&mut prog, |prog| {
            let value = prog.add(ResultType::Integer, InstrKind::LoadImmInt(40));
            let ret = prog.add(ResultType::Void, InstrKind::Return { value: Some(value) });
            vec![value, ret]
        });
        let program = Generator::new(4, &session).unwrap().generate(&mut prog).unwrap();

        assert_eq!(program.register_count, 4);
        assert_eq!(program.return_register(), Register::Gp(4));
        // entry jump skips the function and lands on the init region
        let Instr::Jmp { target: Some(init) } = program.instructions[0] else {
            panic!("program must start with a jump");
        };
        assert_eq!(program.instructions[init], Instr::Nop);
        assert_eq!(program.instructions[init + 1], Instr::Jmp { target: Some(1) });
        assert!(program.instructions.contains(&Instr::Mov {
            dst: Register::Gp(4).into(),
            src: Operand::Imm(40),
        }));
        assert!(program.instructions.contains(&Instr::Halt));
    }

    #[test]
    fn test_unresolved_jump_is_internal_error() {
        let session = CompilationSession::new();
        let mut prog = IrProgram::new();
        main_with(&mut prog, |prog| {
            let jump = prog.add(ResultType::Void, InstrKind::Jump { target: None });
            vec![jump]
        });
        let err = Generator::new(4, &session).unwrap().generate(&mut prog).unwrap_err();
        assert!(err.is_internal());
    }
}
