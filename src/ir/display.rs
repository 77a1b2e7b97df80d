//! Text form of the IR, one instruction per line.

use std::fmt;

use super::{Block, InstrId, InstrKind, IrProgram, Storage};

fn target(block: &Option<super::BlockId>) -> String {
    match block {
        Some(block) => block.to_string(),
        None => "?".to_string(),
    }
}

fn list(ids: &[InstrId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl IrProgram {
    /// Render a single instruction, `%n = op operands : type`.
    pub fn display_instr(&self, id: InstrId) -> String {
        let instr = self.instr(id);
        let body = match &instr.kind {
            InstrKind::FunAddress { func } => format!("funaddr @{}", self.function(*func).name),
            InstrKind::AllocGlobal => "alloc.g".to_string(),
            InstrKind::AllocLocal => "alloc.l".to_string(),
            InstrKind::AllocArg => "alloc.arg".to_string(),
            InstrKind::Load { addr } => format!("load {}", addr),
            InstrKind::LoadImmInt(v) => format!("imm.i {}", v),
            InstrKind::LoadImmChar(v) => format!("imm.c {}", v),
            InstrKind::LoadImmDouble(v) => format!("imm.d {}", v),
            InstrKind::LoadAddress { addr } => format!("addr {}", addr),
            InstrKind::LoadDeref { addr } => format!("deref {}", addr),
            InstrKind::LoadFun { func } => format!("loadfun {}", func),
            InstrKind::Store { addr, value } => format!("store {}, {}", addr, value),
            InstrKind::StoreParam { value } => format!("param {}", value),
            InstrKind::Return { value: Some(value) } => format!("ret {}", value),
            InstrKind::Return { value: None } => "ret".to_string(),
            InstrKind::DebugWrite { value } => format!("write {}", value),
            InstrKind::Jump { target: to } => format!("jmp {}", target(to)),
            InstrKind::JumpCond {
                cond,
                on_true,
                on_false,
            } => format!("br {}, {}, {}", cond, target(on_true), target(on_false)),
            InstrKind::CondSwitch {
                cond,
                cases,
                default,
            } => {
                let arms = cases
                    .iter()
                    .map(|(value, block)| format!("{} => {}", value, block))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("switch {} [{}] default {}", cond, arms, target(default))
            }
            InstrKind::Binary {
                op,
                lhs,
                rhs,
                cmp_jump,
            } => {
                let suffix = if *cmp_jump { " (branch)" } else { "" };
                format!("{} {}, {}{}", op.name(), lhs, rhs, suffix)
            }
            InstrKind::Unary { op, operand } => format!("{} {}", op.name(), operand),
            InstrKind::Cast { op, value } => format!("cast.{} {}", op.name(), value),
            InstrKind::Call { callee, args } => format!("call {}({})", callee, list(args)),
            InstrKind::CallStatic { callee, args } => {
                let name = match self.kind(*callee) {
                    InstrKind::FunAddress { func } => self.function(*func).name.clone(),
                    _ => callee.to_string(),
                };
                format!("call @{}({})", name, list(args))
            }
            InstrKind::BorderCall { call, start } => {
                format!("border.{} {}", if *start { "begin" } else { "end" }, call)
            }
            InstrKind::Nop => "nop".to_string(),
        };

        let mut line = format!("{} = {} : {}", id, body, instr.ty);
        match instr.storage {
            Storage::Unassigned => {}
            Storage::Register(r) => line.push_str(&format!(" [R{}]", r)),
            Storage::Stack(off) => line.push_str(&format!(" [BP-{}]", off)),
            Storage::Memory(addr) => line.push_str(&format!(" [{}]", addr)),
            Storage::Spilled => line.push_str(" [spilled]"),
            Storage::Immediate(v) => line.push_str(&format!(" [#{}]", v)),
        }
        line
    }

    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
        writeln!(f, "{}:", block.id)?;
        for &id in &block.instrs {
            writeln!(f, "    {}", self.display_instr(id))?;
        }
        Ok(())
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &global in &self.globals {
            writeln!(f, "global {}", self.display_instr(global))?;
        }

        if !self.decls.is_empty() {
            writeln!(f, "decls:")?;
            for &id in &self.decls {
                writeln!(f, "    {}", self.display_instr(id))?;
            }
        }

        for func in &self.functions {
            writeln!(f)?;
            writeln!(
                f,
                "fn {}({}) -> {}",
                func.name,
                list(&func.args),
                func.ret
            )?;
            if !func.allocs.is_empty() {
                writeln!(f, "  locals: {}", list(&func.allocs))?;
            }
            for &block in &func.blocks {
                self.fmt_block(f, self.block(block))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinaryOp, InstrKind, IrProgram, ResultType};

    #[test]
    fn test_instruction_text() {
        let mut prog = IrProgram::new();
        let a = prog.add(ResultType::Integer, InstrKind::LoadImmInt(6));
        let b = prog.add(ResultType::Integer, InstrKind::LoadImmInt(7));
        let mul = prog.add(
            ResultType::Integer,
            InstrKind::Binary {
                op: BinaryOp::Mul,
                lhs: a,
                rhs: b,
                cmp_jump: false,
            },
        );
        assert_eq!(prog.display_instr(mul), "%2 = mul %0, %1 : int");

        let jump = prog.add(ResultType::Void, InstrKind::Jump { target: None });
        assert_eq!(prog.display_instr(jump), "%3 = jmp ? : void");
    }
}
