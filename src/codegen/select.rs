//! Per-instruction selection.

use super::Generator;
use crate::core::{CompileError, CompileResult, RegId};
use crate::ir::{BinaryOp, CastOp, InstrId, InstrKind, IrProgram, ResultType, Storage, UnaryOp};
use crate::t86::{AluOp, Cond, FAluOp, Instr, MemRef, Operand, Register, UnaryAluOp};

fn condition(op: BinaryOp) -> Option<Cond> {
    match op {
        BinaryOp::Lt => Some(Cond::L),
        BinaryOp::Le => Some(Cond::Le),
        BinaryOp::Gt => Some(Cond::G),
        BinaryOp::Ge => Some(Cond::Ge),
        BinaryOp::Eq => Some(Cond::E),
        BinaryOp::NEq => Some(Cond::Ne),
        _ => None,
    }
}

fn alu(op: BinaryOp) -> Option<AluOp> {
    match op {
        BinaryOp::Add => Some(AluOp::Add),
        BinaryOp::Sub => Some(AluOp::Sub),
        BinaryOp::Mul => Some(AluOp::Mul),
        BinaryOp::Div => Some(AluOp::Div),
        BinaryOp::Mod => Some(AluOp::Mod),
        BinaryOp::ShL => Some(AluOp::Lsh),
        BinaryOp::ShR => Some(AluOp::Rsh),
        BinaryOp::BitAnd => Some(AluOp::And),
        BinaryOp::BitOr => Some(AluOp::Or),
        BinaryOp::Xor => Some(AluOp::Xor),
        _ => None,
    }
}

fn float_alu(op: BinaryOp) -> Option<FAluOp> {
    match op {
        BinaryOp::Add => Some(FAluOp::Add),
        BinaryOp::Sub => Some(FAluOp::Sub),
        BinaryOp::Mul => Some(FAluOp::Mul),
        BinaryOp::Div => Some(FAluOp::Div),
        _ => None,
    }
}

impl<'s> Generator<'s> {
    pub(super) fn emit(&mut self, prog: &mut IrProgram, id: InstrId) -> CompileResult<()> {
        let kind = prog.kind(id).clone();
        match kind {
            // storage declarations and function addresses are laid out, not executed
            InstrKind::FunAddress { .. }
            | InstrKind::AllocGlobal
            | InstrKind::AllocLocal
            | InstrKind::AllocArg => {}

            InstrKind::LoadImmInt(value) => prog.instr_mut(id).storage = Storage::Immediate(value),
            InstrKind::LoadImmChar(value) => {
                prog.instr_mut(id).storage = Storage::Immediate(i64::from(value))
            }
            InstrKind::LoadImmDouble(value) => {
                prog.instr_mut(id).storage = Storage::Immediate(value.to_bits() as i64)
            }

            InstrKind::Load { addr } => {
                let reg = if prog.kind(addr).is_alloc() {
                    let slot = Self::slot(prog, addr)?;
                    let reg = self.take_register()?;
                    self.builder.add(Instr::Mov {
                        dst: Self::gp(reg).into(),
                        src: slot.into(),
                    });
                    reg
                } else {
                    self.load_through(prog, addr)?
                };
                self.produce(prog, id, reg);
            }
            InstrKind::LoadDeref { addr } => {
                let reg = self.load_through(prog, addr)?;
                self.produce(prog, id, reg);
            }
            InstrKind::LoadAddress { addr } => {
                let reg = self.take_register()?;
                match Self::slot(prog, addr)? {
                    MemRef::Abs(address) => self.builder.add(Instr::Mov {
                        dst: Self::gp(reg).into(),
                        src: Operand::Imm(address),
                    }),
                    slot => self.builder.add(Instr::Lea {
                        dst: Self::gp(reg),
                        addr: slot,
                    }),
                };
                self.produce(prog, id, reg);
            }
            InstrKind::LoadFun { func } => {
                let InstrKind::FunAddress { func } = *prog.kind(func) else {
                    return Err(CompileError::internal(format!(
                        "{} does not name a function",
                        func
                    )));
                };
                let reg = self.take_register()?;
                let label = self.builder.add(Instr::LoadLabel {
                    dst: Self::gp(reg),
                    target: None,
                });
                self.pending_calls.push((label, func));
                self.produce(prog, id, reg);
            }

            InstrKind::Store { addr, value } => self.store(prog, id, addr, value)?,
            InstrKind::StoreParam { value } => {
                let (src, reg) = self.to_operand(prog, value)?;
                self.builder.add(Instr::Push(src));
                self.free(reg);
            }
            InstrKind::Return { value } => {
                if let Some(value) = value {
                    let (src, reg) = self.to_operand(prog, value)?;
                    let ret = self.return_register();
                    self.builder.add(Instr::Mov {
                        dst: ret.into(),
                        src,
                    });
                    self.free(reg);
                }
                let label = self.builder.add(Instr::Jmp { target: None });
                self.return_jumps.push(label);
            }
            InstrKind::DebugWrite { value } => {
                let reg = self.to_register(prog, value)?;
                self.builder.add(Instr::Dbg(Self::gp(reg)));
                self.regs.release(reg);
            }

            InstrKind::Jump { target } => self.jump_to(Instr::Jmp { target: None }, target, id)?,
            InstrKind::JumpCond {
                cond,
                on_true,
                on_false,
            } => {
                let taken = match self.fused.remove(&cond) {
                    Some(taken) => taken,
                    None => {
                        let reg = self.to_register(prog, cond)?;
                        self.compare_zero(prog.ty(cond), reg);
                        self.regs.release(reg);
                        Cond::Ne
                    }
                };
                self.jump_to(Instr::Jcc { cond: taken, target: None }, on_true, id)?;
                self.jump_to(Instr::Jmp { target: None }, on_false, id)?;
            }
            InstrKind::CondSwitch {
                cond,
                cases,
                default,
            } => {
                let reg = self.to_register(prog, cond)?;
                for (value, block) in cases {
                    self.builder.add(Instr::Cmp {
                        lhs: Self::gp(reg),
                        rhs: Operand::Imm(value),
                    });
                    self.jump_to(
                        Instr::Jcc {
                            cond: Cond::E,
                            target: None,
                        },
                        Some(block),
                        id,
                    )?;
                }
                self.regs.release(reg);
                if default.is_some() {
                    self.jump_to(Instr::Jmp { target: None }, default, id)?;
                }
            }

            InstrKind::Binary {
                op,
                lhs,
                rhs,
                cmp_jump,
            } => {
                if let Some(cond) = condition(op) {
                    self.comparison(prog, id, cond, lhs, rhs, cmp_jump)?;
                } else if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    self.logical(prog, id, op, lhs, rhs)?;
                } else {
                    self.arithmetic(prog, id, op, lhs, rhs)?;
                }
            }
            InstrKind::Unary { op, operand } => self.unary(prog, id, op, operand)?,
            InstrKind::Cast { op, value } => match op {
                CastOp::CharToInt => self.alias(prog, id, value)?,
                CastOp::IntToDouble | CastOp::CharToDouble => {
                    let reg = self.to_register(prog, value)?;
                    self.builder.add(Instr::Ext {
                        dst: Self::gp(reg),
                        src: Self::gp(reg),
                    });
                    self.produce(prog, id, reg);
                }
                CastOp::DoubleToInt => {
                    let reg = self.to_register(prog, value)?;
                    self.builder.add(Instr::Nrw {
                        dst: Self::gp(reg),
                        src: Self::gp(reg),
                    });
                    self.produce(prog, id, reg);
                }
            },

            InstrKind::Call { callee, args } => {
                let reg = self.to_register(prog, callee)?;
                self.builder.add(Instr::CallReg { reg: Self::gp(reg) });
                self.regs.release(reg);
                self.drop_arguments(args.len());
            }
            InstrKind::CallStatic { callee, args } => {
                let InstrKind::FunAddress { func } = *prog.kind(callee) else {
                    return Err(CompileError::internal(format!(
                        "static call {} has no function address",
                        id
                    )));
                };
                let label = self.builder.add(Instr::Call { target: None });
                self.pending_calls.push((label, func));
                self.drop_arguments(args.len());
            }
            InstrKind::BorderCall { call, start: true } => {
                self.builder.add(Instr::Nop);
                let used = self.regs.used_regs();
                for &reg in &used {
                    self.builder.add(Instr::Push(Self::gp(reg).into()));
                    self.regs.release(reg);
                }
                log::trace!("call {}: saving {:?}", call, used);
                self.session.record_call_saves(used.len());
                self.saved.push(used);
            }
            InstrKind::BorderCall { call, start: false } => {
                let used = self.saved.pop().ok_or_else(|| {
                    CompileError::internal(format!("call window of {} closed twice", call))
                })?;
                for &reg in used.iter().rev() {
                    self.builder.add(Instr::Pop(Self::gp(reg)));
                    self.regs.reserve(reg);
                }
                self.session.record_call_restores(used.len());
                if prog.ty(call) != ResultType::Void {
                    let reg = self.take_register()?;
                    let ret = self.return_register();
                    self.builder.add(Instr::Mov {
                        dst: Self::gp(reg).into(),
                        src: ret.into(),
                    });
                    self.produce(prog, call, reg);
                }
            }
            InstrKind::Nop => {
                self.builder.add(Instr::Nop);
            }
        }
        Ok(())
    }

    fn drop_arguments(&mut self, count: usize) {
        if count > 0 {
            self.builder.add(Instr::Alu {
                op: AluOp::Add,
                dst: Register::Sp,
                src: Operand::Imm(count as i64),
            });
        }
    }

    /// Load the word `addr` points to into the register that held the pointer.
    fn load_through(&mut self, prog: &IrProgram, addr: InstrId) -> CompileResult<RegId> {
        let reg = self.to_register(prog, addr)?;
        self.builder.add(Instr::Mov {
            dst: Self::gp(reg).into(),
            src: MemRef::Reg(Self::gp(reg)).into(),
        });
        Ok(reg)
    }

    fn store(
        &mut self,
        prog: &mut IrProgram,
        id: InstrId,
        addr: InstrId,
        value: InstrId,
    ) -> CompileResult<()> {
        if prog.kind(addr).is_alloc() {
            let slot = Self::slot(prog, addr)?;
            let (src, reg) = self.to_operand(prog, value)?;
            self.builder.add(Instr::Mov {
                dst: slot.into(),
                src,
            });
            self.free(reg);
            // the assigned value can be read back from the slot
            let storage = prog.instr(addr).storage;
            prog.instr_mut(id).storage = storage;
            return Ok(());
        }

        // the pointer was computed after the value, so it comes off the stack first
        let pointer = self.to_register(prog, addr)?;
        let (src, reg) = self.to_operand(prog, value)?;
        self.builder.add(Instr::Mov {
            dst: MemRef::Reg(Self::gp(pointer)).into(),
            src,
        });
        self.regs.release(pointer);
        // the assignment is an expression; its value stays where the stored one was
        match reg {
            Some(reg) => self.produce(prog, id, reg),
            None => {
                if let Operand::Imm(value) = src {
                    prog.instr_mut(id).storage = Storage::Immediate(value);
                }
            }
        }
        Ok(())
    }

    fn compare_zero(&mut self, ty: ResultType, reg: RegId) {
        // 0.0 and 0 share the all-zero bit pattern
        let instr = if ty == ResultType::Double {
            Instr::FCmp {
                lhs: Self::gp(reg),
                rhs: Operand::Imm(0),
            }
        } else {
            Instr::Cmp {
                lhs: Self::gp(reg),
                rhs: Operand::Imm(0),
            }
        };
        self.builder.add(instr);
    }

    fn comparison(
        &mut self,
        prog: &mut IrProgram,
        id: InstrId,
        cond: Cond,
        lhs: InstrId,
        rhs: InstrId,
        cmp_jump: bool,
    ) -> CompileResult<()> {
        let (right, right_reg) = self.to_operand(prog, rhs)?;
        let left = self.to_register(prog, lhs)?;
        if prog.ty(lhs) == ResultType::Double {
            self.builder.add(Instr::FCmp {
                lhs: Self::gp(left),
                rhs: right,
            });
        } else {
            self.builder.add(Instr::Cmp {
                lhs: Self::gp(left),
                rhs: right,
            });
        }
        self.free(right_reg);

        if cmp_jump {
            self.regs.release(left);
            self.fused.insert(id, cond);
            return Ok(());
        }

        // materialize 0/1
        let taken = self.builder.add(Instr::Jcc { cond, target: None });
        self.builder.add(Instr::Alu {
            op: AluOp::Xor,
            dst: Self::gp(left),
            src: Self::gp(left).into(),
        });
        let skip = self.builder.add(Instr::Jmp { target: None });
        let one = self.builder.add(Instr::Mov {
            dst: Self::gp(left).into(),
            src: Operand::Imm(1),
        });
        let end = self.builder.add(Instr::Nop);
        self.builder.patch(taken, one)?;
        self.builder.patch(skip, end)?;
        self.produce(prog, id, left);
        Ok(())
    }

    /// Turn any value into 0 or 1.
    fn normalize(&mut self, ty: ResultType, reg: RegId) {
        self.compare_zero(ty, reg);
        let r = Self::gp(reg);
        self.builder.add(Instr::Mov {
            dst: r.into(),
            src: Operand::Flags,
        });
        for (op, value) in [(AluOp::Rsh, 1), (AluOp::Xor, 1), (AluOp::And, 1)] {
            self.builder.add(Instr::Alu {
                op,
                dst: r,
                src: Operand::Imm(value),
            });
        }
    }

    fn logical(
        &mut self,
        prog: &mut IrProgram,
        id: InstrId,
        op: BinaryOp,
        lhs: InstrId,
        rhs: InstrId,
    ) -> CompileResult<()> {
        let right = self.to_register(prog, rhs)?;
        let left = self.to_register(prog, lhs)?;
        self.normalize(prog.ty(rhs), right);
        self.normalize(prog.ty(lhs), left);
        let combine = if op == BinaryOp::And {
            AluOp::And
        } else {
            AluOp::Or
        };
        self.builder.add(Instr::Alu {
            op: combine,
            dst: Self::gp(left),
            src: Self::gp(right).into(),
        });
        self.regs.release(right);
        self.produce(prog, id, left);
        Ok(())
    }

    fn arithmetic(
        &mut self,
        prog: &mut IrProgram,
        id: InstrId,
        op: BinaryOp,
        lhs: InstrId,
        rhs: InstrId,
    ) -> CompileResult<()> {
        let (right, right_reg) = self.to_operand(prog, rhs)?;
        let left = self.to_register(prog, lhs)?;
        let instr = match (prog.ty(id), alu(op), float_alu(op)) {
            (ResultType::Double, _, Some(fop)) => Instr::FAlu {
                op: fop,
                dst: Self::gp(left),
                src: right,
            },
            (ResultType::Double, _, None) => {
                return Err(CompileError::internal(format!(
                    "{} has no double form",
                    op.name()
                )))
            }
            (_, Some(iop), _) => Instr::Alu {
                op: iop,
                dst: Self::gp(left),
                src: right,
            },
            (_, None, _) => {
                return Err(CompileError::internal(format!(
                    "{} is not an arithmetic operator",
                    op.name()
                )))
            }
        };
        self.builder.add(instr);
        self.free(right_reg);
        self.produce(prog, id, left);
        Ok(())
    }

    fn unary(
        &mut self,
        prog: &mut IrProgram,
        id: InstrId,
        op: UnaryOp,
        operand: InstrId,
    ) -> CompileResult<()> {
        if op == UnaryOp::Plus {
            return self.alias(prog, id, operand);
        }

        let reg = self.to_register(prog, operand)?;
        let r = Self::gp(reg);
        let double = prog.ty(id) == ResultType::Double;
        match op {
            UnaryOp::Plus => {}
            UnaryOp::Minus if double => {
                self.builder.add(Instr::Alu {
                    op: AluOp::Xor,
                    dst: r,
                    src: Operand::Imm(i64::MIN),
                });
            }
            UnaryOp::Minus => {
                self.builder.add(Instr::Unary {
                    op: UnaryAluOp::Neg,
                    reg: r,
                });
            }
            UnaryOp::Not => {
                self.compare_zero(prog.ty(operand), reg);
                self.builder.add(Instr::Mov {
                    dst: r.into(),
                    src: Operand::Flags,
                });
                self.builder.add(Instr::Alu {
                    op: AluOp::Rsh,
                    dst: r,
                    src: Operand::Imm(1),
                });
                self.builder.add(Instr::Alu {
                    op: AluOp::And,
                    dst: r,
                    src: Operand::Imm(1),
                });
            }
            UnaryOp::Neg => {
                self.builder.add(Instr::Unary {
                    op: UnaryAluOp::Not,
                    reg: r,
                });
            }
            UnaryOp::Inc | UnaryOp::Dec if double => {
                let fop = if op == UnaryOp::Inc {
                    FAluOp::Add
                } else {
                    FAluOp::Sub
                };
                self.builder.add(Instr::FAlu {
                    op: fop,
                    dst: r,
                    src: Operand::Imm(1.0f64.to_bits() as i64),
                });
            }
            UnaryOp::Inc | UnaryOp::Dec => {
                let uop = if op == UnaryOp::Inc {
                    UnaryAluOp::Inc
                } else {
                    UnaryAluOp::Dec
                };
                self.builder.add(Instr::Unary { op: uop, reg: r });
            }
        }
        self.produce(prog, id, reg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tables() {
        assert_eq!(condition(BinaryOp::Le), Some(Cond::Le));
        assert_eq!(condition(BinaryOp::Add), None);
        assert_eq!(alu(BinaryOp::ShR), Some(AluOp::Rsh));
        assert_eq!(alu(BinaryOp::And), None);
        assert_eq!(float_alu(BinaryOp::Mod), None);
    }
}
