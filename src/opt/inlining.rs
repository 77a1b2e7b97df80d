//! Function inlining.
//!
//! Runs to a fixed point. Each round computes the inlineable set (small functions without
//! static calls of their own) and, in every function, replaces the first call site that
//! targets that set with a fresh copy of the callee's blocks. Functions grow as calls are
//! replaced, so the set is recomputed every round.

use hashbrown::{HashMap, HashSet};

use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{BlockId, FuncId, InstrId, InstrKind, IrProgram, ResultType};

/// Default instruction budget of an inlineable function.
pub const DEFAULT_SIZE_LIMIT: usize = 30;

/// A call site chosen for inlining.
#[derive(Debug, Clone, Copy)]
struct CallSite {
    /// Position of the call's block in the caller's block list.
    block_index: usize,
    call: InstrId,
    callee: FuncId,
}

/// Translation maps of one inlined call site.
#[derive(Default)]
struct CloneMaps {
    allocs: HashMap<InstrId, InstrId>,
    instrs: HashMap<InstrId, InstrId>,
    blocks: HashMap<BlockId, BlockId>,
}

impl CloneMaps {
    fn instr(&self, prog: &IrProgram, id: InstrId) -> Option<InstrId> {
        if let Some(&mapped) = self.allocs.get(&id) {
            return Some(mapped);
        }
        if let Some(&mapped) = self.instrs.get(&id) {
            return Some(mapped);
        }
        // program-level storage is shared, never copied
        match prog.kind(id) {
            InstrKind::AllocGlobal | InstrKind::FunAddress { .. } => Some(id),
            _ => None,
        }
    }
}

pub struct Inliner<'s> {
    size_limit: usize,
    session: &'s CompilationSession,
}

impl<'s> Inliner<'s> {
    pub fn new(size_limit: usize, session: &'s CompilationSession) -> Self {
        Self {
            size_limit,
            session,
        }
    }

    /// Inline until no eligible call site is left. Returns the number of sites inlined.
    pub fn run(&self, prog: &mut IrProgram) -> CompileResult<usize> {
        let mut inlined = 0;
        loop {
            let available: HashSet<FuncId> = prog
                .function_ids()
                .filter(|&f| self.inlineable(prog, f))
                .collect();
            if available.is_empty() {
                break;
            }

            let mut again = false;
            let callers: Vec<FuncId> = prog.function_ids().collect();
            for caller in callers {
                if let Some(site) = find_call_site(prog, caller, &available) {
                    self.inline_call(prog, caller, site)?;
                    inlined += 1;
                    again = true;
                }
            }
            if !again {
                break;
            }
        }

        log::debug!("inlining: {} call sites replaced", inlined);
        Ok(inlined)
    }

    pub fn inlineable(&self, prog: &IrProgram, func: FuncId) -> bool {
        prog.function_size(func) <= self.size_limit && prog.static_call_count(func) == 0
    }

    fn inline_call(&self, prog: &mut IrProgram, caller: FuncId, site: CallSite) -> CompileResult<()> {
        let callee = prog.function(site.callee).clone();
        let call_block = prog.function(caller).blocks[site.block_index];
        let InstrKind::CallStatic { args, .. } = prog.kind(site.call).clone() else {
            return Err(CompileError::internal(format!("{} is not a static call", site.call)));
        };

        let mut maps = CloneMaps::default();

        // fresh slots for every callee local and parameter
        for &old in callee.allocs.iter().chain(callee.args.iter()) {
            let slot = prog.add(prog.ty(old), InstrKind::AllocLocal);
            prog.function_mut(caller).allocs.push(slot);
            maps.allocs.insert(old, slot);
        }

        let mut instrs = std::mem::take(&mut prog.block_mut(call_block).instrs);

        // argument pushes become stores into the parameter slots
        let mut position = instrs
            .iter()
            .position(|&id| id == site.call)
            .ok_or_else(|| CompileError::internal(format!("{} not in its block", site.call)))?;
        for (index, &arg) in args.iter().enumerate().rev() {
            let found = instrs[..position].iter().rposition(|&id| {
                matches!(prog.kind(id), InstrKind::StoreParam { value } if *value == arg)
            });
            let (Some(at), Some(&param)) = (found, callee.args.get(index)) else {
                return Err(CompileError::internal(format!(
                    "no parameter store for argument {} of {}",
                    index, site.call
                )));
            };
            let slot = maps.allocs[&param];
            let slot_ty = prog.ty(slot);
            let store = prog.instr_mut(instrs[at]);
            store.ty = slot_ty;
            store.kind = InstrKind::Store {
                addr: slot,
                value: arg,
            };
            position = at;
        }

        instrs.retain(|&id| {
            !matches!(prog.kind(id), InstrKind::BorderCall { call, .. } if *call == site.call)
        });
        let position = instrs
            .iter()
            .position(|&id| id == site.call)
            .ok_or_else(|| CompileError::internal(format!("{} vanished", site.call)))?;

        // everything after the call moves to the return-merge block
        let mut tail = instrs.split_off(position + 1);
        let mut dest = None;
        if prog.ty(site.call) != ResultType::Void {
            if let Some(&first) = tail.first() {
                if let InstrKind::Store { addr, value } = prog.kind(first) {
                    if *value == site.call {
                        dest = Some((*addr, prog.ty(first)));
                        tail.remove(0);
                    }
                }
            }
        }

        let spliced: Vec<BlockId> = callee
            .blocks
            .iter()
            .map(|&old| {
                self.session.record_block_created();
                let new = prog.new_block();
                maps.blocks.insert(old, new);
                new
            })
            .collect();
        let merge = prog.new_block();
        self.session.record_block_created();

        let entry = *spliced
            .first()
            .ok_or_else(|| CompileError::internal(format!("{} has no blocks", callee.name)))?;
        let call = prog.instr_mut(site.call);
        call.ty = ResultType::Void;
        call.kind = InstrKind::Jump {
            target: Some(entry),
        };
        prog.block_mut(call_block).instrs = instrs;

        let insert_at = site.block_index + 1;
        let follow_index = insert_at + spliced.len();
        {
            let blocks = &mut prog.function_mut(caller).blocks;
            blocks.splice(insert_at..insert_at, spliced.iter().copied());
        }
        let is_last = follow_index >= prog.function(caller).blocks.len();

        let return_target = if !tail.is_empty() {
            prog.block_mut(merge).instrs = tail;
            prog.function_mut(caller).blocks.insert(follow_index, merge);
            merge
        } else if is_last {
            let nop = prog.add(ResultType::Void, InstrKind::Nop);
            prog.block_mut(merge).instrs.push(nop);
            prog.function_mut(caller).blocks.insert(follow_index, merge);
            merge
        } else {
            // nothing to merge into, returns go straight to the next block
            prog.function(caller).blocks[follow_index]
        };

        self.clone_blocks(prog, &callee.blocks, &mut maps, dest, return_target)?;

        self.session
            .record_call_inlined(&prog.function(caller).name, &callee.name);
        Ok(())
    }

    /// Deep-copy the callee blocks into their spliced counterparts.
    fn clone_blocks(
        &self,
        prog: &mut IrProgram,
        blocks: &[BlockId],
        maps: &mut CloneMaps,
        dest: Option<(InstrId, ResultType)>,
        return_target: BlockId,
    ) -> CompileResult<()> {
        let mut call_links = Vec::new();

        for &old_block in blocks {
            let new_block = maps.blocks[&old_block];
            let old_instrs = prog.block(old_block).instrs.clone();
            let mut cloned = Vec::with_capacity(old_instrs.len());

            for old in old_instrs {
                let instr = prog.instr(old).clone();
                let new = match instr.kind {
                    InstrKind::Return { value } => {
                        if let (Some((addr, ty)), Some(value)) = (dest, value) {
                            let value = maps.instr(prog, value).ok_or_else(|| unmapped(value))?;
                            cloned.push(prog.add(ty, InstrKind::Store { addr, value }));
                        }
                        prog.add(
                            ResultType::Void,
                            InstrKind::Jump {
                                target: Some(return_target),
                            },
                        )
                    }
                    InstrKind::BorderCall { call, start } => {
                        // the start marker precedes its call, link it up afterwards
                        let new = prog.add(instr.ty, InstrKind::BorderCall { call, start });
                        call_links.push(new);
                        new
                    }
                    mut kind => {
                        let mut missing = None;
                        kind.for_each_ref_mut(|operand| match maps.instr(prog, *operand) {
                            Some(mapped) => *operand = mapped,
                            None => missing = Some(*operand),
                        });
                        if let Some(operand) = missing {
                            return Err(unmapped(operand));
                        }
                        let mut unresolved = false;
                        kind.for_each_target_mut(|target| {
                            if let Some(block) = target {
                                match maps.blocks.get(block) {
                                    Some(&mapped) => *block = mapped,
                                    None => unresolved = true,
                                }
                            }
                        });
                        if unresolved {
                            return Err(CompileError::internal(format!(
                                "jump in {} leaves the inlined function",
                                old
                            )));
                        }
                        prog.add(instr.ty, kind)
                    }
                };
                maps.instrs.insert(old, new);
                cloned.push(new);
            }

            prog.block_mut(new_block).instrs = cloned;
        }

        for link in call_links {
            if let InstrKind::BorderCall { call, start } = *prog.kind(link) {
                let mapped = maps.instrs.get(&call).copied().ok_or_else(|| unmapped(call))?;
                prog.instr_mut(link).kind = InstrKind::BorderCall {
                    call: mapped,
                    start,
                };
            }
        }
        Ok(())
    }
}

fn unmapped(id: InstrId) -> CompileError {
    CompileError::internal(format!("no clone for {} while inlining", id))
}

/// First call in `caller` whose target is inlineable and whose result is either unused
/// (void) or stored right after the call.
fn find_call_site(prog: &IrProgram, caller: FuncId, available: &HashSet<FuncId>) -> Option<CallSite> {
    for (block_index, &block) in prog.function(caller).blocks.iter().enumerate() {
        let instrs = &prog.block(block).instrs;
        for (i, &id) in instrs.iter().enumerate() {
            let Some(callee) = prog.static_callee(id) else {
                continue;
            };
            if callee == caller || !available.contains(&callee) {
                continue;
            }
            let closes = matches!(
                instrs.get(i + 1).map(|&next| prog.kind(next)),
                Some(InstrKind::BorderCall { call, start: false }) if *call == id
            );
            if !closes {
                continue;
            }
            let eligible = prog.ty(id) == ResultType::Void
                || instrs.get(i + 2).is_some_and(|&store| {
                    matches!(prog.kind(store), InstrKind::Store { value, .. } if *value == id)
                        && !instrs
                            .iter()
                            .any(|&other| prog.kind(other).operands().contains(&store))
                });
            if eligible {
                return Some(CallSite {
                    block_index,
                    call: id,
                    callee,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, Program, Stmt, Type};
    use crate::lower::lower;

    fn square_program() -> Program {
        let int_fn = Type::function(Type::Int, vec![Type::Int]);
        Program::new(vec![
            Stmt::function(
                "sq",
                Type::Int,
                vec![("x", Type::Int)],
                vec![Stmt::ret(Some(Expr::binary(
                    BinOp::Mul,
                    Expr::ident("x", Type::Int),
                    Expr::ident("x", Type::Int),
                )))],
            ),
            Stmt::function(
                "main",
                Type::Void,
                vec![],
                vec![Stmt::var(
                    "y",
                    Type::Int,
                    Some(Expr::call(Expr::ident("sq", int_fn), vec![Expr::int(3)])),
                )],
            ),
        ])
    }

    #[test]
    fn test_inlines_square() {
        let session = CompilationSession::new();
        let mut prog = lower(&square_program(), &session).unwrap();
        assert_eq!(prog.total_static_calls(), 1);

        let inlined = Inliner::new(DEFAULT_SIZE_LIMIT, &session).run(&mut prog).unwrap();
        assert_eq!(inlined, 1);
        assert_eq!(prog.total_static_calls(), 0);

        let main = prog.function_by_name("main").unwrap();
        // call block, one spliced callee block, merge block
        assert_eq!(prog.function(main).blocks.len(), 3);
        // y plus the copied parameter slot
        assert_eq!(prog.function(main).allocs.len(), 2);
        for &block in &prog.function(main).blocks {
            assert!(!prog.block(block).instrs.is_empty());
        }
    }

    #[test]
    fn test_size_limit_blocks_inlining() {
        let session = CompilationSession::new();
        let mut prog = lower(&square_program(), &session).unwrap();
        let inlined = Inliner::new(2, &session).run(&mut prog).unwrap();
        assert_eq!(inlined, 0);
        assert_eq!(prog.total_static_calls(), 1);
    }

    #[test]
    fn test_recursive_function_is_not_inlineable() {
        let fact_ty = Type::function(Type::Int, vec![Type::Int]);
        let program = Program::new(vec![Stmt::function(
            "f",
            Type::Int,
            vec![("n", Type::Int)],
            vec![Stmt::ret(Some(Expr::call(
                Expr::ident("f", fact_ty),
                vec![Expr::ident("n", Type::Int)],
            )))],
        )]);
        let session = CompilationSession::new();
        let mut prog = lower(&program, &session).unwrap();
        let inliner = Inliner::new(DEFAULT_SIZE_LIMIT, &session);
        assert!(!inliner.inlineable(&prog, FuncId(0)));
        assert_eq!(inliner.run(&mut prog).unwrap(), 0);
    }
}
