//! Sliding-window peephole rewriting.
//!
//! Every registered pattern is matched in parallel against the window starting at the
//! cursor. Patterns that matched over their full length get to run their rewrite; the
//! first one that succeeds wins and the cursor stays put so the rewritten code can match
//! again. Rewrites that drop or replace an instruction record the old id in a replacement
//! map, and a reverse pass over the sequence redirects the remaining operand references.

use hashbrown::HashMap;

use crate::core::CompilationSession;
use crate::ir::{BinaryOp, InstrId, InstrKind, InstrTag, Instruction, IrProgram, ResultType, UnaryOp};

/// Shape of one instruction in a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Any instruction of this kind.
    Kind(InstrTag),
    /// A binary operator. A `Void` type turns the template into a wildcard that accepts
    /// any real (non-void) binary operator.
    Binary { op: BinaryOp, ty: ResultType },
    /// A unary operator, with the same `Void` wildcard convention.
    Unary { op: UnaryOp, ty: ResultType },
}

impl Template {
    pub fn any_binary() -> Self {
        Template::Binary {
            op: BinaryOp::Add,
            ty: ResultType::Void,
        }
    }

    pub fn any_unary() -> Self {
        Template::Unary {
            op: UnaryOp::Plus,
            ty: ResultType::Void,
        }
    }

    pub fn matches(&self, instr: &Instruction) -> bool {
        match (self, &instr.kind) {
            (Template::Kind(tag), kind) => kind.tag() == *tag,
            (Template::Binary { op, ty }, InstrKind::Binary { op: candidate, .. }) => {
                instr.ty != ResultType::Void
                    && (*ty == ResultType::Void || (op == candidate && instr.ty == *ty))
            }
            (Template::Unary { op, ty }, InstrKind::Unary { op: candidate, .. }) => {
                instr.ty != ResultType::Void
                    && (*ty == ResultType::Void || (op == candidate && instr.ty == *ty))
            }
            _ => false,
        }
    }
}

/// Rewrite hook of a pattern; gets the window start and reports whether it changed anything.
pub type RewriteFn = fn(&mut RewriteCtx<'_>, usize) -> bool;

#[derive(Clone)]
pub struct Pattern {
    pub name: &'static str,
    pub shape: Vec<Template>,
    pub rewrite: RewriteFn,
}

impl Pattern {
    pub fn new(name: &'static str, shape: Vec<Template>, rewrite: RewriteFn) -> Self {
        Self {
            name,
            shape,
            rewrite,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// What a rewrite function may touch: the sequence being scanned, the instruction arena
/// and the replacement map of this sequence.
pub struct RewriteCtx<'a> {
    pub seq: &'a mut Vec<InstrId>,
    pub prog: &'a mut IrProgram,
    replaced: &'a mut HashMap<InstrId, InstrId>,
}

impl<'a> RewriteCtx<'a> {
    pub fn kind(&self, at: usize) -> &InstrKind {
        self.prog.kind(self.seq[at])
    }

    /// Follow the replacement map to the live instruction.
    pub fn resolve(&self, mut id: InstrId) -> InstrId {
        while let Some(&next) = self.replaced.get(&id) {
            id = next;
        }
        id
    }

    /// Record that references to `old` must now point at `new`.
    pub fn replace(&mut self, old: InstrId, new: InstrId) {
        if old != new {
            self.replaced.insert(old, new);
        }
    }

    /// Whether anything in the sequence other than `except` reads `id`.
    pub fn referenced_outside(&self, id: InstrId, except: InstrId) -> bool {
        self.seq.iter().filter(|&&other| other != except).any(|&other| {
            self.prog
                .kind(other)
                .operands()
                .into_iter()
                .any(|op| self.resolve(op) == id)
        })
    }
}

/// Peephole driver over a fixed pattern set.
pub struct Peephole {
    patterns: Vec<Pattern>,
    max_len: usize,
    min_len: usize,
}

impl Peephole {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        let patterns: Vec<Pattern> = patterns.into_iter().filter(|p| !p.is_empty()).collect();
        let max_len = patterns.iter().map(Pattern::len).max().unwrap_or(0);
        let min_len = patterns.iter().map(Pattern::len).min().unwrap_or(0);
        Self {
            patterns,
            max_len,
            min_len,
        }
    }

    /// Scan the declaration list and every block of every function.
    pub fn run(&self, prog: &mut IrProgram, session: &CompilationSession) -> usize {
        if self.patterns.is_empty() {
            return 0;
        }

        let mut decls = std::mem::take(&mut prog.decls);
        let mut rewrites = self.run_sequence(prog, &mut decls, session);
        prog.decls = decls;

        let blocks: Vec<_> = prog
            .functions
            .iter()
            .flat_map(|f| f.blocks.iter().copied())
            .collect();
        for block in blocks {
            let mut instrs = std::mem::take(&mut prog.block_mut(block).instrs);
            rewrites += self.run_sequence(prog, &mut instrs, session);
            prog.block_mut(block).instrs = instrs;
        }

        log::debug!("peephole: {} rewrites", rewrites);
        rewrites
    }

    /// Patterns that fit over their full length at `cursor`.
    fn matching(&self, prog: &IrProgram, seq: &[InstrId], cursor: usize) -> Vec<usize> {
        let mut alive = vec![true; self.patterns.len()];
        for k in 0..self.max_len {
            let Some(&id) = seq.get(cursor + k) else {
                break;
            };
            let instr = prog.instr(id);
            for (i, pattern) in self.patterns.iter().enumerate() {
                if alive[i] && k < pattern.len() && !pattern.shape[k].matches(instr) {
                    alive[i] = false;
                }
            }
            if !alive.iter().any(|&a| a) {
                break;
            }
        }

        self.patterns
            .iter()
            .enumerate()
            .filter(|(i, pattern)| alive[*i] && cursor + pattern.len() <= seq.len())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn run_sequence(
        &self,
        prog: &mut IrProgram,
        seq: &mut Vec<InstrId>,
        session: &CompilationSession,
    ) -> usize {
        let mut replaced = HashMap::new();
        let mut rewrites = 0;
        let mut cursor = 0;

        while cursor + self.min_len <= seq.len() {
            let candidates = self.matching(prog, seq, cursor);

            let mut applied = false;
            for index in candidates {
                let pattern = &self.patterns[index];
                let mut ctx = RewriteCtx {
                    seq: &mut *seq,
                    prog: &mut *prog,
                    replaced: &mut replaced,
                };
                if (pattern.rewrite)(&mut ctx, cursor) {
                    log::trace!("peephole: {} at {}", pattern.name, cursor);
                    session.record_peephole_rewrite(pattern.name);
                    rewrites += 1;
                    applied = true;
                    break;
                }
            }

            if !applied {
                cursor += 1;
            }
        }

        if !replaced.is_empty() {
            for &id in seq.iter().rev() {
                prog.instr_mut(id).kind.for_each_ref_mut(|operand| {
                    while let Some(&next) = replaced.get(&*operand) {
                        *operand = next;
                    }
                });
            }
        }
        rewrites
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(op: BinaryOp, ty: ResultType) -> Instruction {
        Instruction::new(
            ty,
            InstrKind::Binary {
                op,
                lhs: InstrId(0),
                rhs: InstrId(1),
                cmp_jump: false,
            },
        )
    }

    #[test]
    fn test_void_template_is_wildcard() {
        let any = Template::any_binary();
        assert!(any.matches(&binary(BinaryOp::Lt, ResultType::Integer)));
        assert!(any.matches(&binary(BinaryOp::Mul, ResultType::Double)));
        // a void-typed candidate is never a real operator
        assert!(!any.matches(&binary(BinaryOp::Mul, ResultType::Void)));
    }

    #[test]
    fn test_typed_template_is_exact() {
        let mul = Template::Binary {
            op: BinaryOp::Mul,
            ty: ResultType::Integer,
        };
        assert!(mul.matches(&binary(BinaryOp::Mul, ResultType::Integer)));
        assert!(!mul.matches(&binary(BinaryOp::Div, ResultType::Integer)));
        assert!(!mul.matches(&binary(BinaryOp::Mul, ResultType::Double)));
        assert!(!mul.matches(&Instruction::new(ResultType::Integer, InstrKind::LoadImmInt(2))));
    }

    #[test]
    fn test_kind_template() {
        let load = Template::Kind(InstrTag::LoadImmInt);
        assert!(load.matches(&Instruction::new(ResultType::Integer, InstrKind::LoadImmInt(2))));
        assert!(!load.matches(&Instruction::new(ResultType::Void, InstrKind::Nop)));
    }

    fn drop_nops(ctx: &mut RewriteCtx<'_>, at: usize) -> bool {
        ctx.seq.remove(at);
        true
    }

    #[test]
    fn test_cursor_retries_after_rewrite() {
        let session = CompilationSession::new();
        let mut prog = IrProgram::new();
        let mut seq: Vec<_> = (0..3).map(|_| prog.add(ResultType::Void, InstrKind::Nop)).collect();
        let keep = prog.add(ResultType::Integer, InstrKind::LoadImmInt(1));
        seq.push(keep);

        let peephole = Peephole::new(vec![Pattern::new(
            "drop-nop",
            vec![Template::Kind(InstrTag::Nop)],
            drop_nops,
        )]);
        let rewrites = peephole.run_sequence(&mut prog, &mut seq, &session);
        assert_eq!(rewrites, 3);
        assert_eq!(seq, vec![keep]);
    }
}
