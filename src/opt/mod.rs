// This module holds the IR-to-IR optimizer. Two passes run in a fixed order: a sliding-window
// peephole pass driven by a table of instruction-shape patterns (constant folding and
// power-of-two strength reduction out of the box), followed by fixed-point inlining of small
// leaf functions. Both passes are optional and only ever decline on unexpected shapes;
// a graph that cannot be rewritten consistently is reported as an internal error.

//! IR optimization passes.

pub mod inlining;
pub mod patterns;
pub mod peephole;

pub use inlining::{Inliner, DEFAULT_SIZE_LIMIT};
pub use patterns::{default_patterns, power_of_two};
pub use peephole::{Pattern, Peephole, RewriteCtx, RewriteFn, Template};

use crate::core::{CompilationSession, CompileResult};
use crate::ir::IrProgram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    pub peephole: bool,
    pub inline: bool,
    /// Largest function, in instructions, that may be inlined.
    pub inline_size_limit: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            peephole: true,
            inline: true,
            inline_size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

/// What one optimizer run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationSummary {
    pub rewrites: usize,
    pub inlined_calls: usize,
}

pub struct Optimizer<'s> {
    options: OptimizerOptions,
    peephole: Peephole,
    session: &'s CompilationSession,
}

impl<'s> Optimizer<'s> {
    pub fn new(options: OptimizerOptions, session: &'s CompilationSession) -> Self {
        Self::with_patterns(options, default_patterns(), session)
    }

    pub fn with_patterns(
        options: OptimizerOptions,
        patterns: Vec<Pattern>,
        session: &'s CompilationSession,
    ) -> Self {
        Self {
            options,
            peephole: Peephole::new(patterns),
            session,
        }
    }

    pub fn run(&self, prog: &mut IrProgram) -> CompileResult<OptimizationSummary> {
        let mut summary = OptimizationSummary::default();
        if self.options.peephole {
            summary.rewrites = self.peephole.run(prog, self.session);
        }
        if self.options.inline {
            let inliner = Inliner::new(self.options.inline_size_limit, self.session);
            summary.inlined_calls = inliner.run(prog)?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, Program, Stmt, Type};
    use crate::ir::InstrKind;
    use crate::lower::lower;

    #[test]
    fn test_disabled_optimizer_is_identity() {
        let program = Program::new(vec![Stmt::function(
            "main",
            Type::Void,
            vec![],
            vec![Stmt::write(Expr::binary(BinOp::Add, Expr::int(2), Expr::int(3)))],
        )]);
        let session = CompilationSession::new();
        let mut prog = lower(&program, &session).unwrap();
        let before = prog.clone();

        let options = OptimizerOptions {
            peephole: false,
            inline: false,
            ..OptimizerOptions::default()
        };
        let summary = Optimizer::new(options, &session).run(&mut prog).unwrap();
        assert_eq!(summary, OptimizationSummary::default());
        assert_eq!(prog, before);
    }

    #[test]
    fn test_constant_write_is_folded() {
        let program = Program::new(vec![Stmt::function(
            "main",
            Type::Void,
            vec![],
            vec![Stmt::write(Expr::binary(BinOp::Add, Expr::int(2), Expr::int(3)))],
        )]);
        let session = CompilationSession::new();
        let mut prog = lower(&program, &session).unwrap();
        let summary = Optimizer::new(OptimizerOptions::default(), &session)
            .run(&mut prog)
            .unwrap();
        assert_eq!(summary.rewrites, 1);

        let main = &prog.functions[0];
        let instrs = &prog.block(main.blocks[0]).instrs;
        assert_eq!(instrs.len(), 2);
        assert_eq!(prog.kind(instrs[0]), &InstrKind::LoadImmInt(5));
        assert_eq!(prog.kind(instrs[1]), &InstrKind::DebugWrite { value: instrs[0] });
        assert_eq!(session.stats().peephole_rewrites, 1);
    }
}
