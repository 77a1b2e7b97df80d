//! End-to-end compilation: lower, optimize, generate.

use crate::ast;
use crate::codegen::Generator;
use crate::core::{CompilationSession, CompileResult, SessionStats};
use crate::ir::IrProgram;
use crate::lower::lower;
use crate::opt::{OptimizationSummary, Optimizer, OptimizerOptions, DEFAULT_SIZE_LIMIT};
use crate::t86::TargetProgram;

pub const DEFAULT_REGISTER_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Allocatable general purpose registers, at least 2.
    pub register_count: usize,
    pub peephole: bool,
    pub inline: bool,
    pub inline_size_limit: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            register_count: DEFAULT_REGISTER_COUNT,
            peephole: true,
            inline: true,
            inline_size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

impl CompileOptions {
    /// Options with both optimizer passes turned off.
    pub fn unoptimized() -> Self {
        Self {
            peephole: false,
            inline: false,
            ..Self::default()
        }
    }

    pub fn optimizer(&self) -> OptimizerOptions {
        OptimizerOptions {
            peephole: self.peephole,
            inline: self.inline,
            inline_size_limit: self.inline_size_limit,
        }
    }
}

/// Everything one compilation produced.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The optimized IR, with storage assigned by the code generator.
    pub ir: IrProgram,
    pub target: TargetProgram,
    pub optimization: OptimizationSummary,
    pub stats: SessionStats,
}

pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn compile(&self, program: &ast::Program) -> CompileResult<Compilation> {
        let session = CompilationSession::new();
        // reject bad options before doing any work
        let generator = Generator::new(self.options.register_count, &session)?;

        let mut ir = lower(program, &session)?;
        let optimization = Optimizer::new(self.options.optimizer(), &session).run(&mut ir)?;
        log::info!(
            "optimizer: {} rewrites, {} calls inlined",
            optimization.rewrites,
            optimization.inlined_calls
        );
        let target = generator.generate(&mut ir)?;

        let stats = session.stats();
        log::debug!("session statistics:\n{}", stats);
        Ok(Compilation {
            ir,
            target,
            optimization,
            stats,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompileError;
    use crate::samples;
    use crate::t86::Cpu;

    #[test]
    fn test_compile_and_run_return_forty() {
        let compilation = Compiler::default().compile(&samples::return_forty()).unwrap();
        let mut cpu = Cpu::new(&compilation.target);
        cpu.run().unwrap();
        assert_eq!(cpu.return_value(), 40);
        assert_eq!(compilation.stats.functions_generated, 1);
        assert_eq!(compilation.optimization.rewrites, 1);
    }

    #[test]
    fn test_bad_register_count() {
        let options = CompileOptions {
            register_count: 1,
            ..CompileOptions::default()
        };
        let err = Compiler::new(options)
            .compile(&samples::return_forty())
            .unwrap_err();
        assert!(matches!(err, CompileError::Configuration { .. }));
    }
}
