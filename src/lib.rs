//! tinyc - the middle and back end of a small C-like compiler.
//!
//! tinyc lowers a type-checked syntax tree into a block-structured IR, optimizes it with a
//! pattern-driven peephole pass and fixed-point inlining, and generates register-allocated
//! code for the t86 register machine.
//!
//! # Primary Usage
//!
//! ```ignore
//! use tinyc::{Compiler, CompileOptions, samples};
//! use tinyc::t86::Cpu;
//!
//! let compilation = Compiler::new(CompileOptions::default())
//!     .compile(&samples::return_forty())?;
//! let mut cpu = Cpu::new(&compilation.target);
//! cpu.run()?;
//! assert_eq!(cpu.return_value(), 40);
//! ```
//!
//! # Architecture
//!
//! - [`ast`] - Checked syntax tree handed over by the front end
//! - [`ir`] - Arena-backed IR: instructions, blocks, functions
//! - [`lower`] - Syntax tree to IR
//! - [`opt`] - Peephole rewriting and inlining
//! - [`codegen`] - Register allocation and t86 emission
//! - [`t86`] - Target instructions, program builder and reference CPU
//! - [`core`] - Session, register file and errors shared by all passes
//! - [`driver`] - The whole pipeline behind one call
//! - [`samples`] - Built-in checked programs used by the CLI and the tests

pub mod ast;
pub mod codegen;
pub mod core;
pub mod driver;
pub mod ir;
pub mod lower;
pub mod opt;
pub mod samples;
pub mod t86;

pub use codegen::Generator;
pub use core::{CompilationSession, CompileError, CompileResult, SessionStats};
pub use driver::{Compilation, CompileOptions, Compiler};
pub use ir::IrProgram;
pub use lower::lower;
pub use opt::{Optimizer, OptimizerOptions};
pub use t86::{Cpu, TargetProgram};
