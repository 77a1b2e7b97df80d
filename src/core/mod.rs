// This module serves as the central hub for the infrastructure shared by every pass of the
// tinyc pipeline. It exports and organizes three subsystems: the compilation session (the
// per-unit context carrying statistics, so no pass depends on process-wide state), the
// register file used by the greedy allocator of the code generator (a bitset of free
// registers handed out lowest first), and the error taxonomy (lowering errors carrying a
// source span, internal consistency errors for malformed graphs, configuration errors).

//! Core tinyc infrastructure
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - One context per compilation unit
//! - Compilation statistics
//!
//! ## Register Allocation (`register_file`)
//! - Lowest-first free-register set with bitset tracking
//!
//! ## Errors (`error`)
//! - `CompileError` and the `CompileResult` alias

pub mod session;
pub mod register_file;
pub mod error;

// Re-export core components
pub use session::{
    CompilationSession,
    SessionStats,
};

pub use register_file::{
    RegisterFile,
    RegBitSet,
    RegId,
    MAX_REGISTERS,
};

pub use error::{
    CompileError,
    CompileResult,
    LoweringErrorKind,
    Span,
};
