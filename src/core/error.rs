// This module defines error types for the tinyc compiler using the thiserror crate for
// idiomatic Rust error handling. CompileError is the main error enum covering the fatal
// failure scenarios of the pipeline: structural violations found while lowering the syntax
// tree (duplicate or unknown names, break/continue outside a loop), internal consistency
// failures that mean an earlier pass produced a malformed graph (unresolved jump targets,
// missing clone mappings, operands without storage), a program without an entry point, and
// invalid configuration. Optimizer declines and inlining limits are not errors and never
// surface here. CompileResult<T> is a convenience alias for Result<T, CompileError>.

//! Error types for the tinyc compiler.
//!
//! Using thiserror for more idiomatic error handling.

use std::fmt;

use thiserror::Error;

/// Source position carried by syntax tree nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// What went wrong while lowering a syntax tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringErrorKind {
    #[error("'{name}' was already declared in this scope")]
    DuplicateDeclaration { name: String },

    #[error("'{name}' is not declared")]
    UndeclaredName { name: String },

    #[error("'{keyword}' outside of a loop or switch")]
    JumpOutsideLoop { keyword: &'static str },

    #[error("{what} is only allowed inside a function body")]
    OutsideFunction { what: &'static str },
}

/// Main error type for compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("lowering error at {span}: {kind}")]
    Lowering {
        kind: LoweringErrorKind,
        span: Span,
    },

    #[error("internal consistency error: {reason}")]
    InternalConsistency {
        reason: String,
    },

    #[error("program has no 'main' function")]
    MissingEntryPoint,

    #[error("invalid configuration: {reason}")]
    Configuration {
        reason: String,
    },
}

impl CompileError {
    pub fn lowering(kind: LoweringErrorKind, span: Span) -> Self {
        CompileError::Lowering { kind, span }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        CompileError::InternalConsistency {
            reason: reason.into(),
        }
    }

    /// True for errors caused by a malformed graph rather than by user input.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::InternalConsistency { .. })
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowering_error_display() {
        let err = CompileError::lowering(
            LoweringErrorKind::DuplicateDeclaration { name: "a".into() },
            Span::new(3, 7),
        );
        assert_eq!(
            err.to_string(),
            "lowering error at 3:7: 'a' was already declared in this scope"
        );
        assert!(!err.is_internal());
    }

    #[test]
    fn test_internal_error() {
        let err = CompileError::internal("jump to bb4 never resolved");
        assert!(err.is_internal());
        assert!(err.to_string().contains("bb4"));
    }
}
