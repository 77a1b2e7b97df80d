// This module implements CompilationSession, the per-compilation-unit context threaded
// through every pass of the tinyc pipeline. Nothing in the pipeline is process-wide: block
// identities come from the block arena of the IrProgram being built, and the session only
// observes them. Statistics are collected with interior mutability (RefCell) so passes
// holding a shared reference can record events:
// blocks created, IR instructions lowered, peephole rewrites, inlined call sites, emitted
// target instructions, spills and reloads, and the register saves/restores performed around
// calls. SessionStats implements Display for the driver's --stats output.

//! Compilation session management.
//!
//! One session per compilation unit; nothing here is shared between compilations.

use std::cell::RefCell;
use std::fmt;

/// Compilation session context for one compilation unit.
#[derive(Debug, Default)]
pub struct CompilationSession {
    /// Compilation statistics.
    stats: RefCell<SessionStats>,
}

impl CompilationSession {
    /// Create a new compilation session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created block.
    pub fn record_block_created(&self) {
        self.stats.borrow_mut().blocks_created += 1;
    }

    /// Record lowered IR instructions.
    pub fn record_instructions_lowered(&self, count: usize) {
        self.stats.borrow_mut().instructions_lowered += count;
    }

    /// Record a successful peephole rewrite.
    pub fn record_peephole_rewrite(&self, pattern: &'static str) {
        let mut stats = self.stats.borrow_mut();
        stats.peephole_rewrites += 1;
        *stats.rewrites_by_pattern.entry(pattern).or_insert(0) += 1;
    }

    /// Record an inlined call site.
    pub fn record_call_inlined(&self, caller: &str, callee: &str) {
        self.stats.borrow_mut().calls_inlined += 1;
        log::debug!("inlined call to {} in {}", callee, caller);
    }

    /// Record a function whose code was emitted.
    pub fn record_function_generated(&self, name: &str, size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_generated += 1;
        if size > stats.largest_function_size {
            stats.largest_function_size = size;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record emitted target instructions.
    pub fn record_target_instructions(&self, count: usize) {
        self.stats.borrow_mut().target_instructions += count;
    }

    /// Record a value pushed because registers ran low.
    pub fn record_spill(&self) {
        self.stats.borrow_mut().spills += 1;
    }

    /// Record a spilled value popped back into a register.
    pub fn record_reload(&self) {
        self.stats.borrow_mut().reloads += 1;
    }

    /// Record registers saved before and restored after a call.
    pub fn record_call_saves(&self, saved: usize) {
        self.stats.borrow_mut().call_saves += saved;
    }

    pub fn record_call_restores(&self, restored: usize) {
        self.stats.borrow_mut().call_restores += restored;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Blocks created by lowering and inlining.
    pub blocks_created: usize,

    /// IR instructions produced by lowering.
    pub instructions_lowered: usize,

    /// Successful peephole rewrites.
    pub peephole_rewrites: usize,

    /// Rewrites per pattern name.
    pub rewrites_by_pattern: hashbrown::HashMap<&'static str, usize>,

    /// Call sites replaced by the callee body.
    pub calls_inlined: usize,

    /// Functions with emitted code.
    pub functions_generated: usize,

    /// Target instructions emitted.
    pub target_instructions: usize,

    /// Values pushed under register pressure.
    pub spills: usize,

    /// Spilled values popped back.
    pub reloads: usize,

    /// Registers pushed before calls.
    pub call_saves: usize,

    /// Registers popped after calls.
    pub call_restores: usize,

    /// Largest function generated, in target instructions.
    pub largest_function_size: usize,

    /// Name of largest function.
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Blocks created: {}", self.blocks_created)?;
        writeln!(f, "  IR instructions lowered: {}", self.instructions_lowered)?;
        writeln!(f, "  Peephole rewrites: {}", self.peephole_rewrites)?;
        writeln!(f, "  Calls inlined: {}", self.calls_inlined)?;
        writeln!(f, "  Functions generated: {}", self.functions_generated)?;
        writeln!(f, "  Target instructions: {}", self.target_instructions)?;
        writeln!(f, "  Spills: {} (reloads: {})", self.spills, self.reloads)?;
        writeln!(
            f,
            "  Call saves/restores: {}/{}",
            self.call_saves, self.call_restores
        )?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.rewrites_by_pattern.is_empty() {
            writeln!(f, "  Rewrite breakdown:")?;
            let mut sorted: Vec<_> = self.rewrites_by_pattern.iter().collect();
            sorted.sort_by_key(|(name, count)| (std::cmp::Reverse(**count), **name));

            for (pattern, count) in sorted {
                writeln!(f, "    {}: {}", pattern, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let session = CompilationSession::new();
        session.record_block_created();
        session.record_block_created();

        let stats = session.stats();
        assert_eq!(stats.blocks_created, 2);
        assert_eq!(stats.peephole_rewrites, 0);
        assert_eq!(stats.calls_inlined, 0);
    }

    #[test]
    fn test_session_statistics() {
        let session = CompilationSession::new();

        session.record_peephole_rewrite("fold");
        session.record_peephole_rewrite("mul-to-shl");
        session.record_peephole_rewrite("fold");
        session.record_spill();
        session.record_reload();
        session.record_call_saves(3);
        session.record_call_restores(3);
        session.record_function_generated("main", 12);
        session.record_function_generated("sq", 7);

        let stats = session.stats();
        assert_eq!(stats.peephole_rewrites, 3);
        assert_eq!(stats.rewrites_by_pattern["fold"], 2);
        assert_eq!(stats.spills, 1);
        assert_eq!(stats.reloads, 1);
        assert_eq!(stats.call_saves, stats.call_restores);
        assert_eq!(stats.largest_function_name, "main");
    }

    #[test]
    fn test_statistics_display() {
        let session = CompilationSession::new();
        session.record_function_generated("factorial", 40);
        session.record_peephole_rewrite("fold");

        let output = format!("{}", session.stats());
        assert!(output.contains("Functions generated: 1"));
        assert!(output.contains("factorial (40 instructions)"));
        assert!(output.contains("fold: 1"));
    }
}
