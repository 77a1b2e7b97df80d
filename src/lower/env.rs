//! Lexical scopes of the lowering pass.

use hashbrown::HashMap;

use crate::core::{CompileError, CompileResult, LoweringErrorKind, Span};
use crate::ir::InstrId;

/// Chain of scopes, innermost last. Each maps a name to the instruction owning its storage.
#[derive(Debug, Default)]
pub struct Env {
    scopes: Vec<HashMap<String, InstrId>>,
}

impl Env {
    /// Environment with the global scope already open.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn leave(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the innermost scope.
    pub fn declare(&mut self, name: &str, storage: InstrId, span: Span) -> CompileResult<()> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::internal("no open scope"))?;
        if scope.contains_key(name) {
            return Err(CompileError::lowering(
                LoweringErrorKind::DuplicateDeclaration {
                    name: name.to_string(),
                },
                span,
            ));
        }
        scope.insert(name.to_string(), storage);
        Ok(())
    }

    /// Look `name` up from the innermost scope outwards.
    pub fn find(&self, name: &str) -> Option<InstrId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    pub fn resolve(&self, name: &str, span: Span) -> CompileResult<InstrId> {
        self.find(name).ok_or_else(|| {
            CompileError::lowering(
                LoweringErrorKind::UndeclaredName {
                    name: name.to_string(),
                },
                span,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_lookup() {
        let mut env = Env::new();
        env.declare("a", InstrId(0), Span::default()).unwrap();
        env.enter();
        env.declare("a", InstrId(1), Span::default()).unwrap();
        assert_eq!(env.find("a"), Some(InstrId(1)));
        env.leave();
        assert_eq!(env.find("a"), Some(InstrId(0)));
        assert_eq!(env.find("b"), None);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut env = Env::new();
        env.declare("x", InstrId(0), Span::default()).unwrap();
        let err = env.declare("x", InstrId(1), Span::new(2, 4)).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Lowering {
                kind: LoweringErrorKind::DuplicateDeclaration { .. },
                span: Span { line: 2, col: 4 },
            }
        ));
    }

    #[test]
    fn test_global_scope_survives_leave() {
        let mut env = Env::new();
        env.leave();
        assert_eq!(env.depth(), 1);
    }
}
