//! Instruction sink with two-pass label resolution.

use super::{Instr, Label, TargetProgram};
use crate::core::{CompileError, CompileResult};

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instr>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its address.
    pub fn add(&mut self, instr: Instr) -> Label {
        log::trace!("{:>5}  {}", self.instructions.len(), instr);
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    /// Point the transfer at `label` to `dest`.
    pub fn patch(&mut self, label: Label, dest: Label) -> CompileResult<()> {
        let instr = self
            .instructions
            .get_mut(label)
            .ok_or_else(|| CompileError::internal(format!("patch of unknown label {}", label)))?;
        if instr.patch(dest) {
            Ok(())
        } else {
            Err(CompileError::internal(format!(
                "instruction {} at {} has no target to patch",
                instr, label
            )))
        }
    }

    /// Address the next instruction will get.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, label: Label) -> Option<&Instr> {
        self.instructions.get(label)
    }

    pub fn program(self, data: Vec<i64>, register_count: usize) -> TargetProgram {
        TargetProgram {
            instructions: self.instructions,
            data,
            register_count,
        }
    }
}
