// This module defines the intermediate representation that flows between the lowering pass,
// the two optimizer passes and the code generator. Instructions and blocks live in arenas
// owned by IrProgram and are referred to by index (InstrId, BlockId), so an operand is a
// shared reference to the producing instruction and jump edges may form cycles without any
// ownership problem: dropping the program frees every node exactly once. Block ids are
// arena indices, assigned in creation order starting at zero for each program. Instruction
// kinds are a closed enum matched exhaustively by every pass; the storage field is written
// by the code generator and is Unassigned until then.

//! Block-structured IR.

mod display;

use std::fmt;

/// Index of an instruction in the program arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl InstrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Block identity, unique within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Index of a function in `IrProgram::functions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultType {
    Integer,
    Char,
    Double,
    Void,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultType::Integer => "int",
            ResultType::Char => "char",
            ResultType::Double => "double",
            ResultType::Void => "void",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    ShL,
    ShR,
    BitAnd,
    BitOr,
    Xor,
    /// Logical and, both operands evaluated.
    And,
    /// Logical or, both operands evaluated.
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    NEq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::NEq
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::ShL => "shl",
            BinaryOp::ShR => "shr",
            BinaryOp::BitAnd => "bitand",
            BinaryOp::BitOr => "bitor",
            BinaryOp::Xor => "xor",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Eq => "eq",
            BinaryOp::NEq => "neq",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    /// Logical not.
    Not,
    /// Bitwise complement.
    Neg,
    Inc,
    Dec,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Plus => "plus",
            UnaryOp::Minus => "minus",
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
            UnaryOp::Inc => "inc",
            UnaryOp::Dec => "dec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    CharToInt,
    IntToDouble,
    CharToDouble,
    DoubleToInt,
}

impl CastOp {
    /// Cast needed to turn a `from` value into a `to` value, if any.
    pub fn between(from: ResultType, to: ResultType) -> Option<CastOp> {
        match (from, to) {
            (ResultType::Char, ResultType::Integer) => Some(CastOp::CharToInt),
            (ResultType::Integer, ResultType::Double) => Some(CastOp::IntToDouble),
            (ResultType::Char, ResultType::Double) => Some(CastOp::CharToDouble),
            (ResultType::Double, ResultType::Integer) => Some(CastOp::DoubleToInt),
            _ => None,
        }
    }

    pub fn result_type(self) -> ResultType {
        match self {
            CastOp::CharToInt | CastOp::DoubleToInt => ResultType::Integer,
            CastOp::IntToDouble | CastOp::CharToDouble => ResultType::Double,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CastOp::CharToInt => "ctoi",
            CastOp::IntToDouble => "itod",
            CastOp::CharToDouble => "ctod",
            CastOp::DoubleToInt => "dtoi",
        }
    }
}

/// Where the code generator keeps a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    #[default]
    Unassigned,
    Register(u8),
    /// Frame slot, addressed as `[BP - offset]`.
    Stack(i64),
    /// Data segment address.
    Memory(i64),
    /// Pushed on the machine stack.
    Spilled,
    Immediate(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// Address of a function, used as the callee of static calls.
    FunAddress { func: FuncId },
    AllocGlobal,
    AllocLocal,
    AllocArg,
    Load { addr: InstrId },
    LoadImmInt(i64),
    LoadImmChar(i8),
    LoadImmDouble(f64),
    LoadAddress { addr: InstrId },
    LoadDeref { addr: InstrId },
    LoadFun { func: InstrId },
    Store { addr: InstrId, value: InstrId },
    StoreParam { value: InstrId },
    Return { value: Option<InstrId> },
    DebugWrite { value: InstrId },
    Jump { target: Option<BlockId> },
    JumpCond {
        cond: InstrId,
        on_true: Option<BlockId>,
        on_false: Option<BlockId>,
    },
    CondSwitch {
        cond: InstrId,
        cases: Vec<(i64, BlockId)>,
        default: Option<BlockId>,
    },
    Binary {
        op: BinaryOp,
        lhs: InstrId,
        rhs: InstrId,
        /// Set when the only consumer is the following conditional jump.
        cmp_jump: bool,
    },
    Unary { op: UnaryOp, operand: InstrId },
    Cast { op: CastOp, value: InstrId },
    /// Call through a pointer.
    Call { callee: InstrId, args: Vec<InstrId> },
    /// Call of a known function; `callee` is its `FunAddress`.
    CallStatic { callee: InstrId, args: Vec<InstrId> },
    /// Start or end of the argument window of `call`.
    BorderCall { call: InstrId, start: bool },
    Nop,
}

/// Payload-free instruction kind, used by peephole templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrTag {
    FunAddress,
    AllocGlobal,
    AllocLocal,
    AllocArg,
    Load,
    LoadImmInt,
    LoadImmChar,
    LoadImmDouble,
    LoadAddress,
    LoadDeref,
    LoadFun,
    Store,
    StoreParam,
    Return,
    DebugWrite,
    Jump,
    JumpCond,
    CondSwitch,
    Binary,
    Unary,
    Cast,
    Call,
    CallStatic,
    BorderCall,
    Nop,
}

impl InstrKind {
    pub fn tag(&self) -> InstrTag {
        match self {
            InstrKind::FunAddress { .. } => InstrTag::FunAddress,
            InstrKind::AllocGlobal => InstrTag::AllocGlobal,
            InstrKind::AllocLocal => InstrTag::AllocLocal,
            InstrKind::AllocArg => InstrTag::AllocArg,
            InstrKind::Load { .. } => InstrTag::Load,
            InstrKind::LoadImmInt(_) => InstrTag::LoadImmInt,
            InstrKind::LoadImmChar(_) => InstrTag::LoadImmChar,
            InstrKind::LoadImmDouble(_) => InstrTag::LoadImmDouble,
            InstrKind::LoadAddress { .. } => InstrTag::LoadAddress,
            InstrKind::LoadDeref { .. } => InstrTag::LoadDeref,
            InstrKind::LoadFun { .. } => InstrTag::LoadFun,
            InstrKind::Store { .. } => InstrTag::Store,
            InstrKind::StoreParam { .. } => InstrTag::StoreParam,
            InstrKind::Return { .. } => InstrTag::Return,
            InstrKind::DebugWrite { .. } => InstrTag::DebugWrite,
            InstrKind::Jump { .. } => InstrTag::Jump,
            InstrKind::JumpCond { .. } => InstrTag::JumpCond,
            InstrKind::CondSwitch { .. } => InstrTag::CondSwitch,
            InstrKind::Binary { .. } => InstrTag::Binary,
            InstrKind::Unary { .. } => InstrTag::Unary,
            InstrKind::Cast { .. } => InstrTag::Cast,
            InstrKind::Call { .. } => InstrTag::Call,
            InstrKind::CallStatic { .. } => InstrTag::CallStatic,
            InstrKind::BorderCall { .. } => InstrTag::BorderCall,
            InstrKind::Nop => InstrTag::Nop,
        }
    }

    pub fn is_alloc(&self) -> bool {
        matches!(
            self,
            InstrKind::AllocGlobal | InstrKind::AllocLocal | InstrKind::AllocArg
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(self, InstrKind::Call { .. } | InstrKind::CallStatic { .. })
    }

    /// Values read by this instruction, in evaluation order.
    ///
    /// The call link of a `BorderCall` is not a value read and is left out.
    pub fn operands(&self) -> Vec<InstrId> {
        match self {
            InstrKind::FunAddress { .. }
            | InstrKind::AllocGlobal
            | InstrKind::AllocLocal
            | InstrKind::AllocArg
            | InstrKind::LoadImmInt(_)
            | InstrKind::LoadImmChar(_)
            | InstrKind::LoadImmDouble(_)
            | InstrKind::Jump { .. }
            | InstrKind::BorderCall { .. }
            | InstrKind::Nop => Vec::new(),
            InstrKind::Load { addr }
            | InstrKind::LoadAddress { addr }
            | InstrKind::LoadDeref { addr } => vec![*addr],
            InstrKind::LoadFun { func } => vec![*func],
            InstrKind::Store { addr, value } => vec![*value, *addr],
            InstrKind::StoreParam { value }
            | InstrKind::DebugWrite { value }
            | InstrKind::Cast { value, .. } => vec![*value],
            InstrKind::Return { value } => value.iter().copied().collect(),
            InstrKind::JumpCond { cond, .. } | InstrKind::CondSwitch { cond, .. } => vec![*cond],
            InstrKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstrKind::Unary { operand, .. } => vec![*operand],
            InstrKind::Call { callee, args } | InstrKind::CallStatic { callee, args } => {
                let mut ops = args.clone();
                ops.push(*callee);
                ops
            }
        }
    }

    /// Every instruction reference held by this instruction, including call links.
    pub fn for_each_ref_mut(&mut self, mut f: impl FnMut(&mut InstrId)) {
        match self {
            InstrKind::FunAddress { .. }
            | InstrKind::AllocGlobal
            | InstrKind::AllocLocal
            | InstrKind::AllocArg
            | InstrKind::LoadImmInt(_)
            | InstrKind::LoadImmChar(_)
            | InstrKind::LoadImmDouble(_)
            | InstrKind::Jump { .. }
            | InstrKind::Nop => {}
            InstrKind::Load { addr }
            | InstrKind::LoadAddress { addr }
            | InstrKind::LoadDeref { addr } => f(addr),
            InstrKind::LoadFun { func } => f(func),
            InstrKind::Store { addr, value } => {
                f(value);
                f(addr);
            }
            InstrKind::StoreParam { value }
            | InstrKind::DebugWrite { value }
            | InstrKind::Cast { value, .. } => f(value),
            InstrKind::Return { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            InstrKind::JumpCond { cond, .. } | InstrKind::CondSwitch { cond, .. } => f(cond),
            InstrKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            InstrKind::Unary { operand, .. } => f(operand),
            InstrKind::Call { callee, args } | InstrKind::CallStatic { callee, args } => {
                args.iter_mut().for_each(&mut f);
                f(callee);
            }
            InstrKind::BorderCall { call, .. } => f(call),
        }
    }

    /// Every jump target, resolved or not.
    pub fn for_each_target_mut(&mut self, mut f: impl FnMut(&mut Option<BlockId>)) {
        match self {
            InstrKind::Jump { target } => f(target),
            InstrKind::JumpCond {
                on_true, on_false, ..
            } => {
                f(on_true);
                f(on_false);
            }
            InstrKind::CondSwitch { cases, default, .. } => {
                for (_, block) in cases.iter_mut() {
                    let mut slot = Some(*block);
                    f(&mut slot);
                    if let Some(resolved) = slot {
                        *block = resolved;
                    }
                }
                f(default);
            }
            _ => {}
        }
    }

    /// Jump targets of this instruction; unresolved ones are reported as `None`.
    pub fn targets(&self) -> Vec<Option<BlockId>> {
        match self {
            InstrKind::Jump { target } => vec![*target],
            InstrKind::JumpCond {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            InstrKind::CondSwitch { cases, default, .. } => {
                let mut targets: Vec<_> = cases.iter().map(|(_, block)| Some(*block)).collect();
                targets.push(*default);
                targets
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub ty: ResultType,
    pub kind: InstrKind,
    pub storage: Storage,
}

impl Instruction {
    pub fn new(ty: ResultType, kind: InstrKind) -> Self {
        Self {
            ty,
            kind,
            storage: Storage::Unassigned,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<InstrId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret: ResultType,
    /// One `AllocArg` per parameter, in declaration order.
    pub args: Vec<InstrId>,
    /// Locals in first-declared order.
    pub allocs: Vec<InstrId>,
    /// Entry block first.
    pub blocks: Vec<BlockId>,
    pub address: InstrId,
}

/// A lowered compilation unit.
///
/// Owns every instruction and block; functions refer into the arenas by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrProgram {
    instrs: Vec<Instruction>,
    blocks: Vec<Block>,
    pub functions: Vec<Function>,
    /// Top-level statements, run before `main`.
    pub decls: Vec<InstrId>,
    pub globals: Vec<InstrId>,
}

impl IrProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new instruction to the arena. It is not placed in any block.
    pub fn add(&mut self, ty: ResultType, kind: InstrKind) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(Instruction::new(ty, kind));
        id
    }

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.index()]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.index()]
    }

    pub fn kind(&self, id: InstrId) -> &InstrKind {
        &self.instrs[id.index()].kind
    }

    pub fn ty(&self, id: InstrId) -> ResultType {
        self.instrs[id.index()].ty
    }

    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    /// Create an empty block with the next identity.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            instrs: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|index| FuncId(index as u32))
    }

    /// Instructions of every block of `func`.
    pub fn function_size(&self, func: FuncId) -> usize {
        self.function(func)
            .blocks
            .iter()
            .map(|&block| self.block(block).instrs.len())
            .sum()
    }

    /// Function targeted by a static call instruction.
    pub fn static_callee(&self, call: InstrId) -> Option<FuncId> {
        match self.kind(call) {
            InstrKind::CallStatic { callee, .. } => match self.kind(*callee) {
                InstrKind::FunAddress { func } => Some(*func),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn static_call_count(&self, func: FuncId) -> usize {
        self.function(func)
            .blocks
            .iter()
            .flat_map(|&block| self.block(block).instrs.iter())
            .filter(|&&id| matches!(self.kind(id), InstrKind::CallStatic { .. }))
            .count()
    }

    pub fn total_static_calls(&self) -> usize {
        self.function_ids().map(|f| self.static_call_count(f)).sum()
    }

    /// Instructions in layout order: declarations, then every function's blocks.
    pub fn placed_instrs(&self) -> Vec<InstrId> {
        let mut placed = self.decls.clone();
        for func in &self.functions {
            for &block in &func.blocks {
                placed.extend_from_slice(&self.block(block).instrs);
            }
        }
        placed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids_are_sequential() {
        let mut prog = IrProgram::new();
        let a = prog.add(ResultType::Integer, InstrKind::LoadImmInt(1));
        let b = prog.add(ResultType::Integer, InstrKind::LoadImmInt(2));
        assert_eq!(a, InstrId(0));
        assert_eq!(b, InstrId(1));
        assert_eq!(prog.new_block(), BlockId(0));
        assert_eq!(prog.new_block(), BlockId(1));
        assert_eq!(prog.instr(a).storage, Storage::Unassigned);
    }

    #[test]
    fn test_operand_order() {
        let kind = InstrKind::Store {
            addr: InstrId(0),
            value: InstrId(1),
        };
        assert_eq!(kind.operands(), vec![InstrId(1), InstrId(0)]);

        let call = InstrKind::CallStatic {
            callee: InstrId(9),
            args: vec![InstrId(3), InstrId(4)],
        };
        assert_eq!(call.operands(), vec![InstrId(3), InstrId(4), InstrId(9)]);

        let border = InstrKind::BorderCall {
            call: InstrId(2),
            start: true,
        };
        assert!(border.operands().is_empty());
    }

    #[test]
    fn test_ref_rewrite_includes_call_links() {
        let mut border = InstrKind::BorderCall {
            call: InstrId(2),
            start: false,
        };
        border.for_each_ref_mut(|r| *r = InstrId(7));
        assert_eq!(
            border,
            InstrKind::BorderCall {
                call: InstrId(7),
                start: false
            }
        );
    }

    #[test]
    fn test_cyclic_targets() {
        let mut prog = IrProgram::new();
        let head = prog.new_block();
        let body = prog.new_block();
        let back = prog.add(ResultType::Void, InstrKind::Jump { target: Some(head) });
        let fwd = prog.add(ResultType::Void, InstrKind::Jump { target: Some(body) });
        prog.block_mut(head).instrs.push(fwd);
        prog.block_mut(body).instrs.push(back);

        assert_eq!(prog.kind(back).targets(), vec![Some(head)]);
        assert_eq!(prog.kind(fwd).targets(), vec![Some(body)]);
        // dropping a cyclic graph is just dropping the arenas
        drop(prog);
    }

    #[test]
    fn test_cast_between() {
        assert_eq!(
            CastOp::between(ResultType::Char, ResultType::Integer),
            Some(CastOp::CharToInt)
        );
        assert_eq!(CastOp::between(ResultType::Integer, ResultType::Integer), None);
        assert_eq!(CastOp::DoubleToInt.result_type(), ResultType::Integer);
    }
}
