// This module lowers the checked syntax tree into the block-structured IR. A single visitor
// walks the tree once, keeping the block being appended to, the function being built (none
// at top level, where statements go to the program's declaration list), the scope chain and
// a left-value flag that makes identifiers and dereferences produce their address instead of
// a load. Structured control flow becomes fresh blocks joined by Jump/JumpCond placeholders
// whose targets are filled in once the target block exists; break and continue jumps are
// collected per enclosing construct and resolved when it closes. Conditions that are not
// comparisons get an explicit "!= 0" so every branch sees a fusable comparison. Calls are
// bracketed by BorderCall markers around their StoreParam window, arguments first and the
// callee last. Type mismatches between producer and consumer get an explicit cast node.

//! AST to IR lowering.

mod env;

pub use env::Env;

use crate::ast::{self, BinOp, Expr, ExprKind, Stmt, StmtKind, Type, UnOp};
use crate::core::{CompilationSession, CompileError, CompileResult, LoweringErrorKind, Span};
use crate::ir::{
    BinaryOp, BlockId, CastOp, FuncId, Function, InstrId, InstrKind, IrProgram, ResultType,
    UnaryOp,
};

/// Map a checked type onto the IR value type.
pub fn result_type(ty: &Type) -> ResultType {
    match ty {
        Type::Char => ResultType::Char,
        Type::Double => ResultType::Double,
        Type::Void => ResultType::Void,
        _ => ResultType::Integer,
    }
}

/// Lower a whole program.
pub fn lower(program: &ast::Program, session: &CompilationSession) -> CompileResult<IrProgram> {
    let mut lowerer = Lowerer::new(session);
    for item in &program.items {
        lowerer.lower_stmt(item)?;
    }
    let prog = lowerer.finish();
    log::debug!(
        "lowered {} functions, {} blocks, {} instructions",
        prog.functions.len(),
        prog.block_count(),
        prog.instr_count()
    );
    Ok(prog)
}

/// Pending break/continue jumps of one enclosing construct.
type JumpFrame = Vec<InstrId>;

pub struct Lowerer<'s> {
    session: &'s CompilationSession,
    prog: IrProgram,
    env: Env,
    /// Block being appended to; `None` at top level.
    block: Option<BlockId>,
    func: Option<FuncId>,
    left_value: bool,
    breaks: Vec<JumpFrame>,
    continues: Vec<JumpFrame>,
}

impl<'s> Lowerer<'s> {
    pub fn new(session: &'s CompilationSession) -> Self {
        Self {
            session,
            prog: IrProgram::new(),
            env: Env::new(),
            block: None,
            func: None,
            left_value: false,
            breaks: Vec::new(),
            continues: Vec::new(),
        }
    }

    pub fn finish(self) -> IrProgram {
        self.session.record_instructions_lowered(self.prog.instr_count());
        self.prog
    }

    fn emit(&mut self, ty: ResultType, kind: InstrKind) -> InstrId {
        let id = self.prog.add(ty, kind);
        match self.block {
            Some(block) => self.prog.block_mut(block).instrs.push(id),
            None => self.prog.decls.push(id),
        }
        id
    }

    fn current_function(&self, what: &'static str, span: Span) -> CompileResult<FuncId> {
        self.func.ok_or_else(|| {
            CompileError::lowering(LoweringErrorKind::OutsideFunction { what }, span)
        })
    }

    fn fresh_block(&mut self) -> BlockId {
        self.session.record_block_created();
        self.prog.new_block()
    }

    /// Close the current block (a `Nop` keeps it non-empty) and start a new one.
    fn new_block(&mut self, span: Span) -> CompileResult<BlockId> {
        let func = self.current_function("control flow", span)?;
        if let Some(current) = self.block {
            self.seal(func, current);
        }
        let next = self.fresh_block();
        self.block = Some(next);
        Ok(next)
    }

    fn seal(&mut self, func: FuncId, block: BlockId) {
        if self.prog.block(block).instrs.is_empty() {
            let nop = self.prog.add(ResultType::Void, InstrKind::Nop);
            self.prog.block_mut(block).instrs.push(nop);
        }
        self.prog.function_mut(func).blocks.push(block);
    }

    fn set_jump(&mut self, jump: InstrId, block: BlockId) {
        if let InstrKind::Jump { target } = &mut self.prog.instr_mut(jump).kind {
            *target = Some(block);
        }
    }

    fn set_branch(&mut self, jump: InstrId, taken: bool, block: BlockId) {
        if let InstrKind::JumpCond {
            on_true, on_false, ..
        } = &mut self.prog.instr_mut(jump).kind
        {
            if taken {
                *on_true = Some(block);
            } else {
                *on_false = Some(block);
            }
        }
    }

    fn jump(&mut self) -> InstrId {
        self.emit(ResultType::Void, InstrKind::Jump { target: None })
    }

    fn cast_to(&mut self, value: InstrId, to: ResultType) -> InstrId {
        match CastOp::between(self.prog.ty(value), to) {
            Some(op) => self.emit(op.result_type(), InstrKind::Cast { op, value }),
            None => value,
        }
    }

    fn imm_int(&mut self, value: i64) -> InstrId {
        self.emit(ResultType::Integer, InstrKind::LoadImmInt(value))
    }

    // ---- statements -------------------------------------------------------

    pub fn lower_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::VarDecl { name, ty, init } => self.lower_var_decl(name, ty, init.as_ref(), span),
            StmtKind::FunDecl {
                name,
                ret,
                params,
                body,
            } => self.lower_function(name, ret, params, body, span),
            StmtKind::Block(body) => {
                self.env.enter();
                let result = body.iter().try_for_each(|s| self.lower_stmt(s));
                self.env.leave();
                result
            }
            StmtKind::Expr(expr) => self.lower_expr(expr).map(|_| ()),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => self.lower_if(cond, then, otherwise.as_deref(), span),
            StmtKind::While { cond, body } => self.lower_while(cond, body, span),
            StmtKind::DoWhile { body, cond } => self.lower_do_while(body, cond, span),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, span),
            StmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.lower_switch(scrutinee, cases, default.as_deref(), span),
            StmtKind::Break => self.lower_loop_exit(true, span),
            StmtKind::Continue => self.lower_loop_exit(false, span),
            StmtKind::Return(value) => {
                let func = self.current_function("return", span)?;
                let ret = self.prog.function(func).ret;
                let value = match value {
                    Some(expr) => {
                        let v = self.lower_expr(expr)?;
                        Some(self.cast_to(v, ret))
                    }
                    None => None,
                };
                self.emit(ResultType::Void, InstrKind::Return { value });
                Ok(())
            }
            StmtKind::Write(value) => {
                let v = self.lower_expr(value)?;
                self.emit(ResultType::Void, InstrKind::DebugWrite { value: v });
                Ok(())
            }
        }
    }

    fn lower_var_decl(
        &mut self,
        name: &str,
        ty: &Type,
        init: Option<&Expr>,
        span: Span,
    ) -> CompileResult<()> {
        let ty = result_type(ty);
        let alloc = match self.func {
            None => {
                let alloc = self.prog.add(ty, InstrKind::AllocGlobal);
                self.prog.globals.push(alloc);
                alloc
            }
            Some(func) => {
                let alloc = self.prog.add(ty, InstrKind::AllocLocal);
                self.prog.function_mut(func).allocs.push(alloc);
                alloc
            }
        };
        self.env.declare(name, alloc, span)?;

        if let Some(init) = init {
            let value = self.lower_expr(init)?;
            let value = self.cast_to(value, ty);
            self.emit(ty, InstrKind::Store { addr: alloc, value });
        }
        Ok(())
    }

    fn lower_function(
        &mut self,
        name: &str,
        ret: &Type,
        params: &[ast::Param],
        body: &Stmt,
        span: Span,
    ) -> CompileResult<()> {
        let func = FuncId(self.prog.functions.len() as u32);
        let address = self.prog.add(ResultType::Void, InstrKind::FunAddress { func });
        self.prog.functions.push(Function {
            name: name.to_string(),
            ret: result_type(ret),
            args: Vec::new(),
            allocs: Vec::new(),
            blocks: Vec::new(),
            address,
        });
        // bound before the body so recursive calls resolve
        self.env.declare(name, address, span)?;

        let outer_block = self.block;
        let outer_func = self.func;
        self.env.enter();

        for param in params {
            let alloc = self.prog.add(result_type(&param.ty), InstrKind::AllocArg);
            self.prog.function_mut(func).args.push(alloc);
            self.env.declare(&param.name, alloc, span)?;
        }

        self.func = Some(func);
        self.block = Some(self.fresh_block());
        let result = self.lower_stmt(body);

        if let Some(last) = self.block {
            self.seal(func, last);
        }
        self.env.leave();
        self.func = outer_func;
        self.block = outer_block;
        result?;

        log::debug!(
            "lowered function {} ({} blocks)",
            name,
            self.prog.function(func).blocks.len()
        );
        Ok(())
    }

    /// Make `cond` a comparison the following branch can fuse with.
    fn condition_adjust(&mut self, cond: InstrId) -> CompileResult<InstrId> {
        if let InstrKind::Binary { op, cmp_jump, .. } = &mut self.prog.instr_mut(cond).kind {
            if op.is_comparison() {
                *cmp_jump = true;
                return Ok(cond);
            }
        }

        let (lhs, zero) = match self.prog.ty(cond) {
            ResultType::Integer => (cond, self.imm_int(0)),
            ResultType::Char => {
                let widened = self.cast_to(cond, ResultType::Integer);
                (widened, self.imm_int(0))
            }
            ResultType::Double => (
                cond,
                self.emit(ResultType::Double, InstrKind::LoadImmDouble(0.0)),
            ),
            ResultType::Void => {
                return Err(CompileError::internal(format!(
                    "condition {} has no value",
                    cond
                )))
            }
        };
        Ok(self.emit(
            ResultType::Integer,
            InstrKind::Binary {
                op: BinaryOp::NEq,
                lhs,
                rhs: zero,
                cmp_jump: true,
            },
        ))
    }

    fn branch_on(&mut self, cond: &Expr) -> CompileResult<InstrId> {
        let value = self.lower_expr(cond)?;
        let value = self.condition_adjust(value)?;
        Ok(self.emit(
            ResultType::Void,
            InstrKind::JumpCond {
                cond: value,
                on_true: None,
                on_false: None,
            },
        ))
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
        span: Span,
    ) -> CompileResult<()> {
        self.current_function("if", span)?;
        let branch = self.branch_on(cond)?;

        let then_block = self.new_block(span)?;
        self.set_branch(branch, true, then_block);
        self.lower_stmt(then)?;
        let skip_else = self.jump();

        let else_block = self.new_block(span)?;
        self.set_branch(branch, false, else_block);
        match otherwise {
            Some(otherwise) => {
                self.lower_stmt(otherwise)?;
                let to_join = self.jump();
                let join = self.new_block(span)?;
                self.set_jump(to_join, join);
                self.set_jump(skip_else, join);
            }
            None => self.set_jump(skip_else, else_block),
        }
        Ok(())
    }

    fn push_loop(&mut self) {
        self.breaks.push(Vec::new());
        self.continues.push(Vec::new());
    }

    fn pop_loop(&mut self, continue_to: BlockId, break_to: BlockId) {
        for jump in self.continues.pop().unwrap_or_default() {
            self.set_jump(jump, continue_to);
        }
        for jump in self.breaks.pop().unwrap_or_default() {
            self.set_jump(jump, break_to);
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt, span: Span) -> CompileResult<()> {
        self.current_function("while", span)?;
        self.push_loop();

        let enter = self.jump();
        let head = self.new_block(span)?;
        self.set_jump(enter, head);
        let branch = self.branch_on(cond)?;

        let body_block = self.new_block(span)?;
        self.set_branch(branch, true, body_block);
        self.lower_stmt(body)?;
        let back = self.jump();
        self.set_jump(back, head);

        let exit = self.new_block(span)?;
        self.set_branch(branch, false, exit);
        self.pop_loop(head, exit);
        Ok(())
    }

    fn lower_do_while(&mut self, body: &Stmt, cond: &Expr, span: Span) -> CompileResult<()> {
        self.current_function("do-while", span)?;
        self.push_loop();

        let body_block = self.new_block(span)?;
        self.lower_stmt(body)?;
        let to_cond = self.jump();

        let cond_block = self.new_block(span)?;
        self.set_jump(to_cond, cond_block);
        let branch = self.branch_on(cond)?;
        self.set_branch(branch, true, body_block);

        let exit = self.new_block(span)?;
        self.set_branch(branch, false, exit);
        self.pop_loop(cond_block, exit);
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        span: Span,
    ) -> CompileResult<()> {
        self.current_function("for", span)?;
        self.env.enter();
        self.push_loop();

        let result = self.lower_for_blocks(init, cond, step, body, span);
        match result {
            Ok((step_block, exit)) => self.pop_loop(step_block, exit),
            Err(_) => {
                self.breaks.pop();
                self.continues.pop();
            }
        }
        self.env.leave();
        result.map(|_| ())
    }

    /// Returns the continue and break targets of the loop.
    fn lower_for_blocks(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        span: Span,
    ) -> CompileResult<(BlockId, BlockId)> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        let enter = self.jump();
        let head = self.new_block(span)?;
        self.set_jump(enter, head);

        let branch = match cond {
            Some(cond) => self.branch_on(cond)?,
            None => {
                let always = self.imm_int(1);
                let always = self.condition_adjust(always)?;
                self.emit(
                    ResultType::Void,
                    InstrKind::JumpCond {
                        cond: always,
                        on_true: None,
                        on_false: None,
                    },
                )
            }
        };

        let body_block = self.new_block(span)?;
        self.set_branch(branch, true, body_block);
        self.lower_stmt(body)?;
        let to_step = self.jump();

        let step_block = self.new_block(span)?;
        self.set_jump(to_step, step_block);
        if let Some(step) = step {
            self.lower_expr(step)?;
        }
        let back = self.jump();
        self.set_jump(back, head);

        let exit = self.new_block(span)?;
        self.set_branch(branch, false, exit);
        Ok((step_block, exit))
    }

    fn lower_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[(i64, Stmt)],
        default: Option<&Stmt>,
        span: Span,
    ) -> CompileResult<()> {
        let func = self.current_function("switch", span)?;
        let value = self.lower_expr(scrutinee)?;
        let value = self.cast_to(value, ResultType::Integer);

        // the scrutinee is evaluated once and reloaded for every comparison
        let slot = self.prog.add(ResultType::Integer, InstrKind::AllocLocal);
        self.prog.function_mut(func).allocs.push(slot);
        self.emit(ResultType::Integer, InstrKind::Store { addr: slot, value });

        self.breaks.push(Vec::new());

        let mut tests = Vec::with_capacity(cases.len());
        for (case, _) in cases {
            let current = self.emit(ResultType::Integer, InstrKind::Load { addr: slot });
            let imm = self.imm_int(*case);
            let eq = self.emit(
                ResultType::Integer,
                InstrKind::Binary {
                    op: BinaryOp::Eq,
                    lhs: current,
                    rhs: imm,
                    cmp_jump: true,
                },
            );
            let branch = self.emit(
                ResultType::Void,
                InstrKind::JumpCond {
                    cond: eq,
                    on_true: None,
                    on_false: None,
                },
            );
            tests.push(branch);
            let next = self.new_block(span)?;
            self.set_branch(branch, false, next);
        }
        let no_match = self.jump();
        self.new_block(span)?;

        let mut exits = Vec::new();
        for (branch, (_, body)) in tests.into_iter().zip(cases) {
            let arm = self.block.ok_or_else(|| CompileError::internal("switch arm without block"))?;
            self.set_branch(branch, true, arm);
            self.lower_stmt(body)?;
            exits.push(self.jump());
            self.new_block(span)?;
        }

        match default {
            Some(default) => {
                let arm = self.block.ok_or_else(|| CompileError::internal("switch default without block"))?;
                self.set_jump(no_match, arm);
                self.lower_stmt(default)?;
                exits.push(self.jump());
                self.new_block(span)?;
            }
            None => exits.push(no_match),
        }

        let join = self.block.ok_or_else(|| CompileError::internal("switch without join block"))?;
        for exit in exits {
            self.set_jump(exit, join);
        }
        for jump in self.breaks.pop().unwrap_or_default() {
            self.set_jump(jump, join);
        }
        Ok(())
    }

    fn lower_loop_exit(&mut self, is_break: bool, span: Span) -> CompileResult<()> {
        let keyword = if is_break { "break" } else { "continue" };
        let depth = if is_break {
            self.breaks.len()
        } else {
            self.continues.len()
        };
        if depth == 0 {
            return Err(CompileError::lowering(
                LoweringErrorKind::JumpOutsideLoop { keyword },
                span,
            ));
        }
        let jump = self.jump();
        let frames = if is_break {
            &mut self.breaks
        } else {
            &mut self.continues
        };
        if let Some(frame) = frames.last_mut() {
            frame.push(jump);
        }
        Ok(())
    }

    // ---- expressions ------------------------------------------------------

    /// Lower `expr` for its address (assignment and increment targets).
    fn lower_lvalue(&mut self, expr: &Expr) -> CompileResult<InstrId> {
        let saved = self.left_value;
        self.left_value = true;
        let result = self.lower_expr(expr);
        self.left_value = saved;
        result
    }

    /// Lower `expr` for its value.
    fn lower_rvalue(&mut self, expr: &Expr) -> CompileResult<InstrId> {
        let saved = self.left_value;
        self.left_value = false;
        let result = self.lower_expr(expr);
        self.left_value = saved;
        result
    }

    pub fn lower_expr(&mut self, expr: &Expr) -> CompileResult<InstrId> {
        let ty = result_type(&expr.ty);
        match &expr.kind {
            ExprKind::Int(v) => Ok(self.imm_int(*v)),
            ExprKind::Char(v) => Ok(self.emit(ResultType::Char, InstrKind::LoadImmChar(*v))),
            ExprKind::Double(v) => Ok(self.emit(ResultType::Double, InstrKind::LoadImmDouble(*v))),
            ExprKind::Ident(name) => {
                let storage = self.env.resolve(name, expr.span)?;
                if self.left_value {
                    return Ok(storage);
                }
                match self.prog.kind(storage) {
                    InstrKind::FunAddress { .. } => {
                        Ok(self.emit(ResultType::Integer, InstrKind::LoadFun { func: storage }))
                    }
                    _ => Ok(self.emit(ty, InstrKind::Load { addr: storage })),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, ty),
            ExprKind::Unary { op, arg } => self.lower_unary(*op, arg, ty),
            ExprKind::AddressOf(target) => {
                let target = self.lower_lvalue(target)?;
                match self.prog.kind(target) {
                    InstrKind::FunAddress { .. } => {
                        Ok(self.emit(ResultType::Integer, InstrKind::LoadFun { func: target }))
                    }
                    kind if kind.is_alloc() => {
                        Ok(self.emit(ResultType::Integer, InstrKind::LoadAddress { addr: target }))
                    }
                    // `&*p` is `p`
                    _ => Ok(target),
                }
            }
            ExprKind::Deref(pointer) => {
                let pointer = self.lower_rvalue(pointer)?;
                if self.left_value {
                    Ok(pointer)
                } else {
                    Ok(self.emit(ty, InstrKind::LoadDeref { addr: pointer }))
                }
            }
            ExprKind::Assign { target, value } => {
                let value = self.lower_rvalue(value)?;
                let target_ty = result_type(&target.ty);
                let value = self.cast_to(value, target_ty);
                let addr = self.lower_lvalue(target)?;
                Ok(self.emit(target_ty, InstrKind::Store { addr, value }))
            }
            ExprKind::Call { callee, args } => self.lower_call(callee, args, ty),
            ExprKind::Cast(value) => {
                let value = self.lower_rvalue(value)?;
                Ok(self.cast_to(value, ty))
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        ty: ResultType,
    ) -> CompileResult<InstrId> {
        let mut left = self.lower_rvalue(lhs)?;
        let mut right = self.lower_rvalue(rhs)?;

        let op = match op {
            BinOp::Add => BinaryOp::Add,
            BinOp::Sub => BinaryOp::Sub,
            BinOp::Mul => BinaryOp::Mul,
            BinOp::Div => BinaryOp::Div,
            BinOp::Mod => BinaryOp::Mod,
            BinOp::Shl => BinaryOp::ShL,
            BinOp::Shr => BinaryOp::ShR,
            BinOp::BitAnd => BinaryOp::BitAnd,
            BinOp::BitOr => BinaryOp::BitOr,
            BinOp::BitXor => BinaryOp::Xor,
            BinOp::And => BinaryOp::And,
            BinOp::Or => BinaryOp::Or,
            BinOp::Eq => BinaryOp::Eq,
            BinOp::Ne => BinaryOp::NEq,
            BinOp::Lt => BinaryOp::Lt,
            BinOp::Le => BinaryOp::Le,
            BinOp::Gt => BinaryOp::Gt,
            BinOp::Ge => BinaryOp::Ge,
        };

        let result_ty = if op.is_comparison() {
            // operands meet at the wider of their types, the result is a truth value
            let common = match (self.prog.ty(left), self.prog.ty(right)) {
                (ResultType::Double, _) | (_, ResultType::Double) => ResultType::Double,
                (ResultType::Char, ResultType::Char) => ResultType::Char,
                _ => ResultType::Integer,
            };
            right = self.cast_to(right, common);
            left = self.cast_to(left, common);
            ResultType::Integer
        } else if matches!(op, BinaryOp::And | BinaryOp::Or) {
            ResultType::Integer
        } else {
            right = self.cast_to(right, ty);
            left = self.cast_to(left, ty);
            ty
        };

        Ok(self.emit(
            result_ty,
            InstrKind::Binary {
                op,
                lhs: left,
                rhs: right,
                cmp_jump: false,
            },
        ))
    }

    fn lower_unary(&mut self, op: UnOp, arg: &Expr, ty: ResultType) -> CompileResult<InstrId> {
        match op {
            UnOp::Plus | UnOp::Minus | UnOp::Not | UnOp::BitNot => {
                let operand = self.lower_rvalue(arg)?;
                let op = match op {
                    UnOp::Plus => UnaryOp::Plus,
                    UnOp::Minus => UnaryOp::Minus,
                    UnOp::Not => UnaryOp::Not,
                    _ => UnaryOp::Neg,
                };
                Ok(self.emit(ty, InstrKind::Unary { op, operand }))
            }
            UnOp::PreInc | UnOp::PreDec => {
                let op = if op == UnOp::PreInc {
                    UnaryOp::Inc
                } else {
                    UnaryOp::Dec
                };
                let operand = self.lower_rvalue(arg)?;
                let stepped = self.emit(ty, InstrKind::Unary { op, operand });
                let addr = self.lower_lvalue(arg)?;
                Ok(self.emit(ty, InstrKind::Store { addr, value: stepped }))
            }
            UnOp::PostInc | UnOp::PostDec => {
                let op = if op == UnOp::PostInc {
                    UnaryOp::Inc
                } else {
                    UnaryOp::Dec
                };
                // the old value is loaded first so it sits below the stepped one
                let old = self.lower_rvalue(arg)?;
                let operand = self.lower_rvalue(arg)?;
                let stepped = self.emit(ty, InstrKind::Unary { op, operand });
                let addr = self.lower_lvalue(arg)?;
                self.emit(ty, InstrKind::Store { addr, value: stepped });
                Ok(old)
            }
        }
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], ty: ResultType) -> CompileResult<InstrId> {
        let call = self.prog.add(ty, InstrKind::Nop);
        self.emit(ResultType::Void, InstrKind::BorderCall { call, start: true });

        let mut values = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let value = self.lower_rvalue(arg)?;
            let value = match callee.ty.arg_type(index) {
                Some(param) => self.cast_to(value, result_type(param)),
                None => value,
            };
            self.emit(ResultType::Void, InstrKind::StoreParam { value });
            values.push(value);
        }

        let kind = if callee.ty.is_pointer() {
            let target = self.lower_rvalue(callee)?;
            InstrKind::Call {
                callee: target,
                args: values,
            }
        } else {
            let target = self.lower_lvalue(callee)?;
            match self.prog.kind(target) {
                InstrKind::FunAddress { .. } => InstrKind::CallStatic {
                    callee: target,
                    args: values,
                },
                // a function-typed variable: call through its value
                _ => {
                    let loaded = self.emit(ResultType::Integer, InstrKind::Load { addr: target });
                    InstrKind::Call {
                        callee: loaded,
                        args: values,
                    }
                }
            }
        };

        self.prog.instr_mut(call).kind = kind;
        match self.block {
            Some(block) => self.prog.block_mut(block).instrs.push(call),
            None => self.prog.decls.push(call),
        }
        self.emit(ResultType::Void, InstrKind::BorderCall { call, start: false });
        Ok(call)
    }
}
