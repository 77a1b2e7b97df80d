// This module holds the type-checked syntax tree consumed by the lowering pass. Parsing and
// type checking happen elsewhere; what arrives here already carries the checked type of
// every expression (`Expr::ty`) and answers `has_address` for lvalue queries. The builder
// helpers compute result types with the same rules the checker applies, which lets tests
// and the built-in sample programs construct well-typed trees directly.

//! Checked syntax tree.

pub mod types;

pub use types::Type;

pub use crate::core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Plus,
    Minus,
    /// Logical `!`.
    Not,
    /// Bitwise `~`.
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Char(i8),
    Double(f64),
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        arg: Box<Expr>,
    },
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Cast(Box<Expr>),
}

/// Expression annotated with its checked type.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub span: Span,
}

impl Expr {
    fn new(kind: ExprKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            span: Span::default(),
        }
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), Type::Int)
    }

    pub fn char(value: i8) -> Self {
        Self::new(ExprKind::Char(value), Type::Char)
    }

    pub fn double(value: f64) -> Self {
        Self::new(ExprKind::Double(value), Type::Double)
    }

    pub fn ident(name: &str, ty: Type) -> Self {
        Self::new(ExprKind::Ident(name.to_string()), ty)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = if op.is_comparison() || op.is_logical() {
            Type::Int
        } else if matches!(op, BinOp::Shl | BinOp::Shr) {
            lhs.ty.clone()
        } else {
            Type::arithmetic(&lhs.ty, &rhs.ty)
        };
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    pub fn unary(op: UnOp, arg: Expr) -> Self {
        let ty = match op {
            UnOp::Not => Type::Int,
            _ => arg.ty.clone(),
        };
        Self::new(ExprKind::Unary { op, arg: Box::new(arg) }, ty)
    }

    pub fn address_of(target: Expr) -> Self {
        let ty = Type::pointer_to(target.ty.clone());
        Self::new(ExprKind::AddressOf(Box::new(target)), ty)
    }

    pub fn deref(pointer: Expr) -> Self {
        let ty = pointer.ty.pointee().cloned().unwrap_or(Type::Int);
        Self::new(ExprKind::Deref(Box::new(pointer)), ty)
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        let ty = target.ty.clone();
        Self::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        let ty = callee.ty.return_type().cloned().unwrap_or(Type::Void);
        Self::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            ty,
        )
    }

    pub fn cast(value: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Cast(Box::new(value)), ty)
    }

    /// Whether the expression designates storage.
    pub fn has_address(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) => !self.ty.is_function(),
            ExprKind::Deref(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl {
        name: String,
        ty: Type,
        init: Option<Expr>,
    },
    FunDecl {
        name: String,
        ret: Type,
        params: Vec<Param>,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<(i64, Stmt)>,
        default: Option<Box<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    /// Debug output of a value.
    Write(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.span = Span::new(line, col);
        self
    }

    pub fn var(name: &str, ty: Type, init: Option<Expr>) -> Self {
        Self::new(StmtKind::VarDecl {
            name: name.to_string(),
            ty,
            init,
        })
    }

    pub fn function(name: &str, ret: Type, params: Vec<(&str, Type)>, body: Vec<Stmt>) -> Self {
        let params = params
            .into_iter()
            .map(|(name, ty)| Param {
                name: name.to_string(),
                ty,
            })
            .collect();
        Self::new(StmtKind::FunDecl {
            name: name.to_string(),
            ret,
            params,
            body: Box::new(Stmt::block(body)),
        })
    }

    pub fn block(body: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(body))
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn if_(cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn while_(cond: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn do_while(body: Stmt, cond: Expr) -> Self {
        Self::new(StmtKind::DoWhile {
            body: Box::new(body),
            cond,
        })
    }

    pub fn for_(init: Option<Stmt>, cond: Option<Expr>, step: Option<Expr>, body: Stmt) -> Self {
        Self::new(StmtKind::For {
            init: init.map(Box::new),
            cond,
            step,
            body: Box::new(body),
        })
    }

    pub fn switch(scrutinee: Expr, cases: Vec<(i64, Stmt)>, default: Option<Stmt>) -> Self {
        Self::new(StmtKind::Switch {
            scrutinee,
            cases,
            default: default.map(Box::new),
        })
    }

    pub fn break_() -> Self {
        Self::new(StmtKind::Break)
    }

    pub fn continue_() -> Self {
        Self::new(StmtKind::Continue)
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(StmtKind::Return(value))
    }

    pub fn write(value: Expr) -> Self {
        Self::new(StmtKind::Write(value))
    }
}

/// A whole translation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Stmt>,
}

impl Program {
    pub fn new(items: Vec<Stmt>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_typing() {
        let cmp = Expr::binary(BinOp::Lt, Expr::double(1.0), Expr::int(2));
        assert_eq!(cmp.ty, Type::Int);

        let sum = Expr::binary(BinOp::Add, Expr::char(1), Expr::double(2.0));
        assert_eq!(sum.ty, Type::Double);
    }

    #[test]
    fn test_has_address() {
        let a = Expr::ident("a", Type::Int);
        assert!(a.has_address());
        assert!(!Expr::int(3).has_address());

        let f = Expr::ident("f", Type::function(Type::Void, vec![]));
        assert!(!f.has_address());

        let p = Expr::ident("p", Type::pointer_to(Type::Int));
        let deref = Expr::deref(p);
        assert!(deref.has_address());
        assert_eq!(deref.ty, Type::Int);
    }

    #[test]
    fn test_call_type_from_callee() {
        let sq = Expr::ident("sq", Type::function(Type::Int, vec![Type::Int]));
        let call = Expr::call(sq, vec![Expr::int(3)]);
        assert_eq!(call.ty, Type::Int);
    }
}
