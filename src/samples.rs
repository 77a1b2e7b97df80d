//! Built-in checked programs.
//!
//! The parser lives outside this crate, so the command line driver and the tests use these
//! hand-built trees. Each sample knows what it should leave in the return register and what
//! it should print with `write`.

use crate::ast::{BinOp, Expr, Program, Stmt, Type, UnOp};

pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn() -> Program,
    /// Value `main` returns.
    pub returns: i64,
    /// Values printed by `write`, in order.
    pub writes: &'static [i64],
}

impl Sample {
    pub fn program(&self) -> Program {
        (self.build)()
    }
}

pub const SAMPLES: &[Sample] = &[
    Sample {
        name: "return_forty",
        description: "int main() { int a = 10; int b = a * 4; return b; }",
        build: return_forty,
        returns: 40,
        writes: &[],
    },
    Sample {
        name: "square_call",
        description: "int sq(int x) { return x * x; } int main() { int y = sq(3); return y; }",
        build: square_call,
        returns: 9,
        writes: &[],
    },
    Sample {
        name: "loop_sum",
        description: "sum of 1..=10 with a for loop",
        build: loop_sum,
        returns: 55,
        writes: &[],
    },
    Sample {
        name: "switch_select",
        description: "pick(1) + pick(2) + pick(7) over a three-way switch",
        build: switch_select,
        returns: 60,
        writes: &[],
    },
    Sample {
        name: "factorial",
        description: "recursive factorial of 5",
        build: factorial,
        returns: 120,
        writes: &[],
    },
    Sample {
        name: "pointer_swap",
        description: "swap two locals through pointers, return x * 10 + y",
        build: pointer_swap,
        returns: 43,
        writes: &[],
    },
    Sample {
        name: "debug_writes",
        description: "globals, doubles, chars and a countdown printed with write",
        build: debug_writes,
        returns: 0,
        writes: &[7, 14, 5, 66, 3, 2, 1],
    },
];

pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|sample| sample.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    SAMPLES.iter().map(|sample| sample.name)
}

fn int(name: &str) -> Expr {
    Expr::ident(name, Type::Int)
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::expr(Expr::assign(int(name), value))
}

fn call(name: &str, ret: Type, params: Vec<Type>, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::ident(name, Type::function(ret, params)), args)
}

pub fn return_forty() -> Program {
    Program::new(vec![Stmt::function(
        "main",
        Type::Int,
        vec![],
        vec![
            Stmt::var("a", Type::Int, Some(Expr::int(10))),
            Stmt::var(
                "b",
                Type::Int,
                Some(Expr::binary(BinOp::Mul, int("a"), Expr::int(4))),
            ),
            Stmt::ret(Some(int("b"))),
        ],
    )])
}

pub fn square_call() -> Program {
    Program::new(vec![
        Stmt::function(
            "sq",
            Type::Int,
            vec![("x", Type::Int)],
            vec![Stmt::ret(Some(Expr::binary(BinOp::Mul, int("x"), int("x"))))],
        ),
        Stmt::function(
            "main",
            Type::Int,
            vec![],
            vec![
                Stmt::var(
                    "y",
                    Type::Int,
                    Some(call("sq", Type::Int, vec![Type::Int], vec![Expr::int(3)])),
                ),
                Stmt::ret(Some(int("y"))),
            ],
        ),
    ])
}

pub fn loop_sum() -> Program {
    Program::new(vec![Stmt::function(
        "main",
        Type::Int,
        vec![],
        vec![
            Stmt::var("s", Type::Int, Some(Expr::int(0))),
            Stmt::var("i", Type::Int, None),
            Stmt::for_(
                Some(assign("i", Expr::int(1))),
                Some(Expr::binary(BinOp::Le, int("i"), Expr::int(10))),
                Some(Expr::unary(UnOp::PostInc, int("i"))),
                assign("s", Expr::binary(BinOp::Add, int("s"), int("i"))),
            ),
            Stmt::ret(Some(int("s"))),
        ],
    )])
}

pub fn switch_select() -> Program {
    let pick = |k: i64| call("pick", Type::Int, vec![Type::Int], vec![Expr::int(k)]);
    Program::new(vec![
        Stmt::function(
            "pick",
            Type::Int,
            vec![("k", Type::Int)],
            vec![
                Stmt::var("r", Type::Int, Some(Expr::int(0))),
                Stmt::switch(
                    int("k"),
                    vec![
                        (1, Stmt::block(vec![assign("r", Expr::int(10)), Stmt::break_()])),
                        (2, assign("r", Expr::int(20))),
                    ],
                    Some(assign("r", Expr::int(30))),
                ),
                Stmt::ret(Some(int("r"))),
            ],
        ),
        Stmt::function(
            "main",
            Type::Int,
            vec![],
            vec![Stmt::ret(Some(Expr::binary(
                BinOp::Add,
                Expr::binary(BinOp::Add, pick(1), pick(2)),
                pick(7),
            )))],
        ),
    ])
}

pub fn factorial() -> Program {
    let fact = |arg: Expr| call("fact", Type::Int, vec![Type::Int], vec![arg]);
    Program::new(vec![
        Stmt::function(
            "fact",
            Type::Int,
            vec![("n", Type::Int)],
            vec![
                Stmt::if_(
                    Expr::binary(BinOp::Le, int("n"), Expr::int(1)),
                    Stmt::ret(Some(Expr::int(1))),
                    None,
                ),
                Stmt::ret(Some(Expr::binary(
                    BinOp::Mul,
                    int("n"),
                    fact(Expr::binary(BinOp::Sub, int("n"), Expr::int(1))),
                ))),
            ],
        ),
        Stmt::function("main", Type::Int, vec![], vec![Stmt::ret(Some(fact(Expr::int(5))))]),
    ])
}

pub fn pointer_swap() -> Program {
    let int_ptr = || Type::pointer_to(Type::Int);
    let ptr = |name: &str| Expr::ident(name, int_ptr());
    Program::new(vec![
        Stmt::function(
            "swap",
            Type::Void,
            vec![("a", int_ptr()), ("b", int_ptr())],
            vec![
                Stmt::var("t", Type::Int, Some(Expr::deref(ptr("a")))),
                Stmt::expr(Expr::assign(Expr::deref(ptr("a")), Expr::deref(ptr("b")))),
                Stmt::expr(Expr::assign(Expr::deref(ptr("b")), int("t"))),
            ],
        ),
        Stmt::function(
            "main",
            Type::Int,
            vec![],
            vec![
                Stmt::var("x", Type::Int, Some(Expr::int(3))),
                Stmt::var("y", Type::Int, Some(Expr::int(4))),
                Stmt::expr(call(
                    "swap",
                    Type::Void,
                    vec![int_ptr(), int_ptr()],
                    vec![Expr::address_of(int("x")), Expr::address_of(int("y"))],
                )),
                Stmt::ret(Some(Expr::binary(
                    BinOp::Add,
                    Expr::binary(BinOp::Mul, int("x"), Expr::int(10)),
                    int("y"),
                ))),
            ],
        ),
    ])
}

pub fn debug_writes() -> Program {
    let d = || Expr::ident("d", Type::Double);
    Program::new(vec![
        Stmt::var("g", Type::Int, Some(Expr::int(7))),
        Stmt::function(
            "main",
            Type::Int,
            vec![],
            vec![
                Stmt::write(int("g")),
                Stmt::write(Expr::binary(BinOp::Mul, int("g"), Expr::int(2))),
                Stmt::var("d", Type::Double, Some(Expr::double(2.5))),
                Stmt::write(Expr::cast(
                    Expr::binary(BinOp::Mul, d(), Expr::double(2.0)),
                    Type::Int,
                )),
                Stmt::var("c", Type::Char, Some(Expr::char(65))),
                Stmt::write(Expr::binary(
                    BinOp::Add,
                    Expr::ident("c", Type::Char),
                    Expr::int(1),
                )),
                Stmt::var("i", Type::Int, Some(Expr::int(3))),
                Stmt::while_(
                    Expr::binary(BinOp::Gt, int("i"), Expr::int(0)),
                    Stmt::block(vec![
                        Stmt::write(int("i")),
                        assign("i", Expr::binary(BinOp::Sub, int("i"), Expr::int(1))),
                    ]),
                ),
                Stmt::ret(Some(Expr::int(0))),
            ],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_names_are_unique() {
        let mut names: Vec<_> = names().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(find("factorial").is_some());
        assert!(find("nope").is_none());
    }
}
