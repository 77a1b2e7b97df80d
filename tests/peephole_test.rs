//! Peephole rewriting: constant folding and power-of-two strength reduction.
//!
//! Each property checks both the rewritten IR and the value the generated code prints.

use proptest::prelude::*;

use tinyc::ast::{BinOp, Expr, Program, Stmt, Type};
use tinyc::core::CompilationSession;
use tinyc::ir::{BinaryOp, InstrId, InstrKind, IrProgram};
use tinyc::opt::{Optimizer, OptimizerOptions};
use tinyc::t86::Cpu;
use tinyc::{lower, samples, CompileOptions, Compiler};

fn peephole_only() -> OptimizerOptions {
    OptimizerOptions {
        inline: false,
        ..OptimizerOptions::default()
    }
}

/// `int main() { <prelude> write(value); return 0; }`
fn write_program(prelude: Vec<Stmt>, value: Expr) -> Program {
    let mut body = prelude;
    body.push(Stmt::write(value));
    body.push(Stmt::ret(Some(Expr::int(0))));
    Program::new(vec![Stmt::function("main", Type::Int, vec![], body)])
}

fn optimize(program: &Program) -> (IrProgram, usize) {
    let session = CompilationSession::new();
    let mut prog = lower(program, &session).unwrap();
    let summary = Optimizer::new(peephole_only(), &session).run(&mut prog).unwrap();
    (prog, summary.rewrites)
}

/// Value operand of the only `write` in `main`.
fn written_value(prog: &IrProgram) -> InstrId {
    let main = prog.function_by_name("main").unwrap();
    prog.function(main)
        .blocks
        .iter()
        .flat_map(|&block| prog.block(block).instrs.iter())
        .find_map(|&id| match prog.kind(id) {
            InstrKind::DebugWrite { value } => Some(*value),
            _ => None,
        })
        .unwrap()
}

fn run_output(program: &Program) -> Vec<i64> {
    let compilation = Compiler::new(CompileOptions::default()).compile(program).unwrap();
    let mut cpu = Cpu::new(&compilation.target);
    cpu.run().unwrap();
    cpu.output().to_vec()
}

fn local_x(value: i64) -> Vec<Stmt> {
    vec![Stmt::var("x", Type::Int, Some(Expr::int(value)))]
}

fn x() -> Expr {
    Expr::ident("x", Type::Int)
}

fn arithmetic_op() -> impl Strategy<Value = (BinOp, fn(i64, i64) -> i64)> {
    prop_oneof![
        Just((BinOp::Add, (|a: i64, b: i64| a + b) as fn(i64, i64) -> i64)),
        Just((BinOp::Sub, (|a: i64, b: i64| a - b) as fn(i64, i64) -> i64)),
        Just((BinOp::Mul, (|a: i64, b: i64| a * b) as fn(i64, i64) -> i64)),
        Just((BinOp::Div, (|a: i64, b: i64| a / b) as fn(i64, i64) -> i64)),
    ]
}

proptest! {
    /// Two integer literals and an arithmetic operator fold into one literal.
    #[test]
    fn constants_fold(
        a in -1000i64..1000,
        b in (-1000i64..1000).prop_filter("no division by zero", |b| *b != 0),
        (op, eval) in arithmetic_op()
    ) {
        let program = write_program(vec![], Expr::binary(op, Expr::int(a), Expr::int(b)));
        let (prog, rewrites) = optimize(&program);

        prop_assert_eq!(rewrites, 1);
        let written = written_value(&prog);
        prop_assert_eq!(prog.kind(written), &InstrKind::LoadImmInt(eval(a, b)));
        prop_assert_eq!(run_output(&program), vec![eval(a, b)]);
    }

    /// Multiplying a loaded value by 2^k becomes a left shift by k.
    #[test]
    fn multiplication_by_power_of_two_shifts(value in -1000i64..1000, k in 0u32..20) {
        let factor = 1i64 << k;
        let program = write_program(
            local_x(value),
            Expr::binary(BinOp::Mul, x(), Expr::int(factor)),
        );
        let (prog, rewrites) = optimize(&program);

        prop_assert_eq!(rewrites, 1);
        let written = written_value(&prog);
        match prog.kind(written) {
            InstrKind::Binary { op, lhs, rhs, .. } => {
                prop_assert_eq!(*op, BinaryOp::ShL);
                prop_assert!(
                    matches!(prog.kind(*lhs), InstrKind::Load { .. }),
                    "shifted operand is {:?}",
                    prog.kind(*lhs)
                );
                prop_assert_eq!(prog.kind(*rhs), &InstrKind::LoadImmInt(i64::from(k)));
            }
            other => prop_assert!(false, "expected a shift, got {:?}", other),
        }
        prop_assert_eq!(run_output(&program), vec![value * factor]);
    }

    /// Dividing a non-negative loaded value by 2^k becomes a right shift by k.
    #[test]
    fn division_by_power_of_two_shifts(value in 0i64..100_000, k in 0u32..20) {
        let divisor = 1i64 << k;
        let program = write_program(
            local_x(value),
            Expr::binary(BinOp::Div, x(), Expr::int(divisor)),
        );
        let (prog, rewrites) = optimize(&program);

        prop_assert_eq!(rewrites, 1);
        match prog.kind(written_value(&prog)) {
            InstrKind::Binary { op, .. } => prop_assert_eq!(*op, BinaryOp::ShR),
            other => prop_assert!(false, "expected a shift, got {:?}", other),
        }
        prop_assert_eq!(run_output(&program), vec![value / divisor]);
    }
}

#[test]
fn test_non_power_of_two_is_left_alone() {
    let _ = env_logger::builder().is_test(true).try_init();
    for factor in [3, 12, 0, -4] {
        let program = write_program(local_x(5), Expr::binary(BinOp::Mul, x(), Expr::int(factor)));
        let (prog, rewrites) = optimize(&program);
        assert_eq!(rewrites, 0, "x * {} must not be rewritten", factor);
        assert!(matches!(
            prog.kind(written_value(&prog)),
            InstrKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
        assert_eq!(run_output(&program), vec![5 * factor]);
    }
}

#[test]
fn test_division_by_zero_is_not_folded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let program = write_program(vec![], Expr::binary(BinOp::Div, Expr::int(7), Expr::int(0)));
    let (prog, rewrites) = optimize(&program);
    assert_eq!(rewrites, 0);
    assert!(matches!(
        prog.kind(written_value(&prog)),
        InstrKind::Binary {
            op: BinaryOp::Div,
            ..
        }
    ));
}

#[test]
fn test_no_reference_to_replaced_instructions() {
    let _ = env_logger::builder().is_test(true).try_init();
    for sample in samples::SAMPLES {
        let (prog, _) = optimize(&sample.program());

        let placed: Vec<InstrId> = prog.placed_instrs();
        let mut known: Vec<InstrId> = placed.clone();
        known.extend(prog.globals.iter().copied());
        for func in &prog.functions {
            known.extend(func.args.iter().copied());
            known.extend(func.allocs.iter().copied());
            known.push(func.address);
        }

        for &id in &placed {
            for operand in prog.kind(id).operands() {
                assert!(
                    known.contains(&operand),
                    "{}: {} reads {} which is no longer placed",
                    sample.name,
                    id,
                    operand
                );
            }
        }
    }
}

#[test]
fn test_peephole_keeps_sample_results() {
    let _ = env_logger::builder().is_test(true).try_init();
    for sample in samples::SAMPLES {
        let program = sample.program();
        let options = CompileOptions {
            inline: false,
            ..CompileOptions::default()
        };
        let compilation = Compiler::new(options).compile(&program).unwrap();
        let mut cpu = Cpu::new(&compilation.target);
        cpu.run().unwrap();
        assert_eq!(cpu.return_value(), sample.returns, "{}", sample.name);
        assert_eq!(cpu.output(), sample.writes, "{}", sample.name);
    }
}
