//! Inlining: call sites disappear, the pass reaches a fixed point, and programs compute the
//! same results with and without it.

use tinyc::core::CompilationSession;
use tinyc::ir::IrProgram;
use tinyc::opt::{Inliner, DEFAULT_SIZE_LIMIT};
use tinyc::t86::Cpu;
use tinyc::{lower, samples, CompileOptions, Compiler};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lowered(name: &str) -> IrProgram {
    let sample = samples::find(name).unwrap();
    lower(&sample.program(), &CompilationSession::new()).unwrap()
}

fn run(name: &str, options: CompileOptions) -> (i64, Vec<i64>) {
    let sample = samples::find(name).unwrap();
    let compilation = Compiler::new(options).compile(&sample.program()).unwrap();
    let mut cpu = Cpu::new(&compilation.target);
    cpu.run().unwrap();
    (cpu.return_value(), cpu.output().to_vec())
}

#[test]
fn test_inlining_removes_calls() {
    init_logger();
    for name in ["square_call", "pointer_swap"] {
        let session = CompilationSession::new();
        let mut prog = lowered(name);
        let before = prog.total_static_calls();
        assert!(before > 0, "{} has no calls", name);

        let inlined = Inliner::new(DEFAULT_SIZE_LIMIT, &session).run(&mut prog).unwrap();
        assert!(inlined > 0, "{}: nothing was inlined", name);
        assert!(prog.total_static_calls() < before, "{}", name);
        assert_eq!(session.stats().calls_inlined, inlined);
    }
}

#[test]
fn test_inlining_reaches_fixed_point() {
    init_logger();
    for sample in samples::SAMPLES {
        let session = CompilationSession::new();
        let mut prog = lower(&sample.program(), &session).unwrap();
        let inliner = Inliner::new(DEFAULT_SIZE_LIMIT, &session);
        inliner.run(&mut prog).unwrap();

        let settled = prog.clone();
        assert_eq!(inliner.run(&mut prog).unwrap(), 0, "{}", sample.name);
        assert_eq!(prog, settled, "{}", sample.name);
    }
}

#[test]
fn test_recursive_calls_stay() {
    init_logger();
    let session = CompilationSession::new();
    let mut prog = lowered("factorial");
    let fact = prog.function_by_name("fact").unwrap();
    let inliner = Inliner::new(DEFAULT_SIZE_LIMIT, &session);
    assert!(!inliner.inlineable(&prog, fact));

    inliner.run(&mut prog).unwrap();
    assert_eq!(prog.static_call_count(fact), 1);
}

#[test]
fn test_inlined_blocks_are_non_empty() {
    init_logger();
    for sample in samples::SAMPLES {
        let session = CompilationSession::new();
        let mut prog = lower(&sample.program(), &session).unwrap();
        Inliner::new(DEFAULT_SIZE_LIMIT, &session).run(&mut prog).unwrap();
        for func in &prog.functions {
            for &block in &func.blocks {
                assert!(
                    !prog.block(block).instrs.is_empty(),
                    "{}: {} in {} is empty after inlining",
                    sample.name,
                    block,
                    func.name
                );
            }
        }
    }
}

#[test]
fn test_inlining_preserves_results() {
    init_logger();
    for name in ["square_call", "pointer_swap", "switch_select", "factorial"] {
        let sample = samples::find(name).unwrap();
        let plain = run(name, CompileOptions::unoptimized());
        let inlined = run(
            name,
            CompileOptions {
                peephole: false,
                ..CompileOptions::default()
            },
        );
        let optimized = run(name, CompileOptions::default());

        assert_eq!(plain.0, sample.returns, "{} without inlining", name);
        assert_eq!(inlined, plain, "{} changed by inlining", name);
        assert_eq!(optimized, plain, "{} changed by optimization", name);
    }
}

#[test]
fn test_zero_size_limit_disables_inlining() {
    init_logger();
    let options = CompileOptions {
        inline_size_limit: 0,
        ..CompileOptions::default()
    };
    let compilation = Compiler::new(options)
        .compile(&samples::square_call())
        .unwrap();
    assert_eq!(compilation.optimization.inlined_calls, 0);
    assert_eq!(compilation.ir.total_static_calls(), 1);
}
