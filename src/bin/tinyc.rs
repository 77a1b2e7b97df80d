//! tinyc command line driver.
//!
//! Compiles one of the built-in sample programs and prints its IR, its t86 listing, or the
//! result of running it on the reference CPU.

use clap::{Parser, ValueEnum};
use std::process::ExitCode;

use tinyc::driver::DEFAULT_REGISTER_COUNT;
use tinyc::opt::DEFAULT_SIZE_LIMIT;
use tinyc::samples;
use tinyc::t86::Cpu;
use tinyc::{CompileOptions, Compiler};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Optimized IR with assigned storage
    Ir,
    /// t86 listing
    Asm,
    /// Run on the reference CPU
    Run,
}

#[derive(Parser)]
#[command(name = "tinyc")]
#[command(version)]
#[command(about = "tinyc - compile checked C-like programs to t86", long_about = None)]
struct Cli {
    /// Sample program to compile
    #[arg(long, value_name = "NAME", required_unless_present = "list")]
    sample: Option<String>,

    /// List the built-in samples and exit
    #[arg(long)]
    list: bool,

    /// Allocatable general purpose registers
    #[arg(long, default_value_t = DEFAULT_REGISTER_COUNT)]
    regs: usize,

    /// Disable the peephole rewriter
    #[arg(long)]
    no_peephole: bool,

    /// Disable inlining
    #[arg(long)]
    no_inline: bool,

    /// Largest callee, in IR instructions, that may be inlined
    #[arg(long, default_value_t = DEFAULT_SIZE_LIMIT)]
    inline_limit: usize,

    /// What to print
    #[arg(long, value_enum, default_value_t = Emit::Run)]
    emit: Emit,

    /// Print session statistics after compiling
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list {
        for sample in samples::SAMPLES {
            println!("{:<14} {}", sample.name, sample.description);
        }
        return ExitCode::SUCCESS;
    }

    let Some(name) = cli.sample.as_deref() else {
        eprintln!("error: no sample given");
        return ExitCode::FAILURE;
    };
    let Some(sample) = samples::find(name) else {
        let known: Vec<_> = samples::names().collect();
        eprintln!("error: unknown sample '{}' (known: {})", name, known.join(", "));
        return ExitCode::FAILURE;
    };

    let options = CompileOptions {
        register_count: cli.regs,
        peephole: !cli.no_peephole,
        inline: !cli.no_inline,
        inline_size_limit: cli.inline_limit,
    };
    let compilation = match Compiler::new(options).compile(&sample.program()) {
        Ok(compilation) => compilation,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.emit {
        Emit::Ir => print!("{}", compilation.ir),
        Emit::Asm => print!("{}", compilation.target),
        Emit::Run => {
            let mut cpu = Cpu::new(&compilation.target);
            if let Err(e) = cpu.run() {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
            for value in cpu.output() {
                println!("{}", value);
            }
            println!("returned {} after {} ticks", cpu.return_value(), cpu.ticks());
        }
    }

    if cli.stats {
        eprint!("{}", compilation.stats);
    }
    ExitCode::SUCCESS
}
