//! Ivy CLI: compiles a single source file and runs it on the bytecode VM.

use std::fs;
use std::process;

use clap::Parser as ClapParser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ivy_runtime::{StdinSource, StdoutSink};

#[derive(ClapParser)]
#[command(name = "ivy")]
#[command(about = "Ivy toolchain - compile and run Ivy programs", long_about = None)]
struct Cli {
    /// Input .ivy source file
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read {}: {e}", cli.input.display());
            process::exit(1);
        }
    };

    let mut output = StdoutSink;
    let mut input = StdinSource;
    if let Err(e) = ivy_compiler::compile_and_run(&source, &mut output, &mut input) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
