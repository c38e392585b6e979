//! !~ATH command-line front end: runs a program file, or drops into a REPL
//! when no path is given. `--step` attaches a blocking stdin-driven step
//! hook; `--tui` is rejected outright since the terminal debugger it would
//! drive is out of scope here.

mod repl;
mod step;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use tracing::{error, info};

use untildeath_interp::Interpreter;

/// !~ATH interpreter.
#[derive(Parser)]
#[command(name = "untildeath", about = "!~ATH interpreter")]
struct Cli {
    /// Program file to run. Omit to start the REPL.
    path: Option<PathBuf>,

    /// Pause before every statement and wait for a step/continue/quit
    /// command on stdin.
    #[arg(long)]
    step: bool,

    /// Terminal debugger UI. Not supported in this build.
    #[arg(long)]
    tui: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build the untildeath runtime");

    let local = tokio::task::LocalSet::new();
    let exit_code = local.block_on(&runtime, async { run(cli).await });

    ExitCode::from(exit_code)
}

async fn run(cli: Cli) -> u8 {
    if cli.tui {
        eprintln!("Error: --tui is not supported in this build");
        return 1;
    }

    match cli.path {
        Some(path) => run_file(&path, cli.step).await,
        None => {
            println!("!~ATH REPL. Ctrl-D to exit.");
            repl::run_repl(cli.step).await
        }
    }
}

async fn run_file(path: &PathBuf, step: bool) -> u8 {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot read {}: {e}", path.display());
            eprintln!("Error: cannot read {}: {e}", path.display());
            return 1;
        }
    };

    let program = match untildeath_core::parse(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let interpreter = Interpreter::new(Some(path.clone()), Vec::new());
    if step {
        interpreter.set_step_hook(Rc::new(step::StdinStepHook::new()));
    }

    info!(path = %path.display(), "running program");

    match interpreter.run(&program).await {
        Ok(()) => 0,
        Err(untildeath_interp::EvalSignal::Control(untildeath_interp::ControlFlow::DebuggerQuit)) => 130,
        Err(untildeath_interp::EvalSignal::Control(_)) => 0,
        Err(untildeath_interp::EvalSignal::Error(e)) => {
            eprintln!("{e}");
            1
        }
    }
}
