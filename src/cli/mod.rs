mod emit;
mod run;

use clap::{Parser, Subcommand, ValueEnum};
use sprig::Stage;

#[derive(Parser)]
#[command(name = "sprig", version, about = "Compiler and interpreter for the sprig language")]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a program.
    Run(run::RunArgs),
    /// Print the AST or IR of a program without executing it.
    Emit(emit::EmitArgs),
}

/// `--stage` values, mapped onto the library's lowering stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    None,
    Standard,
    Select,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::None => Stage::None,
            StageArg::Standard => Stage::Standard,
            StageArg::Select => Stage::Select,
        }
    }
}

pub fn dispatch(args: Args) -> i32 {
    match args.command {
        Command::Run(args) => run::run(args),
        Command::Emit(args) => emit::run(args),
    }
}

/// Report a compile or runtime error against the source it came from.
fn report(err: &sprig::Error, filename: &str, source: &str) {
    err.to_diagnostic().render(filename, source);
}
