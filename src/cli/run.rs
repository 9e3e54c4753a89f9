use std::path::PathBuf;

use super::StageArg;

#[derive(clap::Args)]
pub struct RunArgs {
    /// Source file to execute.
    pub file: PathBuf,

    /// Lowering stage to apply before execution.
    #[arg(long, value_enum, default_value_t = StageArg::None)]
    pub stage: StageArg,
}

pub fn run(args: RunArgs) -> i32 {
    let source = match sprig::load_source(&args.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {}: {}", args.file.display(), err);
            return 1;
        }
    };
    let filename = args.file.display().to_string();

    let mut stdout = std::io::stdout();
    match sprig::run_source(&source, args.stage.into(), &mut stdout) {
        Ok(()) => 0,
        Err(err) => {
            super::report(&err, &filename, &source);
            1
        }
    }
}
