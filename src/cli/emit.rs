use std::path::PathBuf;

use super::StageArg;

#[derive(clap::Args)]
pub struct EmitArgs {
    /// Source file to compile.
    pub file: PathBuf,

    /// Lowering stage to apply before printing.
    #[arg(long, value_enum, default_value_t = StageArg::None)]
    pub stage: StageArg,

    /// Print the AST instead of the IR.
    #[arg(long)]
    pub ast: bool,
}

pub fn run(args: EmitArgs) -> i32 {
    let source = match sprig::load_source(&args.file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {}: {}", args.file.display(), err);
            return 1;
        }
    };
    let filename = args.file.display().to_string();

    match emit(&source, &args) {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(err) => {
            super::report(&err, &filename, &source);
            1
        }
    }
}

fn emit(source: &str, args: &EmitArgs) -> sprig::Result<String> {
    if args.ast {
        let ast = sprig::parse(source)?;
        return Ok(format!("{:#?}\n", ast));
    }
    let mut module = sprig::compile(source)?;
    sprig::lower(&mut module, args.stage.into())?;
    Ok(module.to_string())
}
