use clap::Parser;

mod cli;

fn main() {
    let args = cli::Args::parse();
    let code = cli::dispatch(args);
    if code != 0 {
        std::process::exit(code);
    }
}
