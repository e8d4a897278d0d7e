use clap::Parser;
use confluence::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
