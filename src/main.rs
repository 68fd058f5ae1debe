use clap::Parser;
use soltrade::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
