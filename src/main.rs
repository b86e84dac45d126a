use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use rascript::cli::{self, Cli};

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    cli::run(cli)
}
