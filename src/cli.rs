pub mod output;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::builder::Trigger;
use crate::error::ErrorExpression;
use crate::{compile_with_settings, config};

use output::{ErrorReport, ScriptReport};

#[derive(Parser)]
#[command(name = "rascript")]
#[command(about = "Compiles achievement scripts into trigger definitions")]
#[command(version)]
pub struct Cli {
    /// Path to config file (overrides RASCRIPT_CONFIG env var and default location)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a script and print its achievements, leaderboards and rich presence
    Build {
        /// Script to compile
        file: PathBuf,
    },

    /// Compile a script and report errors only
    Check {
        /// Script to compile
        file: PathBuf,
    },

    /// List the conditions of a serialized trigger
    Decode {
        /// Trigger definition, e.g. `0xH001234=5_R:0xH001235=1`
        definition: String,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_error(path: &Path, error: &ErrorExpression, json: bool) -> Result<ExitCode> {
    if json {
        print_json(&ErrorReport::from(error))?;
    } else {
        eprintln!(
            "{}:{}:{}: {}",
            path.display(),
            error.span.line,
            error.span.column,
            error.message
        );
        if let Some(cause) = &error.cause {
            eprintln!("  in: {cause}");
        }
    }
    Ok(ExitCode::FAILURE)
}

fn compile_file(cli: &Cli, path: &Path, print_output: bool) -> Result<ExitCode> {
    let settings = config::load(cli.config.as_deref())?;
    let source =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;

    let context = match compile_with_settings(&source, settings) {
        Ok(context) => context,
        Err(error) => return report_error(path, &error, cli.json),
    };
    log::info!(
        "compiled {}: {} achievements, {} leaderboards",
        path.display(),
        context.achievements.len(),
        context.leaderboards.len()
    );

    if print_output {
        if cli.json {
            print_json(&ScriptReport::from(&context))?;
        } else {
            print!("{}", output::render_text(&context));
        }
    } else if cli.json {
        print_json(&serde_json::json!({ "ok": true }))?;
    } else {
        println!("{}: ok", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn decode(cli: &Cli, definition: &str) -> Result<ExitCode> {
    let trigger: Trigger = definition
        .parse()
        .with_context(|| format!("Decoding {definition:?}"))?;
    if cli.json {
        print_json(&output::condition_reports(&trigger))?;
    } else {
        print!("{}", output::render_conditions(&trigger));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Build { file } => compile_file(&cli, file, true),
        Commands::Check { file } => compile_file(&cli, file, false),
        Commands::Decode { definition } => decode(&cli, definition),
    }
}
