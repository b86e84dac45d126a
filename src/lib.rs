pub mod ast;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod token;

use config::Settings;
use error::EvalResult;
use interpreter::Interpreter;
use model::AchievementScriptContext;

/// Parses and runs `source` with default settings.
pub fn compile(source: &str) -> EvalResult<AchievementScriptContext> {
    compile_with_settings(source, Settings::default())
}

pub fn compile_with_settings(source: &str, settings: Settings) -> EvalResult<AchievementScriptContext> {
    let program = parser::parse(source)?;
    let mut context = Interpreter::with_settings(settings).run(&program)?;
    context.read_header(source);
    Ok(context)
}
