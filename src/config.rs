use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "RASCRIPT_CONFIG";

/// Largest accepted `max_call_depth`. The interpreter thread reserves stack
/// in proportion to it.
pub const MAX_CALL_DEPTH_LIMIT: usize = 256;

/// Compiler settings read from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Deepest chain of nested user function calls before evaluation fails.
    pub max_call_depth: usize,
    /// Badge assigned to achievements that do not name one.
    pub default_badge: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            default_badge: "0".to_string(),
        }
    }
}

pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|dir| dir.join("rascript").join("config.json"))
}

/// Loads settings from `path`, or from the default location when `None`.
/// A missing file at the default location yields the defaults; a missing
/// explicit file is an error.
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match get_config_path() {
            Some(path) => (path, false),
            None => return Ok(Settings::default()),
        },
    };

    if !path.exists() {
        if explicit {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse(content: &str) -> Result<Settings> {
    let settings: Settings = serde_json::from_str(content)?;
    if settings.max_call_depth == 0 {
        return Err(anyhow!("max_call_depth must be at least 1"));
    }
    if settings.max_call_depth > MAX_CALL_DEPTH_LIMIT {
        return Err(anyhow!(
            "max_call_depth must be at most {MAX_CALL_DEPTH_LIMIT}, got {}",
            settings.max_call_depth
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let settings = parse(r#"{ "max_call_depth": 12 }"#).unwrap();
        assert_eq!(settings.max_call_depth, 12);
        assert_eq!(settings.default_badge, "0");
    }

    #[test]
    fn rejects_unknown_fields_and_out_of_range_depth() {
        assert!(parse(r#"{ "max_depth": 12 }"#).is_err());
        assert!(parse(r#"{ "max_call_depth": 0 }"#).is_err());
        let error = parse(r#"{ "max_call_depth": 100000 }"#).unwrap_err();
        assert_eq!(error.to_string(), "max_call_depth must be at most 256, got 100000");
        assert_eq!(parse(r#"{ "max_call_depth": 256 }"#).unwrap().max_call_depth, 256);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let error = load(Some(Path::new("/nonexistent/rascript.json"))).unwrap_err();
        assert!(error.to_string().contains("config file not found"));
    }
}
