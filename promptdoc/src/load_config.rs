/// `load_config` module: resolves the run-wide [`RunConfig`] from an optional YAML
/// settings file plus command-line overrides, and reads API secrets from the environment.
///
/// # Precedence
/// 1. Command-line flags
/// 2. The YAML settings file (`--config`)
/// 3. Built-in defaults from [`RunConfig::default`]
///
/// Secrets never live in the settings file: `OPENAI_API_KEY` (required) and
/// `OPENAI_BASE_URL` (optional) are read from the environment, after `.env` has
/// been loaded by the binary.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use promptdoc_core::config::{OutputFormat, RunConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Static settings file. Every field is optional; absent fields keep their default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub concurrency: Option<usize>,
    pub toc_level: Option<usize>,
    pub optimize: Option<bool>,
    pub use_web_search: Option<bool>,
    pub format: Option<OutputFormat>,
    pub css: Option<PathBuf>,
}

/// Values taken from the command line. Boolean switches only ever turn a
/// setting on (`optimize`) or off (`no_web_search`).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub concurrency: Option<usize>,
    pub toc_level: Option<usize>,
    pub optimize: bool,
    pub no_web_search: bool,
    pub format: Option<OutputFormat>,
    pub css: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Secrets {
    pub api_key: String,
    pub base_url: Option<String>,
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading settings from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read settings file");
            return Err(anyhow::anyhow!(
                "Failed to read settings file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid "all defaults" settings file.
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(settings) => {
            info!(config_path = ?path_ref, "Parsed settings YAML successfully");
            Ok(settings)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse settings YAML");
            Err(anyhow::anyhow!("Failed to parse settings YAML: {e}"))
        }
    }
}

pub fn resolve_run_config(settings: Settings, overrides: &Overrides) -> RunConfig {
    let defaults = RunConfig::default();
    RunConfig {
        model: overrides
            .model
            .clone()
            .or(settings.model)
            .unwrap_or(defaults.model),
        max_output_tokens: overrides
            .max_output_tokens
            .or(settings.max_output_tokens)
            .unwrap_or(defaults.max_output_tokens),
        concurrency: overrides
            .concurrency
            .or(settings.concurrency)
            .unwrap_or(defaults.concurrency),
        use_web_search: !overrides.no_web_search
            && settings.use_web_search.unwrap_or(defaults.use_web_search),
        format: overrides
            .format
            .or(settings.format)
            .unwrap_or(defaults.format),
        toc_level: overrides
            .toc_level
            .or(settings.toc_level)
            .unwrap_or(defaults.toc_level),
        optimize: overrides.optimize || settings.optimize.unwrap_or(defaults.optimize),
        css: overrides.css.clone().or(settings.css),
    }
}

/// Loads the optional settings file and applies command-line overrides.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<RunConfig> {
    let settings = match path {
        Some(p) => load_settings(p)?,
        None => Settings::default(),
    };
    let config = resolve_run_config(settings, overrides);
    config.trace_loaded();
    Ok(config)
}

/// Reads the API credential and optional endpoint from the environment.
pub fn load_secrets() -> Result<Secrets> {
    let api_key = match env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            error!(env = API_KEY_ENV, "API key is not set");
            return Err(anyhow::anyhow!(
                "{API_KEY_ENV} is not set; export it or add it to a .env file"
            ));
        }
    };
    let base_url = env::var(BASE_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty());
    info!(custom_base_url = base_url.is_some(), "Loaded API credentials from environment");
    Ok(Secrets { api_key, base_url })
}
