use std::path::PathBuf;

use serde::Deserialize;

use crate::diagnostics::Verbosity;
use crate::error::ConfigError;
use crate::event::{Event, EventKind};
use crate::matcher::DEFAULT_STDOUT_METHOD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub matcher: MatcherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Method the harness prints through; drives the positional carve-outs.
    pub stdout_method: String,
    /// Extra patterns loaded into every script's ignore set.
    pub ignore: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub verbosity: Verbosity,
    pub file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig {
                stdout_method: DEFAULT_STDOUT_METHOD.to_string(),
                ignore: Vec::new(),
            },
            logging: LoggingConfig {
                verbosity: Verbosity::Quiet,
                file: None,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    matcher: PartialMatcherConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialMatcherConfig {
    #[serde(default)]
    stdout_method: String,
    #[serde(default)]
    ignore: Vec<PartialPattern>,
}

#[derive(Debug, Deserialize)]
struct PartialPattern {
    kind: String,
    #[serde(default)]
    arg1: String,
    #[serde(default)]
    arg2: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    verbosity: String,
    #[serde(default)]
    file: String,
}

const CONFIG_DIR: &str = "tracecheck";
const CONFIG_FILE: &str = "config.yaml";

/// Load config with precedence defaults < config file. An explicit path must
/// be readable; the per-user file is optional.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let explicit = config_file.map(str::trim).filter(|path| !path.is_empty());
    let (path, required) = match explicit {
        Some(raw) => (resolve_path(raw)?, true),
        None => match user_config_file() {
            Some(path) => (path, false),
            None => return Ok((Config::default(), None)),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => Ok((parse_config(&text)?, Some(path))),
        Err(source) if required => Err(ConfigError::Read { path, source }),
        Err(_) => Ok((Config::default(), None)),
    }
}

/// Parse YAML config text on top of the defaults.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let partial: Option<PartialConfig> = serde_yaml::from_str(text)?;
    let mut cfg = Config::default();
    if let Some(partial) = partial {
        apply_partial(&mut cfg, partial)?;
    }
    Ok(cfg)
}

fn env_dir(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// `$XDG_CONFIG_HOME/tracecheck/config.yaml`, else under `~/.config`.
fn user_config_file() -> Option<PathBuf> {
    let base = env_dir("XDG_CONFIG_HOME")
        .or_else(|| env_dir("HOME").map(|home| home.join(".config")))?;
    Some(base.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Resolve `~` and `~/...` against HOME; other paths are taken as given.
fn resolve_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let rest = match raw.strip_prefix('~') {
        Some("") => "",
        Some(rest) => match rest.strip_prefix('/') {
            Some(rest) => rest,
            None => return Ok(PathBuf::from(raw)),
        },
        None => return Ok(PathBuf::from(raw)),
    };
    let home = env_dir("HOME").ok_or(ConfigError::Home)?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) -> Result<(), ConfigError> {
    if !partial.matcher.stdout_method.trim().is_empty() {
        cfg.matcher.stdout_method = partial.matcher.stdout_method.trim().to_string();
    }
    for pattern in partial.matcher.ignore {
        let kind = EventKind::from_label(pattern.kind.trim())
            .ok_or_else(|| ConfigError::UnknownEventKind(pattern.kind.clone()))?;
        cfg.matcher
            .ignore
            .push(Event::with_args(kind, pattern.arg1, pattern.arg2));
    }
    if !partial.logging.verbosity.trim().is_empty() {
        cfg.logging.verbosity = Verbosity::parse(&partial.logging.verbosity)
            .ok_or_else(|| ConfigError::UnknownVerbosity(partial.logging.verbosity.clone()))?;
    }
    if !partial.logging.file.trim().is_empty() {
        cfg.logging.file = Some(resolve_path(partial.logging.file.trim())?);
    }
    Ok(())
}
