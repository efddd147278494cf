//! Proctor configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::engine::AttemptConfig;

/// Top-level proctor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Directory holding TOML test definitions.
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
    /// Directory graded results are written to.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    /// Candidate id used when none is given on the command line.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Countdown tick spacing in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Warn once when this many seconds remain; 0 disables the warning.
    #[serde(default = "default_low_time_warning")]
    pub low_time_warning_secs: u64,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("./tests")
}
fn default_reports_dir() -> PathBuf {
    PathBuf::from("./proctor-results")
}
fn default_user_id() -> String {
    "candidate".to_string()
}
fn default_tick_interval() -> u64 {
    1000
}
fn default_low_time_warning() -> u64 {
    300
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            reports_dir: default_reports_dir(),
            user_id: default_user_id(),
            tick_interval_ms: default_tick_interval(),
            low_time_warning_secs: default_low_time_warning(),
        }
    }
}

impl ProctorConfig {
    /// Countdown settings for attempts started with this configuration.
    pub fn attempt_config(&self) -> AttemptConfig {
        AttemptConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            low_time_warning_secs: (self.low_time_warning_secs > 0)
                .then_some(self.low_time_warning_secs),
        }
    }

    /// Apply `PROCTOR_*` overrides and resolve `${VAR}` references in paths.
    fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("PROCTOR_USER") {
            self.user_id = user;
        }
        if let Some(dir) = lookup("PROCTOR_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("PROCTOR_DEFINITIONS_DIR") {
            self.definitions_dir = PathBuf::from(dir);
        }

        self.reports_dir = resolve_path(&self.reports_dir, &lookup);
        self.definitions_dir = resolve_path(&self.definitions_dir, &lookup);
        self
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
/// Unset variables resolve to the empty string.
fn resolve_env_vars<F>(s: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = lookup(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

fn resolve_path<F>(path: &Path, lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match path.to_str() {
        Some(s) if s.contains("${") => PathBuf::from(resolve_env_vars(s, lookup)),
        _ => path.to_path_buf(),
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable overrides: `PROCTOR_USER`, `PROCTOR_REPORTS_DIR`,
/// `PROCTOR_DEFINITIONS_DIR`.
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("proctor.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            parse_config(&path)?
        }
        None => ProctorConfig::default(),
    };

    Ok(config.apply_env(process_env))
}

fn parse_config(path: &Path) -> Result<ProctorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<ProctorConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}
