//! Configuration management for the dispatch core

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::{normalize_prefix, PrefixSetting};
use crate::{Error, Result};

/// Default directory for the transport's authentication state
pub const DEFAULT_AUTH_DIR: &str = "auth_info";

/// Default store file
pub const DEFAULT_STORE_PATH: &str = "bot_store.json";

/// Default time between store flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Command prefixes, tried in order; empty means no prefixed commands
    pub prefix: Vec<String>,

    /// Directory holding the transport's authentication state
    pub auth_dir: PathBuf,

    /// Store file, always ending in `.json`
    pub store_path: PathBuf,

    /// Time between periodic store flushes
    pub flush_interval: Duration,

    /// Match command names case-sensitively
    pub case_sensitive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: Vec::new(),
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            case_sensitive: false,
        }
    }
}

/// Append `.json` unless the path already ends with it
#[must_use]
pub fn normalize_store_path(path: PathBuf) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "json") {
        path
    } else {
        let mut raw = path.into_os_string();
        raw.push(".json");
        PathBuf::from(raw)
    }
}

impl Config {
    /// Load configuration from environment variables and the config file
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable holds an invalid value
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`], reading the TOML overlay from `path`
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable holds an invalid value
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::from_sources(file::load_config_file_from(path), |key| {
            std::env::var(key).ok()
        })
    }

    /// Merge sources with precedence env > toml > default
    fn from_sources(
        fc: file::DispatchConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let prefix = env("DISPATCH_PREFIX")
            .map(|raw| {
                if raw.trim().is_empty() {
                    PrefixSetting::Many(Vec::new())
                } else {
                    PrefixSetting::Many(raw.split(',').map(|p| p.trim().to_string()).collect())
                }
            })
            .or(fc.prefix);

        let auth_dir = env("DISPATCH_AUTH_DIR")
            .or(fc.session.auth_dir)
            .unwrap_or_else(|| DEFAULT_AUTH_DIR.to_string());

        let store_path = env("DISPATCH_STORE_PATH")
            .or(fc.store.path)
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());

        let flush_interval = match env("DISPATCH_FLUSH_INTERVAL_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("DISPATCH_FLUSH_INTERVAL_SECS={raw:?}: {e}"))
            })?),
            None => fc.store.flush_interval_secs,
        }
        .map_or(DEFAULT_FLUSH_INTERVAL, Duration::from_secs);

        let case_sensitive = env("DISPATCH_CASE_SENSITIVE")
            .map(|v| v == "true" || v == "1")
            .or(fc.case_sensitive)
            .unwrap_or(false);

        Ok(Self {
            prefix: normalize_prefix(prefix),
            auth_dir: PathBuf::from(auth_dir),
            store_path: normalize_store_path(PathBuf::from(store_path)),
            flush_interval,
            case_sensitive,
        })
    }

    /// Check the configuration before starting the bot
    ///
    /// # Errors
    ///
    /// Returns error if a prefix is empty or the flush interval is zero
    pub fn validate(&self) -> Result<()> {
        if self.prefix.iter().any(String::is_empty) {
            return Err(Error::Config("prefix entries must not be empty".to_string()));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::Config(
                "store flush interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
