//! TOML configuration file loading
//!
//! Supports `~/.config/chat-dispatch/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.
//!
//! ```toml
//! prefix = ["!", "/"]
//! case_sensitive = false
//!
//! [session]
//! auth_dir = "auth_info"
//!
//! [store]
//! path = "bot_store.json"
//! flush_interval_secs = 10
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::commands::PrefixSetting;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DispatchConfigFile {
    /// Command prefix: a string or a list of strings
    #[serde(default)]
    pub prefix: Option<PrefixSetting>,

    /// Match command names case-sensitively
    #[serde(default)]
    pub case_sensitive: Option<bool>,

    /// Transport session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Store persistence configuration
    #[serde(default)]
    pub store: StoreFileConfig,
}

/// Transport session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Directory holding the transport's authentication state
    pub auth_dir: Option<String>,
}

/// Store persistence configuration
#[derive(Debug, Default, Deserialize)]
pub struct StoreFileConfig {
    /// Store file path
    pub path: Option<String>,

    /// Seconds between flushes
    pub flush_interval_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `DispatchConfigFile::default()` if the file doesn't exist or
/// can't be parsed.
pub fn load_config_file() -> DispatchConfigFile {
    config_file_path().map_or_else(DispatchConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> DispatchConfigFile {
    if !path.exists() {
        return DispatchConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DispatchConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DispatchConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chat-dispatch/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chat-dispatch").join("config.toml"))
}
