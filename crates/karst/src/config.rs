//! # Startup Configuration
//!
//! Engine settings are loaded once at startup from TOML. Every field has a
//! default, so an empty file (or no file) yields a working configuration.
//!
//! ```toml
//! [resources]
//! target_state = "preloaded"
//! strict_loading = false
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use karst_core::ResourceState;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Readiness level bulk loads drive resources toward.
///
/// `Created` is not an option on purpose: it is where resources start, not
/// somewhere to drive them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Stop once dependencies are resolved.
    Bound,
    /// Stop once bulk data is loaded.
    Preloaded,
    /// Go all the way to live objects.
    #[default]
    Realized,
}

impl From<TargetState> for ResourceState {
    fn from(state: TargetState) -> Self {
        match state {
            TargetState::Bound => Self::Bound,
            TargetState::Preloaded => Self::Preloaded,
            TargetState::Realized => Self::Realized,
        }
    }
}

/// Resource manager settings.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Readiness level for bulk loads and freshly created resources.
    pub target_state: TargetState,
    /// Abort bulk loads on the first failing resource instead of logging
    /// each failure and continuing.
    pub strict_loading: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            target_state: TargetState::Realized,
            strict_loading: true,
        }
    }
}

/// Engine settings loaded once at startup.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resource manager settings.
    pub resources: ResourcesConfig,
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] when the text is not valid TOML for this
    /// schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] when the file cannot be read,
    /// [`ConfigError::Parse`] when its contents do not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}
