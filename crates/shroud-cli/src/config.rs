//! Configuration file for the Shroud CLI.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shroud_core::SessionConfig;
use shroud_crypto::Secret;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Shroud configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Session parameters
    #[serde(default)]
    pub session: SessionConfig,
    /// Pre-shared secret location
    #[serde(default)]
    pub secret: SecretConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pre-shared secret, inline or in a file (64 hex characters either way)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretConfig {
    /// Hex-encoded secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// File holding the hex-encoded secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SecretConfig {
    /// Load the configured secret.
    ///
    /// # Errors
    ///
    /// Returns an error if no secret (or both forms) is configured, the key
    /// file cannot be read or the key is not 32 hex-encoded bytes.
    pub fn load(&self) -> anyhow::Result<Secret> {
        let encoded = match (&self.key, &self.key_file) {
            (Some(key), None) => Zeroizing::new(key.clone()),
            (None, Some(path)) => Zeroizing::new(
                fs::read_to_string(path)
                    .with_context(|| format!("reading key file {}", path.display()))?,
            ),
            (Some(_), Some(_)) => anyhow::bail!("secret: set either key or key_file, not both"),
            (None, None) => anyhow::bail!("no secret configured (set [secret] key or key_file)"),
        };
        Ok(Secret::from_hex(&encoded)?)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.as_ref().display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("shroud/config.toml")
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.secret.key.is_some() && self.secret.key_file.is_some() {
            anyhow::bail!("secret: set either key or key_file, not both");
        }

        Ok(())
    }
}
