//! Deployer configuration.
//!
//! User-wide settings live in a TOML file, by default `~/.soldeploy/config.toml`
//! (`%LOCALAPPDATA%\soldeploy\config.toml` on Windows). The location can be
//! overridden with `--config` or the `SOLDEPLOY_CONFIG` environment variable.
//! The file may hold an access token and should not be committed anywhere.
//!
//! ```toml
//! portal_url = "https://www.example.com/portal"
//! username = "deployer"
//! token = "..."            # or SOLDEPLOY_TOKEN
//! folder = "solutions"
//! on_item_failure = "abort" # or "continue"
//! request_timeout_secs = 60
//!
//! [global_settings.organization.helperServices.geometry]
//! url = "https://utility.example.com/Geometry/GeometryServer"
//! ```
//!
//! A missing file yields the defaults; a file that does not parse is a
//! [`SolutionError::Config`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECS, TOKEN_ENV_VAR};
use crate::core::{Result, SolutionError};
use crate::deployer::FailurePolicy;

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn is_default_request_timeout(secs: &u64) -> bool {
    *secs == DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Settings for talking to the destination portal and running deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Portal root url, e.g. `https://www.example.com/portal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_url: Option<String>,

    /// Account that owns the deployed items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Access token. `SOLDEPLOY_TOKEN` is used when this is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Destination folder for created items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// What to do with the rest of the bundle when an item fails.
    #[serde(default)]
    pub on_item_failure: FailurePolicy,

    /// Timeout of a single backend request.
    #[serde(
        default = "default_request_timeout_secs",
        skip_serializing_if = "is_default_request_timeout"
    )]
    pub request_timeout_secs: u64,

    /// Values for literal placeholder paths such as
    /// `{{organization.helperServices.geometry.url}}`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub global_settings: Value,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            portal_url: None,
            username: None,
            token: None,
            folder: None,
            on_item_failure: FailurePolicy::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            global_settings: Value::Null,
        }
    }
}

impl DeployConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults. The token falls back to
    /// `SOLDEPLOY_TOKEN` when the file does not set one.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        let config = if path.exists() {
            Self::load_from(&path).await?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        Ok(config.with_fallback_token(std::env::var(TOKEN_ENV_VAR).ok()))
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| SolutionError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| SolutionError::Config {
            message: format!("Failed to parse {}: {e}", path.display()),
        })
    }

    /// Save configuration to a specific file, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| SolutionError::Config {
            message: format!("Failed to serialize configuration: {e}"),
        })?;
        fs::write(path, content).await?;

        // Owner read/write only: the file may hold a token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path).await?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await?;
        }
        Ok(())
    }

    /// Platform specific default location of the configuration file.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| SolutionError::Config {
                    message: "Unable to determine local data directory".to_string(),
                })?
                .join("soldeploy")
        } else {
            dirs::home_dir()
                .ok_or_else(|| SolutionError::Config {
                    message: "Unable to determine home directory".to_string(),
                })?
                .join(".soldeploy")
        };
        Ok(config_dir.join("config.toml"))
    }

    /// Use `token` when the configuration does not carry one.
    #[must_use]
    pub fn with_fallback_token(mut self, token: Option<String>) -> Self {
        if self.token.is_none() {
            self.token = token.filter(|t| !t.is_empty());
        }
        self
    }

    /// Timeout of a single backend request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Portal url, or a configuration error naming the missing key.
    pub fn require_portal_url(&self) -> Result<&str> {
        require(self.portal_url.as_deref(), "portal_url")
    }

    /// Username, or a configuration error naming the missing key.
    pub fn require_username(&self) -> Result<&str> {
        require(self.username.as_deref(), "username")
    }
}

fn require<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| SolutionError::Config {
        message: format!("'{key}' is not set"),
    })
}
