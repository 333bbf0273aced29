//! Configuration file loading.
//!
//! The YAML file has one section per external system:
//!
//! ```yaml
//! nodeodm:
//!   host: nodeodm
//!   port: 3000
//!   quality: medium
//! ckan:
//!   url: https://datalake.example.org
//!   ...
//! notifications:
//!   webhook_url: https://hooks.example.org/odm
//! ```
//!
//! Secrets can be left out of the file and supplied through the
//! environment instead.
//!
//! | Env Var                   | Overrides                       |
//! |---------------------------|---------------------------------|
//! | `NODEODM_TOKEN`           | `nodeodm.token`                 |
//! | `CKAN_AUTH_PASSWORD`      | `ckan.auth.password`            |
//! | `CKAN_AUTH_CLIENT_SECRET` | `ckan.auth.client_secret`       |
//! | `NOTIFY_WEBHOOK_URL`      | `notifications.webhook_url`     |
//! | `SUPPRESS_NOTIFICATIONS`  | `notifications.suppress`        |

use std::path::{Path, PathBuf};

use odm_ckan::CkanConfig;
use odm_events::NotificationConfig;
use odm_nodeodm::NodeOdmConfig;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file '{}': {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

/// Complete tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub nodeodm: NodeOdmConfig,
    pub ckan: CkanConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Settings {
    /// Read `path` and apply the process environment on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_yaml(&raw, path)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    fn from_yaml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides; `lookup` returns the value of a variable if set.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(token) = lookup("NODEODM_TOKEN") {
            self.nodeodm.token = token;
        }
        if let Some(password) = lookup("CKAN_AUTH_PASSWORD") {
            self.ckan.auth.password = password;
        }
        if let Some(secret) = lookup("CKAN_AUTH_CLIENT_SECRET") {
            self.ckan.auth.client_secret = secret;
        }
        if let Some(url) = lookup("NOTIFY_WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            self.notifications.webhook_url = Some(url);
        }
        if let Some(value) = lookup("SUPPRESS_NOTIFICATIONS") {
            self.notifications.suppress = parse_flag(&value).ok_or(ConfigError::InvalidEnv {
                name: "SUPPRESS_NOTIFICATIONS",
                value,
            })?;
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
