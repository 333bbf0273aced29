use std::time::Duration;

use serde::Deserialize;

use crate::options::Quality;

/// Connection and polling settings for a NodeODM node.
///
/// Deserialized from the `nodeodm` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeOdmConfig {
    pub host: String,
    pub port: u16,
    /// Access token appended to every request as `?token=`.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub quality: Quality,
    /// Upper bound on result downloads/uploads running at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Seconds between two status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Failed status polls tolerated before monitoring gives up.
    #[serde(default = "default_poll_retries")]
    pub poll_retries: u32,
    /// Cancel remote tasks when the tool is interrupted.
    #[serde(default)]
    pub cancel_on_shutdown: bool,
}

fn default_max_concurrent_tasks() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    30
}

fn default_poll_retries() -> u32 {
    5
}

impl NodeOdmConfig {
    /// Base HTTP URL, e.g. `http://nodeodm:3000`.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}
