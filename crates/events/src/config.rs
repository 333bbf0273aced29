use serde::Deserialize;

/// `notifications` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Endpoint receiving status updates. Without one, updates are
    /// only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Prefix of the event type / routing key, e.g. `request.status.end`.
    #[serde(default = "default_prefix")]
    pub routing_key_prefix: String,
    /// Log updates instead of delivering them.
    #[serde(default)]
    pub suppress: bool,
    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_prefix() -> String {
    "request.status".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            routing_key_prefix: default_prefix(),
            suppress: false,
            timeout_secs: default_timeout(),
        }
    }
}

impl NotificationConfig {
    /// Whether updates leave the process at all.
    pub fn delivers(&self) -> bool {
        !self.suppress && self.webhook_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: NotificationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.routing_key_prefix, "request.status");
        assert_eq!(config.timeout_secs, 10);
        assert!(!config.delivers());
    }

    #[test]
    fn suppress_wins_over_url() {
        let config = NotificationConfig {
            webhook_url: Some("http://hooks.local/status".into()),
            suppress: true,
            ..Default::default()
        };
        assert!(!config.delivers());
    }
}
