//! Tracing subscriber setup.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
}

impl LogLevel {
    /// Filter directive for the workspace crates.
    pub fn directive(self) -> String {
        let level = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
        };
        format!("warn,odm_tool={level},odm_core={level},odm_nodeodm={level},odm_registry={level},odm_events={level},odm_ckan={level},odm_pipeline={level}")
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Output is human-readable on
/// a terminal and JSON lines otherwise.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.directive().into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::io::stderr().is_terminal() {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_warn() {
        let directive = LogLevel::Warning.directive();
        assert!(directive.contains("odm_pipeline=warn"));
        assert!(directive.parse::<EnvFilter>().is_ok());
    }
}
