//! Engine processing options.
//!
//! NodeODM takes options as a JSON array of `{"name", "value"}` pairs in
//! the `options` multipart field of `POST /task/new`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Feature-extraction / point-cloud quality preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Lowest => "lowest",
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Ultra => "ultra",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowest" => Ok(Quality::Lowest),
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "ultra" => Ok(Quality::Ultra),
            other => Err(format!("unknown quality '{other}'")),
        }
    }
}

/// A single engine option as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineOption {
    pub name: &'static str,
    pub value: serde_json::Value,
}

/// Processing options for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOptions {
    pub quality: Quality,
    /// Produce a digital surface model.
    pub dsm: bool,
    /// Produce a digital terrain model.
    pub dtm: bool,
    /// Target orthophoto resolution in cm/pixel.
    pub orthophoto_resolution: Option<u32>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            dsm: true,
            dtm: false,
            orthophoto_resolution: None,
        }
    }
}

impl ProcessingOptions {
    /// Convert to the engine's `{name, value}` list.
    pub fn to_engine_options(&self) -> Vec<EngineOption> {
        let mut options = vec![
            EngineOption {
                name: "feature-quality",
                value: self.quality.as_str().into(),
            },
            EngineOption {
                name: "pc-quality",
                value: self.quality.as_str().into(),
            },
            EngineOption {
                name: "dsm",
                value: self.dsm.into(),
            },
            EngineOption {
                name: "dtm",
                value: self.dtm.into(),
            },
        ];
        if let Some(resolution) = self.orthophoto_resolution {
            options.push(EngineOption {
                name: "orthophoto-resolution",
                value: resolution.into(),
            });
        }
        options
    }

    /// JSON string for the `options` form field.
    pub fn to_form_value(&self) -> String {
        serde_json::to_string(&self.to_engine_options())
            .expect("engine options are always serialisable")
    }
}
