use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::sink::{BackendKind, SinkDescriptor};

/// Where frames come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Canon EOS live view over EDSDK.
    Canon,
    /// Synthetic moving gradient.
    #[default]
    TestPattern,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canon => "canon",
            Self::TestPattern => "test-pattern",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "canon" => Ok(Self::Canon),
            "test-pattern" => Ok(Self::TestPattern),
            _ => Err(format!("unknown source '{s}' (expected canon or test-pattern)")),
        }
    }
}

/// Settings file structure. Every field is optional; an explicit `sinks`
/// list takes precedence over the `preview`/`virtualOutput` switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SettingsFile {
    pub source: Option<SourceKind>,
    pub capture_timeout_ms: Option<u64>,
    pub preview: Option<bool>,
    pub virtual_output: Option<bool>,
    pub backend: Option<BackendKind>,
    pub device: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub title: Option<String>,
    pub sinks: Vec<SinkDescriptor>,
}

impl SettingsFile {
    /// Load settings from a JSON file. A missing file is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }
}
