use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format for CLI responses
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Whether `up` should copy repository-declared `path` entries into the
/// user configuration file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlePath {
    /// Merge without asking.
    Yes,
    /// Prompt before merging.
    Ask,
    #[default]
    No,
}

impl HandlePath {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Yes | Self::Ask)
    }
}

/// Direction of an `up`/`down` invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpDirection {
    Up,
    Down,
}

impl UpDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for UpDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
