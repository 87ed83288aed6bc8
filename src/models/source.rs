//! The two result sources being reconciled.

use serde::{Deserialize, Serialize};

/// Which dataset a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Authoritative source of identity (name, nickname, country).
    Primary,
    /// Source with display names only, linked onto primary identities.
    Secondary,
}

impl Source {
    /// Both sources, primary first.
    pub const ALL: [Source; 2] = [Source::Primary, Source::Secondary];

    /// Directory / config key for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Source::Primary),
            "secondary" => Ok(Source::Secondary),
            other => Err(format!("unknown source \"{}\"", other)),
        }
    }
}
