//! Competitor pseudo-identifiers and load fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder for a missing display name.
pub const NAMELESS: &str = "Nameless";

/// Placeholder for a missing or hidden nickname.
pub const NICKLESS: &str = "Nickless";

/// Placeholder for a missing country.
pub const NATIONLESS: &str = "Nationless";

/// A synthesized competitor identifier built from mutable descriptive fields.
///
/// Not guaranteed unique: two people sharing name, nickname and country
/// collapse into one id, and a person who toggles their nickname between
/// years splits into two.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PseudoId(String);

impl PseudoId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Build `"{name} ({nickname}) - {country}"`, substituting placeholders
    /// for missing or blank fields so the id is always well-formed.
    pub fn from_fields(name: Option<&str>, nickname: Option<&str>, country: Option<&str>) -> Self {
        let name = non_blank(name).unwrap_or(NAMELESS);
        let nickname = non_blank(nickname).unwrap_or(NICKLESS);
        let country = non_blank(country).unwrap_or(NATIONLESS);
        Self(format!("{} ({}) - {}", name, nickname, country))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl fmt::Display for PseudoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PseudoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PseudoId({})", self.0)
    }
}

impl From<String> for PseudoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PseudoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content hash identifying one set of load inputs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the given parts in order, separated so that `["ab", "c"]` and
    /// `["a", "bc"]` differ. Keeps the first 16 hex characters.
    pub fn generate<T: AsRef<[u8]>>(parts: &[T]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update(b"|");
            }
            let bytes = part.as_ref();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        let hash = hex::encode(hasher.finalize());
        Self(hash[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}
