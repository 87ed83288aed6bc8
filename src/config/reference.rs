//! Hand-maintained reference tables.
//!
//! These are configuration, not state: loaded once, validated, then only
//! read. Every lookup for a (source, year) that was never registered fails
//! instead of guessing, since a guessed round count or playoff order would
//! silently produce wrong historical standings.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ConfigError;
use crate::models::{PseudoId, Source};

/// Lookup errors for unregistered years.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Year {year} is not registered for the {dataset} source; update the round calendar")]
    UnknownYear { dataset: Source, year: i32 },
}

/// Round numbers that exist in one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSet(BTreeSet<u32>);

impl RoundSet {
    /// Rounds `1..=count`.
    pub fn count(count: u32) -> Self {
        Self((1..=count).collect())
    }

    pub fn list(rounds: &[u32]) -> Self {
        Self(rounds.iter().copied().collect())
    }

    pub fn contains(&self, round: u32) -> bool {
        self.0.contains(&round)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn max(&self) -> Option<u32> {
        self.0.iter().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Authoritative placements for the top of one year's field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayoffOrder(Vec<PseudoId>);

impl PlayoffOrder {
    /// Competitors in placement order; index 0 is first place.
    pub fn new(order: Vec<PseudoId>) -> Self {
        Self(order)
    }

    pub fn placement_of(&self, id: &PseudoId) -> Option<u32> {
        self.0.iter().position(|p| p == id).map(|i| i as u32 + 1)
    }

    /// `(placement, id)` pairs, ascending.
    pub fn placements(&self) -> impl Iterator<Item = (u32, &PseudoId)> {
        self.0.iter().enumerate().map(|(i, id)| (i as u32 + 1, id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How one secondary-source year encodes its final order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryYearFormat {
    /// `official_rank` values up to this bound are playoff placements.
    #[serde(default)]
    pub playoff_prefix: Option<u32>,
}

/// Corrections for known historical renames in the primary source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCorrections {
    #[serde(default)]
    pub name_to_name: BTreeMap<String, String>,
    #[serde(default)]
    pub nick_to_nick: BTreeMap<String, String>,
    /// Keyed by corrected name
    #[serde(default)]
    pub name_to_nick: BTreeMap<String, String>,
    /// Keyed by corrected name
    #[serde(default)]
    pub name_to_country: BTreeMap<String, String>,
}

impl NameCorrections {
    pub fn is_empty(&self) -> bool {
        self.name_to_name.is_empty()
            && self.nick_to_nick.is_empty()
            && self.name_to_nick.is_empty()
            && self.name_to_country.is_empty()
    }
}

/// Secondary name variant -> primary pseudo_id.
///
/// Keys are stored with whitespace collapsed so stray trailing blanks in the
/// source files do not defeat a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOverrides(BTreeMap<String, PseudoId>);

impl IdentityOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: PseudoId) {
        self.0.insert(collapse_whitespace(name), id);
    }

    pub fn get(&self, name: &str) -> Option<&PseudoId> {
        self.0.get(&collapse_whitespace(name))
    }

    /// Stored key and target for a name, for callers tracking which keys
    /// were used.
    pub fn get_key_value(&self, name: &str) -> Option<(&str, &PseudoId)> {
        self.0
            .get_key_value(&collapse_whitespace(name))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PseudoId)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trim and collapse internal runs of whitespace to one space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A round entry: a count (`1..=N`) or an explicit list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RoundSpec {
    Count(u32),
    List(Vec<u32>),
}

/// On-disk shape of the reference file.
#[derive(Debug, Deserialize)]
struct RawReference {
    version: String,
    #[serde(default)]
    updated: Option<NaiveDate>,
    #[serde(default)]
    rounds: BTreeMap<String, BTreeMap<String, RoundSpec>>,
    #[serde(default)]
    playoffs: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(default)]
    secondary_formats: BTreeMap<String, SecondaryYearFormat>,
    #[serde(default)]
    identity_overrides: BTreeMap<String, String>,
    #[serde(default)]
    corrections: NameCorrections,
}

/// All lookup tables consumed by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTables {
    pub version: String,
    pub updated: Option<NaiveDate>,
    rounds: BTreeMap<(Source, i32), RoundSet>,
    playoffs: BTreeMap<(Source, i32), PlayoffOrder>,
    secondary_formats: BTreeMap<i32, SecondaryYearFormat>,
    pub identity_overrides: IdentityOverrides,
    pub corrections: NameCorrections,
}

impl ReferenceTables {
    /// Empty tables for building fixtures in code.
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Self::default()
        }
    }

    /// Load and validate a TOML reference file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawReference = toml::from_str(contents)?;
        let mut tables = Self::new(&raw.version);
        tables.updated = raw.updated;

        for (source_key, years) in raw.rounds {
            let source = parse_source(&source_key)?;
            for (year_key, spec) in years {
                let year = parse_year(&year_key)?;
                let set = match spec {
                    RoundSpec::Count(n) => RoundSet::count(n),
                    RoundSpec::List(list) => RoundSet::list(&list),
                };
                tables.rounds.insert((source, year), set);
            }
        }

        for (source_key, years) in raw.playoffs {
            let source = parse_source(&source_key)?;
            for (year_key, placements) in years {
                let year = parse_year(&year_key)?;
                let order = parse_playoff_order(year, placements)?;
                tables.playoffs.insert((source, year), order);
            }
        }

        for (year_key, format) in raw.secondary_formats {
            tables
                .secondary_formats
                .insert(parse_year(&year_key)?, format);
        }

        for (name, id) in raw.identity_overrides {
            tables.identity_overrides.insert(&name, PseudoId::from(id));
        }

        tables.corrections = raw.corrections;
        tables.validate()?;
        Ok(tables)
    }

    pub fn with_rounds(mut self, source: Source, year: i32, rounds: RoundSet) -> Self {
        self.rounds.insert((source, year), rounds);
        self
    }

    /// Register a playoff order; `order[0]` is first place.
    pub fn with_playoff(mut self, source: Source, year: i32, order: &[&str]) -> Self {
        let order = order.iter().map(|id| PseudoId::from(*id)).collect();
        self.playoffs.insert((source, year), PlayoffOrder::new(order));
        self
    }

    pub fn with_secondary_format(mut self, year: i32, format: SecondaryYearFormat) -> Self {
        self.secondary_formats.insert(year, format);
        self
    }

    pub fn with_identity_override(mut self, name: &str, id: &str) -> Self {
        self.identity_overrides.insert(name, PseudoId::from(id));
        self
    }

    pub fn with_corrections(mut self, corrections: NameCorrections) -> Self {
        self.corrections = corrections;
        self
    }

    /// Registered rounds for a year.
    pub fn rounds_for(&self, source: Source, year: i32) -> Result<&RoundSet, ReferenceError> {
        self.rounds
            .get(&(source, year))
            .ok_or(ReferenceError::UnknownYear {
                dataset: source,
                year,
            })
    }

    /// Highest registered round number for a year.
    pub fn max_round(&self, source: Source, year: i32) -> Result<u32, ReferenceError> {
        let rounds = self.rounds_for(source, year)?;
        Ok(rounds.max().unwrap_or(0))
    }

    /// Playoff order for a registered year, `None` when no playoff result is
    /// known for it.
    pub fn playoff_for(
        &self,
        source: Source,
        year: i32,
    ) -> Result<Option<&PlayoffOrder>, ReferenceError> {
        self.rounds_for(source, year)?;
        Ok(self.playoffs.get(&(source, year)))
    }

    /// Format of a secondary year; unlisted years carry no embedded playoff.
    pub fn secondary_format(&self, year: i32) -> SecondaryYearFormat {
        self.secondary_formats.get(&year).copied().unwrap_or_default()
    }

    /// Registered years for a source, ascending.
    pub fn years(&self, source: Source) -> Vec<i32> {
        self.rounds
            .keys()
            .filter(|(s, _)| *s == source)
            .map(|(_, y)| *y)
            .collect()
    }

    /// Number of years with a recorded playoff order.
    pub fn playoff_year_count(&self, source: Source) -> usize {
        self.playoffs.keys().filter(|(s, _)| *s == source).count()
    }

    /// Validate the tables.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Reference tables must carry a version".to_string(),
            ));
        }

        for ((source, year), rounds) in &self.rounds {
            if rounds.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} {} registers no rounds",
                    source, year
                )));
            }
            if rounds.contains(0) {
                return Err(ConfigError::ValidationError(format!(
                    "{} {} registers round 0; rounds start at 1",
                    source, year
                )));
            }
        }

        for ((source, year), order) in &self.playoffs {
            if !self.rounds.contains_key(&(*source, *year)) {
                return Err(ConfigError::ValidationError(format!(
                    "Playoff for {} {} has no round calendar entry",
                    source, year
                )));
            }
            let distinct: BTreeSet<&PseudoId> = order.0.iter().collect();
            if distinct.len() != order.len() {
                return Err(ConfigError::ValidationError(format!(
                    "Playoff for {} {} lists a competitor twice",
                    source, year
                )));
            }
        }

        Ok(())
    }
}

fn parse_source(key: &str) -> Result<Source, ConfigError> {
    key.parse::<Source>().map_err(ConfigError::ValidationError)
}

fn parse_year(key: &str) -> Result<i32, ConfigError> {
    key.trim()
        .parse::<i32>()
        .map_err(|_| ConfigError::ValidationError(format!("\"{}\" is not a year", key)))
}

/// Placements must be exactly `1..=N`.
fn parse_playoff_order(
    year: i32,
    placements: BTreeMap<String, String>,
) -> Result<PlayoffOrder, ConfigError> {
    let mut by_place = BTreeMap::new();
    for (place_key, id) in placements {
        let place: u32 = place_key.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "Playoff {}: \"{}\" is not a placement",
                year, place_key
            ))
        })?;
        if by_place.insert(place, PseudoId::from(id)).is_some() {
            return Err(ConfigError::ValidationError(format!(
                "Playoff {}: placement {} listed twice",
                year, place
            )));
        }
    }

    for (expected, place) in (1u32..).zip(by_place.keys()) {
        if *place != expected {
            return Err(ConfigError::ValidationError(format!(
                "Playoff {}: placements must run 1..={} without gaps, found {}",
                year,
                by_place.len(),
                place
            )));
        }
    }

    Ok(PlayoffOrder::new(by_place.into_values().collect()))
}
