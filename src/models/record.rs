//! Long-format competitor records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{PseudoId, RoundPoints, Source};

/// A normalized primary-source row, before identity is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRow {
    pub year: i32,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub country: Option<String>,
    /// Provenance; two rows from the same file with the same descriptive
    /// fields are duplicates.
    pub source_file: String,
    pub points: RoundPoints,
    pub total_points: Option<f64>,
}

/// A normalized secondary-source row, before linking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryRow {
    pub year: i32,
    /// Name as written in the source file.
    pub raw_name: String,
    pub official: bool,
    pub official_rank: Option<u32>,
    pub unofficial_rank: Option<u32>,
    /// Playoff placement already encoded in the source's official rank.
    pub embedded_placement: Option<u32>,
    pub points: RoundPoints,
    pub total_points: Option<f64>,
}

/// Which linker rule produced a secondary record's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExactName,
    ReversedName,
    CaseInsensitive,
    Override,
    Fallback,
}

impl MatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::ExactName => "exact_name",
            MatchRule::ReversedName => "reversed_name",
            MatchRule::CaseInsensitive => "case_insensitive",
            MatchRule::Override => "override",
            MatchRule::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One competitor in one year of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRecord {
    pub pseudo_id: PseudoId,

    pub source: Source,

    pub year: i32,

    pub display_name: String,

    /// Primary source only
    pub nickname: Option<String>,

    /// Primary source only
    pub country: Option<String>,

    pub points: RoundPoints,

    /// `None` means the competitor has no recorded points that year.
    pub total_points: Option<f64>,

    /// Always true in the primary source.
    pub is_official: bool,

    /// Placement carried by the source data itself (secondary years whose
    /// official rank already reflects the playoff).
    pub embedded_placement: Option<u32>,

    /// Dense points rank within the year.
    pub rank_preliminary: Option<u32>,

    /// Gapless final rank within the year, playoff placements first.
    pub rank_final: Option<u32>,

    /// Final rank among official competitors only.
    pub rank_official: Option<u32>,

    /// Competition rank of each scored round within the year.
    pub positions: BTreeMap<u32, u32>,

    /// Secondary source only
    pub match_rule: Option<MatchRule>,

    pub source_file: Option<String>,
}

impl CompetitorRecord {
    /// Create an unranked record.
    pub fn new(
        pseudo_id: PseudoId,
        source: Source,
        year: i32,
        display_name: String,
        points: RoundPoints,
        total_points: Option<f64>,
    ) -> Self {
        Self {
            pseudo_id,
            source,
            year,
            display_name,
            nickname: None,
            country: None,
            points,
            total_points,
            is_official: true,
            embedded_placement: None,
            rank_preliminary: None,
            rank_final: None,
            rank_official: None,
            positions: BTreeMap::new(),
            match_rule: None,
            source_file: None,
        }
    }

    pub fn with_nickname(mut self, nickname: Option<String>) -> Self {
        self.nickname = nickname;
        self
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }

    pub fn with_official(mut self, is_official: bool) -> Self {
        self.is_official = is_official;
        self
    }

    pub fn with_embedded_placement(mut self, placement: Option<u32>) -> Self {
        self.embedded_placement = placement;
        self
    }

    pub fn with_match_rule(mut self, rule: MatchRule) -> Self {
        self.match_rule = Some(rule);
        self
    }

    pub fn with_source_file(mut self, file: String) -> Self {
        self.source_file = Some(file);
        self
    }

    /// Whether the competitor took part that year.
    pub fn participated(&self) -> bool {
        self.total_points.is_some()
    }
}

/// The per-source half of a merged long row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStanding {
    pub display_name: String,
    pub is_official: bool,
    pub total_points: Option<f64>,
    pub rank_preliminary: Option<u32>,
    pub rank_final: Option<u32>,
    pub rank_official: Option<u32>,
    pub points: RoundPoints,
    pub positions: BTreeMap<u32, u32>,
}

impl From<&CompetitorRecord> for SourceStanding {
    fn from(record: &CompetitorRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            is_official: record.is_official,
            total_points: record.total_points,
            rank_preliminary: record.rank_preliminary,
            rank_final: record.rank_final,
            rank_official: record.rank_official,
            points: record.points.clone(),
            positions: record.positions.clone(),
        }
    }
}

/// One competitor in one year across both sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub pseudo_id: PseudoId,
    pub year: i32,
    /// Primary display name when present, secondary otherwise.
    pub name: String,
    pub nickname: Option<String>,
    pub country: Option<String>,
    pub primary: Option<SourceStanding>,
    pub secondary: Option<SourceStanding>,
}

impl MergedRecord {
    /// Sum of both sources' totals, missing totals counting as zero.
    pub fn combined_total(&self) -> f64 {
        let primary = self.primary.as_ref().and_then(|s| s.total_points);
        let secondary = self.secondary.as_ref().and_then(|s| s.total_points);
        primary.unwrap_or(0.0) + secondary.unwrap_or(0.0)
    }
}
