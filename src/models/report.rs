//! Data-quality counters collected during a load.
//!
//! None of these abort a load; they exist so regressions in input quality
//! show up in the run report instead of silently shifting results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Fingerprint, MatchRule};

/// Identity Builder counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityStats {
    pub rows_in: usize,
    pub corrections_applied: usize,
    pub duplicate_rows_dropped: usize,
    pub header_rows_dropped: usize,
    /// Pseudo-ids carried by more than one kept row in the same year, i.e.
    /// visible identity collisions.
    pub colliding_ids: usize,
}

/// Identity Linker counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub rows: usize,
    pub by_rule: BTreeMap<MatchRule, usize>,
    /// Lookup keys matching more than one distinct primary id.
    pub ambiguous_keys: usize,
    /// Override targets that are not a known primary id.
    pub overrides_without_primary: usize,
    /// Override keys that never matched a secondary row.
    pub unused_override_keys: usize,
}

impl LinkStats {
    pub fn record(&mut self, rule: MatchRule) {
        self.rows += 1;
        *self.by_rule.entry(rule).or_insert(0) += 1;
    }

    pub fn count(&self, rule: MatchRule) -> usize {
        self.by_rule.get(&rule).copied().unwrap_or(0)
    }

    pub fn fallbacks(&self) -> usize {
        self.count(MatchRule::Fallback)
    }

    /// Fraction of rows that fell back to a synthesized identifier.
    pub fn fallback_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.fallbacks() as f64 / self.rows as f64
        }
    }
}

/// Standing Calculator counters for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandingStats {
    pub years: usize,
    pub ranked: usize,
    pub non_participants: usize,
    pub playoff_placements_applied: usize,
    /// Playoff entries whose pseudo_id had no competitor that year.
    pub dangling_placements: usize,
}

/// Summary of one pipeline run, written next to the outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub fingerprint: Fingerprint,
    pub reference_version: String,
    pub primary_years: Vec<i32>,
    pub secondary_years: Vec<i32>,
    pub identity: IdentityStats,
    pub linking: LinkStats,
    pub primary_standings: StandingStats,
    pub secondary_standings: StandingStats,
    pub wide_rows: usize,
    pub wide_columns: usize,
    pub collapsed_wide_rows: usize,
}

impl RunReport {
    /// One-line summary suitable for logs.
    pub fn summary(&self) -> String {
        format!(
            "load {} (reference {}): {} primary years, {} secondary years, {} wide rows x {} columns, fallback rate {:.1}%",
            self.fingerprint,
            self.reference_version,
            self.primary_years.len(),
            self.secondary_years.len(),
            self.wide_rows,
            self.wide_columns,
            self.linking.fallback_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_stats_fallback_rate() {
        let mut stats = LinkStats::default();
        assert_eq!(stats.fallback_rate(), 0.0);

        stats.record(MatchRule::ExactName);
        stats.record(MatchRule::ExactName);
        stats.record(MatchRule::Override);
        stats.record(MatchRule::Fallback);

        assert_eq!(stats.rows, 4);
        assert_eq!(stats.count(MatchRule::ExactName), 2);
        assert_eq!(stats.count(MatchRule::ReversedName), 0);
        assert_eq!(stats.fallbacks(), 1);
        assert!((stats.fallback_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_link_stats_serialization_is_ordered() {
        let mut stats = LinkStats::default();
        stats.record(MatchRule::Fallback);
        stats.record(MatchRule::ExactName);
        let json = serde_json::to_string(&stats.by_rule).unwrap();
        assert_eq!(json, r#"{"exact_name":1,"fallback":1}"#);
    }
}
