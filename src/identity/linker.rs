//! Links secondary-source rows onto primary-source identities.
//!
//! The secondary source only publishes a display name, written in whatever
//! order and casing the organizers used that year. Each row is resolved
//! through a fixed chain of rules, first hit wins:
//!
//! 1. exact display name,
//! 2. display name with its words reversed,
//! 3. case-insensitive display name,
//!
//! after which the identity override table is consulted unconditionally and
//! replaces whatever was found. Rows still unresolved keep their own
//! normalized display name as identifier.
//!
//! When a rule finds several distinct primary ids for one name, the id of
//! the earliest primary row (by year, then input order) is used. Rows whose
//! name is missing on either side never match automatically.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::{collapse_whitespace, IdentityOverrides};
use crate::models::{
    CompetitorRecord, LinkStats, MatchRule, PseudoId, SecondaryRow, Source, NAMELESS,
};

/// Linker output.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub records: Vec<CompetitorRecord>,
    pub stats: LinkStats,
}

/// Title-case a raw secondary name and strip commas.
///
/// `"ZVĚŘINA, jan"` becomes `"Zvěřina Jan"`. A letter is upper-cased when
/// it follows anything that is not alphanumeric, so hyphenated and
/// apostrophized names keep their inner capitals.
pub fn normalize_name(raw: &str) -> String {
    let without_commas = raw.replace(',', " ");
    let collapsed = collapse_whitespace(&without_commas);

    let mut out = String::with_capacity(collapsed.len());
    let mut word_start = true;
    for c in collapsed.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        word_start = !c.is_alphanumeric();
    }
    out
}

/// Reverse word order: `"Zverina Jan"` -> `"Jan Zverina"`.
pub fn reverse_words(name: &str) -> String {
    name.split_whitespace().rev().collect::<Vec<_>>().join(" ")
}

/// Primary display names -> candidate ids, earliest primary row first.
#[derive(Debug, Default)]
pub struct PrimaryIndex {
    by_name: HashMap<String, Vec<PseudoId>>,
    by_lowercase: HashMap<String, Vec<PseudoId>>,
    ids: HashSet<PseudoId>,
}

impl PrimaryIndex {
    pub fn build(primary: &[CompetitorRecord]) -> Self {
        let mut order: Vec<&CompetitorRecord> = primary.iter().collect();
        // Stable: equal years keep input order.
        order.sort_by_key(|r| r.year);

        let mut index = Self::default();
        for record in order {
            index.ids.insert(record.pseudo_id.clone());
            if is_placeholder_name(&record.display_name) {
                continue;
            }
            push_distinct(
                index.by_name.entry(record.display_name.clone()).or_default(),
                &record.pseudo_id,
            );
            push_distinct(
                index
                    .by_lowercase
                    .entry(record.display_name.to_lowercase())
                    .or_default(),
                &record.pseudo_id,
            );
        }
        index
    }

    pub fn contains_id(&self, id: &PseudoId) -> bool {
        self.ids.contains(id)
    }

    pub fn exact(&self, name: &str) -> &[PseudoId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn case_insensitive(&self, name: &str) -> &[PseudoId] {
        self.by_lowercase
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A name filled in for a missing one carries no identity.
fn is_placeholder_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(NAMELESS)
}

fn push_distinct(ids: &mut Vec<PseudoId>, id: &PseudoId) {
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}

/// Run the automatic rules for one normalized name.
fn automatic_match(
    index: &PrimaryIndex,
    name: &str,
    ambiguous: &mut BTreeSet<String>,
) -> Option<(PseudoId, MatchRule)> {
    let reversed = reverse_words(name);
    let attempts: [(&[PseudoId], MatchRule); 3] = [
        (index.exact(name), MatchRule::ExactName),
        (index.exact(&reversed), MatchRule::ReversedName),
        (index.case_insensitive(name), MatchRule::CaseInsensitive),
    ];

    for (candidates, rule) in attempts {
        if let Some(first) = candidates.first() {
            if candidates.len() > 1 {
                ambiguous.insert(name.to_string());
            }
            return Some((first.clone(), rule));
        }
    }
    None
}

/// Look up the override table by every spelling the row is known under.
fn override_match<'a>(
    overrides: &'a IdentityOverrides,
    raw: &str,
    normalized: &str,
) -> Option<(&'a str, &'a PseudoId)> {
    let raw_collapsed = collapse_whitespace(&raw.replace(',', " "));
    let candidates = [
        collapse_whitespace(raw),
        normalized.to_string(),
        reverse_words(normalized),
        raw_collapsed.clone(),
        reverse_words(&raw_collapsed),
    ];

    candidates
        .iter()
        .find_map(|key| overrides.get_key_value(key))
}

/// Resolve a pseudo-id for every secondary row.
///
/// Pure: the same inputs always produce the same ids and counters.
pub fn link_secondary(
    rows: &[SecondaryRow],
    primary: &[CompetitorRecord],
    overrides: &IdentityOverrides,
) -> LinkOutcome {
    let index = PrimaryIndex::build(primary);
    let mut stats = LinkStats::default();
    let mut ambiguous = BTreeSet::new();
    let mut used_keys: HashSet<&str> = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let mut name = normalize_name(&row.raw_name);
        if name.is_empty() {
            name = NAMELESS.to_string();
        }

        let mut resolved = if is_placeholder_name(&name) {
            None
        } else {
            automatic_match(&index, &name, &mut ambiguous)
        };

        if let Some((key, id)) = override_match(overrides, &row.raw_name, &name) {
            used_keys.insert(key);
            resolved = Some((id.clone(), MatchRule::Override));
        }

        let (pseudo_id, rule) = resolved.unwrap_or_else(|| {
            debug!("No primary identity for secondary {} \"{}\"", row.year, name);
            (PseudoId::new(name.clone()), MatchRule::Fallback)
        });
        stats.record(rule);

        records.push(
            CompetitorRecord::new(
                pseudo_id,
                Source::Secondary,
                row.year,
                name,
                row.points.clone(),
                row.total_points,
            )
            .with_official(row.official)
            .with_embedded_placement(row.embedded_placement)
            .with_match_rule(rule),
        );
    }

    stats.ambiguous_keys = ambiguous.len();
    stats.overrides_without_primary = overrides
        .iter()
        .filter(|(_, id)| !index.contains_id(id))
        .count();
    stats.unused_override_keys = overrides
        .keys()
        .filter(|k| !used_keys.contains(k))
        .count();

    if stats.ambiguous_keys > 0 {
        warn!(
            "{} secondary names matched several primary identities; earliest primary row used",
            stats.ambiguous_keys
        );
    }
    if stats.overrides_without_primary > 0 {
        warn!(
            "{} identity overrides point at ids absent from the primary source",
            stats.overrides_without_primary
        );
    }
    info!(
        "Linked {} secondary rows: {} exact, {} reversed, {} case-insensitive, {} override, {} fallback ({:.1}%)",
        stats.rows,
        stats.count(MatchRule::ExactName),
        stats.count(MatchRule::ReversedName),
        stats.count(MatchRule::CaseInsensitive),
        stats.count(MatchRule::Override),
        stats.fallbacks(),
        stats.fallback_rate() * 100.0
    );

    LinkOutcome { records, stats }
}
