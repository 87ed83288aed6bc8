//! Competitor identity.
//!
//! The primary source never publishes a stable competitor id, so one is
//! synthesized from the three descriptive fields every row carries. The
//! resulting [`PseudoId`] is only as stable as those fields: a competitor who
//! renames themselves, hides their nickname for a season or is re-entered
//! with a typo splits into several ids, and two people sharing all three
//! fields merge into one. Both are accepted and counted, not repaired here.
//! Known renames are fixed through the correction table in the reference
//! file.

pub mod linker;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::NameCorrections;
use crate::models::{CompetitorRecord, IdentityStats, PrimaryRow, PseudoId, Source, NAMELESS};

/// Literal values of a header row repeated inside a paginated source table.
const HEADER_NAME: &str = "Name";
const HEADER_NICK: &str = "Nick";
const HEADER_COUNTRY: &str = "Country";

/// Identity Builder output.
#[derive(Debug, Clone)]
pub struct IdentityBuild {
    pub records: Vec<CompetitorRecord>,
    pub stats: IdentityStats,
}

/// Apply the rename table to one row. Returns true if anything changed.
///
/// Names and nicknames are replaced first; the nickname and country
/// corrections are then looked up by the corrected name.
pub fn apply_corrections(row: &mut PrimaryRow, corrections: &NameCorrections) -> bool {
    let mut changed = false;

    if let Some(name) = row.name.as_ref().and_then(|n| corrections.name_to_name.get(n)) {
        row.name = Some(name.clone());
        changed = true;
    }
    if let Some(nick) = row
        .nickname
        .as_ref()
        .and_then(|n| corrections.nick_to_nick.get(n))
    {
        row.nickname = Some(nick.clone());
        changed = true;
    }

    if let Some(name) = row.name.as_deref() {
        if let Some(nick) = corrections.name_to_nick.get(name) {
            if row.nickname.as_deref() != Some(nick.as_str()) {
                row.nickname = Some(nick.clone());
                changed = true;
            }
        }
        if let Some(country) = corrections.name_to_country.get(name) {
            if row.country.as_deref() != Some(country.as_str()) {
                row.country = Some(country.clone());
                changed = true;
            }
        }
    }

    changed
}

/// A header row leaked from a paginated table.
pub fn is_header_row(row: &PrimaryRow) -> bool {
    row.name.as_deref() == Some(HEADER_NAME)
        && row.nickname.as_deref() == Some(HEADER_NICK)
        && row.country.as_deref() == Some(HEADER_COUNTRY)
}

/// Pseudo-identifier for a row after corrections.
pub fn pseudo_id_for(row: &PrimaryRow) -> PseudoId {
    PseudoId::from_fields(
        row.name.as_deref(),
        row.nickname.as_deref(),
        row.country.as_deref(),
    )
}

/// Build identities for every primary row.
///
/// Corrections run first, then header rows and exact provenance duplicates
/// (same name, nickname, country and source file) are dropped keeping the
/// first occurrence. Input order is preserved.
pub fn build_identities(rows: Vec<PrimaryRow>, corrections: &NameCorrections) -> IdentityBuild {
    let mut stats = IdentityStats {
        rows_in: rows.len(),
        ..IdentityStats::default()
    };

    let mut seen: HashSet<(Option<String>, Option<String>, Option<String>, String)> =
        HashSet::new();
    let mut per_year: HashMap<(i32, PseudoId), usize> = HashMap::new();
    let mut records = Vec::with_capacity(rows.len());

    for mut row in rows {
        if apply_corrections(&mut row, corrections) {
            stats.corrections_applied += 1;
        }

        if is_header_row(&row) {
            stats.header_rows_dropped += 1;
            continue;
        }

        let key = (
            row.name.clone(),
            row.nickname.clone(),
            row.country.clone(),
            row.source_file.clone(),
        );
        if !seen.insert(key) {
            debug!(
                "Dropping duplicate row for {:?} in {}",
                row.name, row.source_file
            );
            stats.duplicate_rows_dropped += 1;
            continue;
        }

        let id = pseudo_id_for(&row);
        *per_year.entry((row.year, id.clone())).or_insert(0) += 1;

        let display_name = row
            .name
            .clone()
            .unwrap_or_else(|| NAMELESS.to_string());
        let record = CompetitorRecord::new(
            id,
            Source::Primary,
            row.year,
            display_name,
            row.points,
            row.total_points,
        )
        .with_nickname(row.nickname)
        .with_country(row.country)
        .with_source_file(row.source_file);

        records.push(record);
    }

    stats.colliding_ids = per_year.values().filter(|n| **n > 1).count();

    if stats.colliding_ids > 0 {
        warn!(
            "{} pseudo-ids are shared by more than one row in the same year",
            stats.colliding_ids
        );
    }
    info!(
        "Built {} primary identities ({} corrected, {} duplicates, {} header rows dropped)",
        records.len(),
        stats.corrections_applied,
        stats.duplicate_rows_dropped,
        stats.header_rows_dropped
    );

    IdentityBuild { records, stats }
}
