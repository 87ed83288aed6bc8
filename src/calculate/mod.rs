//! Standings calculation engine.
//!
//! Computes derived rankings from linked records:
//! - Preliminary points rank per year
//! - Final rank with playoff placements taking precedence
//! - Officials-only rank for the secondary source
//! - Per-round positions
//! - Percentiles and outcome labels for reports

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ReferenceError, ReferenceTables};
use crate::models::{CompetitorRecord, PseudoId, RoundPoints, Source, StandingStats};

/// Label used when a competitor has no result for a year.
pub const LABEL_NO_RECORD: &str = "    N/A (No record found)";

/// Which competitors a ranking is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    Everyone,
    /// Quota-limited official delegation members only.
    OfficialsOnly,
}

impl Population {
    pub fn includes(&self, record: &CompetitorRecord) -> bool {
        match self {
            Population::Everyone => true,
            Population::OfficialsOnly => record.is_official,
        }
    }

    /// Population a competitor's own result is reported against.
    pub fn for_record(record: &CompetitorRecord) -> Self {
        if record.source == Source::Secondary && record.is_official {
            Population::OfficialsOnly
        } else {
            Population::Everyone
        }
    }
}

/// Dense rank, highest value first: `[10, 8, 10, 5]` -> `[1, 2, 1, 3]`.
pub fn dense_rank_desc(values: &[f64]) -> Vec<u32> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);

    values
        .iter()
        .map(|v| {
            let i = distinct
                .iter()
                .position(|d| d.total_cmp(v) == Ordering::Equal)
                .unwrap_or(distinct.len());
            i as u32 + 1
        })
        .collect()
}

/// Competition ("min") rank, highest value first; ties share the lowest
/// rank and the next value skips: `[10, 8, 10]` -> `[1, 3, 1]`. Nulls are
/// not ranked.
pub fn competition_rank_desc(values: &[Option<f64>]) -> Vec<Option<u32>> {
    values
        .iter()
        .map(|v| {
            v.map(|v| {
                let above = values
                    .iter()
                    .flatten()
                    .filter(|other| other.total_cmp(&v) == Ordering::Greater)
                    .count();
                above as u32 + 1
            })
        })
        .collect()
}

/// Final order of a year's field: `(placement, total_points)` per entry.
///
/// Entries with a placement come first by placement, the rest follow by
/// points descending; equal keys keep input order. Returns each entry's
/// rank, `1..=N` without gaps or ties.
pub fn final_ranks(entries: &[(Option<u32>, f64)]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, ta) = entries[a];
        let (pb, tb) = entries[b];
        match (pa, pb) {
            (Some(pa), Some(pb)) => pa.cmp(&pb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => tb.total_cmp(&ta),
        }
    });

    let mut ranks = vec![0; entries.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position as u32 + 1;
    }
    ranks
}

/// Annotate every record of one source with its standings.
///
/// Works year by year. Records without points take no part in any
/// ranking. Playoff placements come from the reference tables; for years
/// with no registered playoff, placements embedded in the source data are
/// used instead. A pseudo-id appearing twice in one year receives its
/// placement on the first record only.
pub fn assign_standings(
    records: &mut [CompetitorRecord],
    source: Source,
    reference: &ReferenceTables,
) -> Result<StandingStats, ReferenceError> {
    let mut stats = StandingStats::default();

    let mut by_year: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        by_year.entry(record.year).or_default().push(i);
    }

    for (year, indices) in by_year {
        let playoff = reference.playoff_for(source, year)?;
        stats.years += 1;

        let mut participants = Vec::with_capacity(indices.len());
        for i in indices {
            let record = &mut records[i];
            record.rank_preliminary = None;
            record.rank_final = None;
            record.rank_official = None;
            record.positions.clear();
            if record.participated() {
                participants.push(i);
            } else {
                stats.non_participants += 1;
            }
        }

        let mut placed: HashSet<&PseudoId> = HashSet::new();
        let mut placements: Vec<Option<u32>> = Vec::with_capacity(participants.len());
        for &i in &participants {
            let record = &records[i];
            let placement = match playoff {
                Some(order) => order.placement_of(&record.pseudo_id),
                None => record.embedded_placement,
            };
            let placement = placement.filter(|_| placed.insert(&record.pseudo_id));
            placements.push(placement);
        }

        if let Some(order) = playoff {
            let present: HashSet<&PseudoId> =
                participants.iter().map(|&i| &records[i].pseudo_id).collect();
            let dangling = order
                .placements()
                .filter(|(_, id)| !present.contains(id))
                .count();
            if dangling > 0 {
                warn!(
                    "{} {}: {} playoff placements name no competitor that year",
                    source, year, dangling
                );
            }
            stats.dangling_placements += dangling;
        }
        let applied = placements.iter().filter(|p| p.is_some()).count();
        stats.playoff_placements_applied += applied;

        let totals: Vec<f64> = participants
            .iter()
            .map(|&i| records[i].total_points.unwrap_or(0.0))
            .collect();

        let preliminary = dense_rank_desc(&totals);
        let entries: Vec<(Option<u32>, f64)> =
            placements.iter().copied().zip(totals.iter().copied()).collect();
        let finals = final_ranks(&entries);

        let official: Vec<usize> = (0..participants.len())
            .filter(|&k| Population::OfficialsOnly.includes(&records[participants[k]]))
            .collect();
        let official_entries: Vec<(Option<u32>, f64)> =
            official.iter().map(|&k| entries[k]).collect();
        let official_ranks = final_ranks(&official_entries);

        for (k, &i) in participants.iter().enumerate() {
            records[i].rank_preliminary = Some(preliminary[k]);
            records[i].rank_final = Some(finals[k]);
        }
        if source == Source::Secondary {
            for (&k, rank) in official.iter().zip(official_ranks) {
                records[participants[k]].rank_official = Some(rank);
            }
        }

        assign_positions(records, &participants);

        debug!(
            "{} {}: ranked {} competitors, {} playoff placements",
            source,
            year,
            participants.len(),
            applied
        );
        stats.ranked += participants.len();
    }

    Ok(stats)
}

/// Per-round competition rank within one year's participants.
fn assign_positions(records: &mut [CompetitorRecord], participants: &[usize]) {
    let rounds: BTreeSet<u32> = participants
        .iter()
        .flat_map(|&i| records[i].points.rounds().collect::<Vec<_>>())
        .collect();

    for round in rounds {
        let values: Vec<Option<f64>> = participants
            .iter()
            .map(|&i| records[i].points.get(round))
            .collect();
        for (&i, position) in participants.iter().zip(competition_rank_desc(&values)) {
            if let Some(position) = position {
                records[i].positions.insert(round, position);
            }
        }
    }
}

/// Calculate the share of the population at or below a rank.
/// Rank 1 of N is 1.0, rank N of N is 1/N.
pub fn calculate_percentile(rank: u32, population: u32) -> f64 {
    if population == 0 || rank == 0 || rank > population {
        0.0
    } else {
        (population - rank + 1) as f64 / population as f64
    }
}

/// Format numbers as 1st, 2nd, 3rd, 4th, 11th, 21st...
pub fn ordinal_suffix(n: u32) -> String {
    let suffix = if (11..=13).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

/// Human-readable result line, e.g. `"☆ 95th pctile (2nd of 40)"`.
///
/// Podium finishes get a star; unofficial competitors a trailing `*`.
pub fn outcome_label(rank: u32, population: u32, is_official: bool) -> String {
    let percentile = calculate_percentile(rank, population);
    let prefix = if rank <= 3 { "\u{2606}" } else { "   " };
    let mut label = format!(
        "{} {} pctile ({} of {})",
        prefix,
        ordinal_suffix((percentile * 100.0).floor() as u32),
        ordinal_suffix(rank),
        population
    );
    if !is_official {
        label.push('*');
    }
    label
}

/// Sum of the best `k` scores among the first `n` rounds.
pub fn sum_top_k_rounds(points: &RoundPoints, n: usize, k: usize) -> f64 {
    points.top_k_sum(n, k)
}

/// Best `k` round scores of one competitor in each year and source,
/// over every registered round. Ordered by year then source.
pub fn best_rounds_for(
    id: &PseudoId,
    records: &[CompetitorRecord],
    k: usize,
) -> Vec<(i32, Source, f64)> {
    let mut best: Vec<(i32, Source, f64)> = records
        .iter()
        .filter(|r| &r.pseudo_id == id && r.participated())
        .map(|r| (r.year, r.source, sum_top_k_rounds(&r.points, r.points.len(), k)))
        .collect();
    best.sort_by_key(|(year, source, _)| (*year, *source));
    best
}

/// One competitor's result in one year of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub year: i32,
    pub source: Source,
    pub population: Population,
    pub rank: Option<u32>,
    pub population_size: u32,
    pub percentile: f64,
    pub label: String,
}

/// Every result of one competitor, ordered by year then source.
///
/// Official secondary competitors are reported against the official
/// delegation only; everyone else against the whole field.
pub fn outcomes_for(id: &PseudoId, records: &[CompetitorRecord]) -> Vec<Outcome> {
    let mut sizes: BTreeMap<(Source, i32, bool), u32> = BTreeMap::new();
    for record in records.iter().filter(|r| r.rank_final.is_some()) {
        *sizes.entry((record.source, record.year, false)).or_insert(0) += 1;
        if record.rank_official.is_some() {
            *sizes.entry((record.source, record.year, true)).or_insert(0) += 1;
        }
    }

    let mut outcomes: Vec<Outcome> = records
        .iter()
        .filter(|r| &r.pseudo_id == id)
        .map(|record| {
            let population = Population::for_record(record);
            let officials_only = population == Population::OfficialsOnly;
            let rank = if officials_only {
                record.rank_official
            } else {
                record.rank_final
            };
            let size = sizes
                .get(&(record.source, record.year, officials_only))
                .copied()
                .unwrap_or(0);
            let (percentile, label) = match rank {
                Some(rank) => (
                    calculate_percentile(rank, size),
                    outcome_label(rank, size, record.is_official),
                ),
                None => (0.0, LABEL_NO_RECORD.to_string()),
            };
            Outcome {
                year: record.year,
                source: record.source,
                population,
                rank,
                population_size: size,
                percentile,
                label,
            }
        })
        .collect();

    outcomes.sort_by_key(|o| (o.year, o.source));
    outcomes
}
