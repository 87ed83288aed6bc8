//! Long -> wide reshaping.
//!
//! Each (source, year) slice is flattened on its own first: rounds with no
//! value for anybody that year are dropped (the round did not happen, as
//! opposed to nobody scoring), the rest become `{year}_{round}` columns.
//! Years are then outer-joined in ascending order, and the two sources are
//! joined last with a per-source column suffix.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{
    CompetitorRecord, LifetimeTotal, MergedRecord, PseudoId, Source, SourceStanding, WideRecord,
    WideTable,
};

/// Reshaping errors.
#[derive(Debug, Error)]
pub enum ReshapeError {
    #[error("Column \"{column}\" exists on both sides of the source merge")]
    ColumnCollision { column: String },
}

/// Wide column name for one round of one year.
pub fn year_round_column(year: i32, round: u32) -> String {
    format!("{}_{}", year, round)
}

fn year_round_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}_\d+").expect("valid regex literal"))
}

/// Whether a wide column holds round values (`2024_3`, `2024_3_gp`).
pub fn is_year_round_column(name: &str) -> bool {
    year_round_pattern().is_match(name)
}

/// A flattened source plus how many same-year duplicate rows were folded.
#[derive(Debug, Clone)]
pub struct Flattened {
    pub table: WideTable,
    pub collapsed_rows: usize,
}

fn wide_row(record: &CompetitorRecord) -> WideRecord {
    let mut row = WideRecord::new(record.pseudo_id.clone());
    row.name = Some(record.display_name.clone());
    row.nickname = record.nickname.clone();
    row.country = record.country.clone();
    row.is_official = Some(record.is_official);
    row.total_points = record.total_points;
    row
}

/// Flatten one year of one source.
///
/// A pseudo-id listed twice keeps its first-seen descriptive values and the
/// first non-null value per round. Returns the table and the number of rows
/// folded into an earlier one.
pub fn flatten_year(records: &[&CompetitorRecord], year: i32) -> (WideTable, usize) {
    let played: BTreeSet<u32> = records
        .iter()
        .flat_map(|r| r.points.recorded().map(|(round, _)| round).collect::<Vec<_>>())
        .collect();
    let registered: BTreeSet<u32> = records
        .iter()
        .flat_map(|r| r.points.rounds().collect::<Vec<_>>())
        .collect();
    let pruned = registered.difference(&played).count();
    if pruned > 0 {
        debug!("{}: dropping {} rounds with no recorded points", year, pruned);
    }

    let mut table = WideTable::new();
    for round in &played {
        table.add_column(year_round_column(year, *round));
    }

    let mut collapsed = 0;
    for record in records {
        let existed = table.get(&record.pseudo_id).is_some();
        if existed {
            collapsed += 1;
            let incoming = wide_row(record);
            table.entry(&record.pseudo_id).coalesce_from(&incoming);
        } else {
            *table.entry(&record.pseudo_id) = wide_row(record);
        }

        let row = table.entry(&record.pseudo_id);
        for (round, points) in record.points.recorded() {
            row.values
                .entry(year_round_column(year, round))
                .or_insert(points);
        }
    }

    (table, collapsed)
}

/// Outer join of two wide tables on pseudo-id.
///
/// Descriptive fields keep the left (earlier) value and fall back to the
/// right one when the left is null. Right-only rows are appended in order.
pub fn merge_years(mut left: WideTable, right: WideTable) -> WideTable {
    for column in right.columns {
        left.add_column(column);
    }
    for row in right.rows {
        let target = left.entry(&row.pseudo_id);
        target.coalesce_from(&row);
        for (column, value) in row.values {
            target.values.entry(column).or_insert(value);
        }
    }
    left
}

/// Flatten every year of one source and merge them in ascending order.
pub fn flatten_source(records: &[CompetitorRecord]) -> Flattened {
    let mut by_year: BTreeMap<i32, Vec<&CompetitorRecord>> = BTreeMap::new();
    for record in records {
        by_year.entry(record.year).or_default().push(record);
    }

    let mut table = WideTable::new();
    let mut collapsed_rows = 0;
    for (year, year_records) in by_year {
        let (year_table, collapsed) = flatten_year(&year_records, year);
        collapsed_rows += collapsed;
        table = merge_years(table, year_table);
    }

    Flattened {
        table,
        collapsed_rows,
    }
}

fn with_suffix(mut table: WideTable, suffix: &str) -> WideTable {
    let rename = |column: &str| {
        if is_year_round_column(column) {
            format!("{}{}", column, suffix)
        } else {
            column.to_string()
        }
    };

    table.columns = table.columns.iter().map(|c| rename(c)).collect();
    for row in &mut table.rows {
        row.values = std::mem::take(&mut row.values)
            .into_iter()
            .map(|(column, value)| (rename(&column), value))
            .collect();
    }
    table
}

/// Join the flattened primary and secondary tables.
///
/// Year-round columns get the source's suffix. Name, nickname, country and
/// total come from the primary side when present; the official flag only
/// carries meaning in the secondary source and is taken from there when
/// present. Every id from either side appears exactly once.
pub fn merge_sources(
    primary: WideTable,
    secondary: WideTable,
    suffixes: (&str, &str),
) -> Result<WideTable, ReshapeError> {
    let primary = with_suffix(primary, suffixes.0);
    let secondary = with_suffix(secondary, suffixes.1);

    if let Some(column) = secondary.columns.iter().find(|c| primary.has_column(c)) {
        return Err(ReshapeError::ColumnCollision {
            column: column.clone(),
        });
    }

    let mut merged = primary;
    for column in secondary.columns {
        merged.add_column(column);
    }
    for row in secondary.rows {
        let target = merged.entry(&row.pseudo_id);
        if row.is_official.is_some() {
            target.is_official = row.is_official;
        }
        target.coalesce_from(&row);
        target.values.extend(row.values);
    }

    info!(
        "Merged wide table: {} competitors x {} round columns",
        merged.len(),
        merged.columns.len()
    );
    Ok(merged)
}

/// Full outer join of both sources' records on (pseudo-id, year).
///
/// A key listed twice in one source keeps its first record. Output is
/// ordered by year, then first appearance.
pub fn merge_long(primary: &[CompetitorRecord], secondary: &[CompetitorRecord]) -> Vec<MergedRecord> {
    let mut merged: Vec<MergedRecord> = Vec::with_capacity(primary.len());
    let mut position: HashMap<(PseudoId, i32), usize> = HashMap::new();

    for record in primary.iter().chain(secondary) {
        let key = (record.pseudo_id.clone(), record.year);
        let i = match position.get(&key) {
            Some(i) => *i,
            None => {
                merged.push(MergedRecord {
                    pseudo_id: record.pseudo_id.clone(),
                    year: record.year,
                    name: record.display_name.clone(),
                    nickname: None,
                    country: None,
                    primary: None,
                    secondary: None,
                });
                position.insert(key, merged.len() - 1);
                merged.len() - 1
            }
        };

        let row = &mut merged[i];
        let slot = match record.source {
            Source::Primary => &mut row.primary,
            Source::Secondary => &mut row.secondary,
        };
        if slot.is_none() {
            *slot = Some(SourceStanding::from(record));
            if record.source == Source::Primary {
                row.name = record.display_name.clone();
                row.nickname = record.nickname.clone();
                row.country = record.country.clone();
            }
        }
    }

    merged.sort_by_key(|m| m.year);
    merged
}

/// Lifetime points per competitor across both sources, highest first.
/// Ties are ordered by pseudo-id.
pub fn ids_by_total_points(merged: &[MergedRecord]) -> Vec<LifetimeTotal> {
    let mut totals: BTreeMap<&PseudoId, LifetimeTotal> = BTreeMap::new();
    for record in merged {
        let entry = totals
            .entry(&record.pseudo_id)
            .or_insert_with(|| LifetimeTotal {
                pseudo_id: record.pseudo_id.clone(),
                name: record.name.clone(),
                total_points: 0.0,
                years: 0,
            });
        entry.total_points += record.combined_total();
        entry.years += 1;
    }

    let mut ranking: Vec<LifetimeTotal> = totals.into_values().collect();
    ranking.sort_by(|a, b| {
        b.total_points
            .total_cmp(&a.total_points)
            .then_with(|| a.pseudo_id.cmp(&b.pseudo_id))
    });
    ranking
}

/// Express every year-round value as a fraction of its column's maximum.
/// Columns whose maximum is not positive are left unchanged.
pub fn scale_to_column_max(table: &WideTable) -> WideTable {
    let mut maxima: HashMap<&str, f64> = HashMap::new();
    for row in &table.rows {
        for (column, value) in &row.values {
            if is_year_round_column(column) {
                let max = maxima.entry(column.as_str()).or_insert(f64::NEG_INFINITY);
                *max = max.max(*value);
            }
        }
    }

    let mut scaled = table.clone();
    for row in &mut scaled.rows {
        for (column, value) in row.values.iter_mut() {
            if let Some(max) = maxima.get(column.as_str()) {
                if *max > 0.0 {
                    *value /= max;
                }
            }
        }
    }
    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoundPoints;
    use pretty_assertions::assert_eq;

    fn record(
        source: Source,
        year: i32,
        id: &str,
        points: RoundPoints,
    ) -> CompetitorRecord {
        let total = points.sum();
        CompetitorRecord::new(PseudoId::from(id), source, year, id.to_string(), points, total)
    }

    #[test]
    fn test_is_year_round_column() {
        assert!(is_year_round_column("2024_3"));
        assert!(is_year_round_column("2024_11_wsc"));
        assert!(!is_year_round_column("name"));
        assert!(!is_year_round_column("24_3"));
    }

    #[test]
    fn test_flatten_year_prunes_unplayed_rounds() {
        let a = record(
            Source::Primary,
            2024,
            "a",
            RoundPoints::new().with(1, Some(5.0)).with(2, None).with(3, None),
        );
        let b = record(
            Source::Primary,
            2024,
            "b",
            RoundPoints::new().with(1, None).with(2, Some(7.0)).with(3, None),
        );
        let (table, collapsed) = flatten_year(&[&a, &b], 2024);

        assert_eq!(table.columns, vec!["2024_1", "2024_2"]);
        assert_eq!(collapsed, 0);
        assert_eq!(table.value(&PseudoId::from("a"), "2024_1"), Some(5.0));
        // Present column, null for a competitor who did not play it.
        assert_eq!(table.value(&PseudoId::from("a"), "2024_2"), None);
        assert_eq!(table.value(&PseudoId::from("b"), "2024_2"), Some(7.0));
    }

    #[test]
    fn test_flatten_year_collapses_duplicate_ids() {
        let first = record(Source::Primary, 2024, "a", RoundPoints::new().with(1, None).with(2, Some(2.0)));
        let mut second = record(Source::Primary, 2024, "a", RoundPoints::new().with(1, Some(1.0)).with(2, Some(9.0)));
        second.country = Some("FR".to_string());

        let (table, collapsed) = flatten_year(&[&first, &second], 2024);
        assert_eq!(collapsed, 1);
        assert_eq!(table.len(), 1);
        let id = PseudoId::from("a");
        assert_eq!(table.value(&id, "2024_1"), Some(1.0));
        assert_eq!(table.value(&id, "2024_2"), Some(2.0));
        assert_eq!(table.get(&id).unwrap().country.as_deref(), Some("FR"));
    }

    #[test]
    fn test_flatten_source_first_seen_wins() {
        let mut early = record(Source::Primary, 2023, "a", RoundPoints::new().with(1, Some(1.0)));
        early.country = None;
        early.nickname = Some("old".to_string());
        let mut late = record(Source::Primary, 2024, "a", RoundPoints::new().with(1, Some(2.0)));
        late.country = Some("US".to_string());
        late.nickname = Some("new".to_string());
        let other = record(Source::Primary, 2024, "b", RoundPoints::new().with(8, Some(3.0)));

        // Input order deliberately puts the later year first.
        let flat = flatten_source(&[late, other, early]);
        let a = flat.table.get(&PseudoId::from("a")).unwrap();
        assert_eq!(a.nickname.as_deref(), Some("old"));
        assert_eq!(a.country.as_deref(), Some("US"));
        assert_eq!(a.total_points, Some(1.0));
        assert_eq!(flat.table.columns, vec!["2023_1", "2024_1", "2024_8"]);
        assert_eq!(flat.table.value(&PseudoId::from("b"), "2023_1"), None);
    }

    #[test]
    fn test_merge_sources_keeps_every_id() {
        let primary = vec![
            record(Source::Primary, 2024, "Alice (Nickless) - US", RoundPoints::new().with(1, Some(10.0))),
            record(Source::Primary, 2024, "Bob (nick) - FR", RoundPoints::new().with(1, Some(8.0))),
        ];
        let secondary = vec![
            record(Source::Secondary, 2024, "Bob (nick) - FR", RoundPoints::new().with(1, Some(8.0)))
                .with_official(true),
            record(Source::Secondary, 2024, "Zed", RoundPoints::new().with(2, Some(4.0)))
                .with_official(false),
        ];

        let wide = merge_sources(
            flatten_source(&primary).table,
            flatten_source(&secondary).table,
            ("_gp", "_wsc"),
        )
        .unwrap();

        let mut expected: BTreeSet<&str> = primary.iter().map(|r| r.pseudo_id.as_str()).collect();
        expected.extend(secondary.iter().map(|r| r.pseudo_id.as_str()));
        let ids: BTreeSet<&str> = wide.ids().map(PseudoId::as_str).collect();
        assert_eq!(ids, expected);
        assert_eq!(wide.len(), 3);

        assert_eq!(wide.columns, vec!["2024_1_gp", "2024_1_wsc", "2024_2_wsc"]);
        let bob = PseudoId::from("Bob (nick) - FR");
        assert_eq!(wide.value(&bob, "2024_1_gp"), Some(8.0));
        assert_eq!(wide.value(&bob, "2024_1_wsc"), Some(8.0));
        let zed = wide.get(&PseudoId::from("Zed")).unwrap();
        assert_eq!(zed.is_official, Some(false));
        assert!(zed.values.keys().all(|c| c.ends_with("_wsc")));
    }

    #[test]
    fn test_merge_sources_rejects_collisions() {
        let mut primary = WideTable::new();
        primary.add_column("2024_1".to_string());
        let mut secondary = WideTable::new();
        secondary.add_column("2024_1".to_string());

        let err = merge_sources(primary, secondary, ("_x", "_x")).unwrap_err();
        assert!(matches!(err, ReshapeError::ColumnCollision { .. }));
    }

    #[test]
    fn test_merge_long() {
        let primary = vec![
            record(Source::Primary, 2024, "bob", RoundPoints::new().with(1, Some(8.0)))
                .with_country(Some("FR".to_string())),
            record(Source::Primary, 2023, "alice", RoundPoints::new().with(1, Some(1.0))),
        ];
        let mut secondary = vec![
            record(Source::Secondary, 2024, "bob", RoundPoints::new().with(1, Some(6.0))),
            record(Source::Secondary, 2024, "zed", RoundPoints::new().with(1, Some(2.0))),
        ];
        secondary[0].display_name = "Bob Secondary".to_string();

        let merged = merge_long(&primary, &secondary);
        let keys: Vec<(&str, i32)> = merged.iter().map(|m| (m.pseudo_id.as_str(), m.year)).collect();
        assert_eq!(keys, vec![("alice", 2023), ("bob", 2024), ("zed", 2024)]);

        let bob = &merged[1];
        assert_eq!(bob.name, "bob");
        assert_eq!(bob.country.as_deref(), Some("FR"));
        assert_eq!(bob.combined_total(), 14.0);
        assert!(merged[2].primary.is_none());
        assert_eq!(merged[2].name, "zed");
    }

    #[test]
    fn test_ids_by_total_points() {
        let primary = vec![
            record(Source::Primary, 2023, "a", RoundPoints::new().with(1, Some(5.0))),
            record(Source::Primary, 2024, "a", RoundPoints::new().with(1, Some(5.0))),
            record(Source::Primary, 2024, "b", RoundPoints::new().with(1, Some(4.0))),
            record(Source::Primary, 2024, "c", RoundPoints::new().with(1, Some(10.0))),
        ];
        let secondary = vec![record(Source::Secondary, 2024, "b", RoundPoints::new().with(1, Some(6.0)))];

        let ranking = ids_by_total_points(&merge_long(&primary, &secondary));
        let order: Vec<(&str, f64)> = ranking
            .iter()
            .map(|t| (t.pseudo_id.as_str(), t.total_points))
            .collect();
        assert_eq!(order, vec![("a", 10.0), ("b", 10.0), ("c", 10.0)]);
        assert_eq!(ranking[0].years, 2);
    }

    #[test]
    fn test_scale_to_column_max() {
        let records = vec![
            record(Source::Primary, 2024, "a", RoundPoints::new().with(1, Some(50.0))),
            record(Source::Primary, 2024, "b", RoundPoints::new().with(1, Some(100.0))),
        ];
        let table = flatten_source(&records).table;
        let scaled = scale_to_column_max(&table);
        assert_eq!(scaled.value(&PseudoId::from("a"), "2024_1"), Some(0.5));
        assert_eq!(scaled.value(&PseudoId::from("b"), "2024_1"), Some(1.0));
        assert_eq!(table.value(&PseudoId::from("a"), "2024_1"), Some(50.0));
    }
}
