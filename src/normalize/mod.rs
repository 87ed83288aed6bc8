//! Round/schema normalization.
//!
//! Upstream tables arrive with canonical column names but drifting
//! contents: rounds that exist in some years only, numbers written as text,
//! optional columns that come and go. This module conforms each year to the
//! round calendar, aligns the years onto one schema, and extracts typed
//! rows.

mod table;

pub use table::*;

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ReferenceError, ReferenceTables};
use crate::models::{PrimaryRow, RoundPoints, SecondaryRow, Source, NAMELESS};

/// Normalization errors. All of them abort the load.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("{dataset} {year}: missing required column \"{column}\"")]
    SchemaDrift {
        dataset: Source,
        year: i32,
        column: String,
    },

    #[error("{dataset} {year}: column \"{column}\" is round {round}, which is not in the round calendar")]
    UnregisteredRound {
        dataset: Source,
        year: i32,
        round: u32,
        column: String,
    },

    #[error("{dataset} {year}: column \"{column}\" holds \"{value}\", which is not a number")]
    InvalidNumber {
        dataset: Source,
        year: i32,
        column: String,
        value: String,
    },

    #[error("{dataset} {year}: column \"{column}\" holds \"{value}\", which is not a yes/no flag")]
    InvalidFlag {
        dataset: Source,
        year: i32,
        column: String,
        value: String,
    },

    #[error("{dataset} {year}: column \"{column}\" looks like a round but is not spelled round_<k>")]
    MalformedRoundColumn {
        dataset: Source,
        year: i32,
        column: String,
    },

    #[error("Column alignment failed: {0}")]
    ColumnAlignment(String),

    #[error(transparent)]
    UnknownYear(#[from] ReferenceError),
}

pub const NAME: &str = "name";
pub const NICKNAME: &str = "nickname";
pub const COUNTRY: &str = "country";
pub const SOURCE_FILE: &str = "source_file";
pub const OFFICIAL: &str = "official";
pub const OFFICIAL_RANK: &str = "official_rank";
pub const UNOFFICIAL_RANK: &str = "unofficial_rank";
pub const TOTAL_POINTS: &str = "total_points";
pub const YEAR: &str = "year";

const PRIMARY_TEXT: &[&str] = &[NAME, NICKNAME, COUNTRY, SOURCE_FILE];
const SECONDARY_TEXT: &[&str] = &[NAME];
const PRIMARY_NUMBERS: &[&str] = &[TOTAL_POINTS];
const SECONDARY_NUMBERS: &[&str] = &[OFFICIAL_RANK, UNOFFICIAL_RANK, TOTAL_POINTS];

fn required_columns(source: Source) -> &'static [&'static str] {
    match source {
        Source::Primary => &[NAME, TOTAL_POINTS],
        Source::Secondary => &[NAME, OFFICIAL, TOTAL_POINTS],
    }
}

pub(crate) const ROUND_PREFIX: &str = "round_";

/// Column name for a round.
pub fn round_column(round: u32) -> String {
    format!("{}{}", ROUND_PREFIX, round)
}

/// One upstream table plus where it came from.
#[derive(Debug, Clone)]
pub struct YearTable {
    pub year: i32,
    /// File name, used as `source_file` when the table has none.
    pub label: String,
    pub table: Table,
}

impl YearTable {
    pub fn new(year: i32, label: impl Into<String>, table: Table) -> Self {
        Self {
            year,
            label: label.into(),
            table,
        }
    }
}

fn thousands_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid regex literal"))
}

/// Parse a number written as text.
///
/// Blank strings and dash placeholders are null. Thousands separators are
/// accepted only in well-formed groups of three.
pub fn parse_number(text: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| matches!(c, '-' | '–' | '—')) {
        return Ok(None);
    }
    let grouped = thousands_pattern().is_match(trimmed);
    if grouped {
        return trimmed.replace(',', "").parse::<f64>().map(Some);
    }
    trimmed.parse::<f64>().map(Some)
}

fn parse_flag(text: &str) -> Option<Option<bool>> {
    match text.trim().to_ascii_lowercase().as_str() {
        "" => Some(None),
        "y" | "yes" | "true" | "1" | "official" => Some(Some(true)),
        "n" | "no" | "false" | "0" | "unofficial" => Some(Some(false)),
        _ => None,
    }
}

/// Conform one year's table to the canonical schema of its source.
///
/// Checks required columns and registered rounds, converts canonical
/// columns to their types, adds registered rounds the table lacks as null
/// columns and stamps a `year` column. Non-canonical columns are dropped.
pub fn conform(
    source: Source,
    input: YearTable,
    reference: &ReferenceTables,
) -> Result<Table, NormalizeError> {
    let YearTable { year, label, table } = input;
    let rounds = reference.rounds_for(source, year)?;

    for column in required_columns(source) {
        if !table.has_column(column) {
            return Err(NormalizeError::SchemaDrift {
                dataset: source,
                year,
                column: column.to_string(),
            });
        }
    }

    let (text_columns, number_columns) = match source {
        Source::Primary => (PRIMARY_TEXT, PRIMARY_NUMBERS),
        Source::Secondary => (SECONDARY_TEXT, SECONDARY_NUMBERS),
    };

    let mut keep: Vec<String> = Vec::new();
    let mut round_columns: Vec<String> = Vec::new();
    for name in table.column_names() {
        if let Some(round) = round_of_column(name) {
            if !rounds.contains(round) {
                return Err(NormalizeError::UnregisteredRound {
                    dataset: source,
                    year,
                    round,
                    column: name.to_string(),
                });
            }
            round_columns.push(name.to_string());
            keep.push(name.to_string());
        } else if name.starts_with(ROUND_PREFIX) {
            return Err(NormalizeError::MalformedRoundColumn {
                dataset: source,
                year,
                column: name.to_string(),
            });
        } else if text_columns.contains(&name)
            || number_columns.contains(&name)
            || (source == Source::Secondary && name == OFFICIAL)
        {
            keep.push(name.to_string());
        } else {
            debug!("{} {}: dropping non-canonical column \"{}\"", source, year, name);
        }
    }

    let keep_refs: Vec<&str> = keep.iter().map(String::as_str).collect();
    let mut out = table.select(&keep_refs);

    for column in text_columns {
        out.map_column(column, ColumnType::Text, |cell| Ok(to_text(cell)))?;
        out.add_column(ColumnDef::new(*column, ColumnType::Text), Cell::Null);
    }

    for column in number_columns
        .iter()
        .copied()
        .chain(round_columns.iter().map(String::as_str))
    {
        out.map_column(column, ColumnType::Number, |cell| {
            to_number(cell).map_err(|value| NormalizeError::InvalidNumber {
                dataset: source,
                year,
                column: column.to_string(),
                value,
            })
        })?;
        out.add_column(ColumnDef::new(column, ColumnType::Number), Cell::Null);
    }

    if source == Source::Secondary {
        out.map_column(OFFICIAL, ColumnType::Flag, |cell| {
            to_flag(cell).map_err(|value| NormalizeError::InvalidFlag {
                dataset: source,
                year,
                column: OFFICIAL.to_string(),
                value,
            })
        })?;
    }

    if source == Source::Primary {
        // Rows without provenance are attributed to the file they came from.
        out.map_column(SOURCE_FILE, ColumnType::Text, |cell| {
            Ok(match cell {
                Cell::Null => Cell::Text(label.clone()),
                other => other.clone(),
            })
        })?;
    }

    for round in rounds.iter() {
        out.add_column(ColumnDef::new(round_column(round), ColumnType::Number), Cell::Null);
    }
    out.add_column(ColumnDef::new(YEAR, ColumnType::Number), Cell::Number(year as f64));

    Ok(out)
}

fn to_text(cell: &Cell) -> Cell {
    match cell.as_text() {
        Some(s) if !s.trim().is_empty() => Cell::Text(s),
        _ => Cell::Null,
    }
}

fn to_number(cell: &Cell) -> Result<Cell, String> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Number(n) => Ok(Cell::Number(*n)),
        Cell::Text(s) => match parse_number(s) {
            Ok(Some(n)) => Ok(Cell::Number(n)),
            Ok(None) => Ok(Cell::Null),
            Err(_) => Err(s.clone()),
        },
        Cell::Flag(b) => Err(b.to_string()),
    }
}

fn to_flag(cell: &Cell) -> Result<Cell, String> {
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Flag(b) => Ok(Cell::Flag(*b)),
        Cell::Number(n) if *n == 1.0 => Ok(Cell::Flag(true)),
        Cell::Number(n) if *n == 0.0 => Ok(Cell::Flag(false)),
        Cell::Text(s) => match parse_flag(s) {
            Some(Some(b)) => Ok(Cell::Flag(b)),
            Some(None) => Ok(Cell::Null),
            None => Err(s.clone()),
        },
        other => Err(other.as_text().unwrap_or_default()),
    }
}

/// Conform, align and stack every year of one source.
pub fn stack_years(
    source: Source,
    inputs: Vec<YearTable>,
    reference: &ReferenceTables,
) -> Result<Table, NormalizeError> {
    let mut conformed = Vec::with_capacity(inputs.len());
    for input in inputs {
        let year = input.year;
        let table = conform(source, input, reference)?;
        debug!("{} {}: {} rows conformed", source, year, table.len());
        conformed.push(table);
    }
    let aligned = align_tables(conformed)?;
    Table::concat(&aligned)
}

fn text(table: &Table, row: usize, column: &str) -> Option<String> {
    match table.cell(row, column) {
        Cell::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn number(table: &Table, row: usize, column: &str) -> Option<f64> {
    match table.cell(row, column) {
        Cell::Number(n) => Some(*n),
        _ => None,
    }
}

fn row_year(table: &Table, row: usize) -> Result<i32, NormalizeError> {
    number(table, row, YEAR).map(|y| y as i32).ok_or_else(|| {
        NormalizeError::ColumnAlignment(format!("row {} has no year; tables must be conformed first", row))
    })
}

fn rank(
    table: &Table,
    row: usize,
    column: &str,
    dataset: Source,
    year: i32,
) -> Result<Option<u32>, NormalizeError> {
    match number(table, row, column) {
        None => Ok(None),
        Some(n) if n >= 1.0 && n.fract() == 0.0 => Ok(Some(n as u32)),
        Some(n) => Err(NormalizeError::InvalidNumber {
            dataset,
            year,
            column: column.to_string(),
            value: n.to_string(),
        }),
    }
}

fn round_points(
    table: &Table,
    row: usize,
    source: Source,
    year: i32,
    reference: &ReferenceTables,
) -> Result<RoundPoints, NormalizeError> {
    let rounds = reference.rounds_for(source, year)?;
    Ok(rounds
        .iter()
        .map(|round| (round, number(table, row, &round_column(round))))
        .collect())
}

/// A null total falls back to the sum of recorded rounds.
fn resolve_total(total: Option<f64>, points: &RoundPoints) -> Option<f64> {
    total.or_else(|| points.sum())
}

/// Typed primary rows from a stacked table.
pub fn primary_rows(
    table: &Table,
    reference: &ReferenceTables,
) -> Result<Vec<PrimaryRow>, NormalizeError> {
    let mut rows = Vec::with_capacity(table.len());
    for i in 0..table.len() {
        let year = row_year(table, i)?;
        let points = round_points(table, i, Source::Primary, year, reference)?;
        let total_points = resolve_total(number(table, i, TOTAL_POINTS), &points);
        rows.push(PrimaryRow {
            year,
            name: text(table, i, NAME),
            nickname: text(table, i, NICKNAME),
            country: text(table, i, COUNTRY),
            source_file: text(table, i, SOURCE_FILE).unwrap_or_default(),
            points,
            total_points,
        });
    }
    Ok(rows)
}

/// Typed secondary rows from a stacked table.
///
/// In years registered with a `playoff_prefix`, official competitors whose
/// official rank is within the prefix carry that rank as an embedded
/// placement.
pub fn secondary_rows(
    table: &Table,
    reference: &ReferenceTables,
) -> Result<Vec<SecondaryRow>, NormalizeError> {
    let mut rows = Vec::with_capacity(table.len());
    for i in 0..table.len() {
        let year = row_year(table, i)?;
        let points = round_points(table, i, Source::Secondary, year, reference)?;
        let total_points = resolve_total(number(table, i, TOTAL_POINTS), &points);
        let official = matches!(table.cell(i, OFFICIAL), Cell::Flag(true));
        let official_rank = rank(table, i, OFFICIAL_RANK, Source::Secondary, year)?;
        let unofficial_rank = rank(table, i, UNOFFICIAL_RANK, Source::Secondary, year)?;

        let embedded_placement = match (reference.secondary_format(year).playoff_prefix, official_rank) {
            (Some(prefix), Some(r)) if official && r <= prefix => Some(r),
            _ => None,
        };

        rows.push(SecondaryRow {
            year,
            raw_name: text(table, i, NAME).unwrap_or_else(|| NAMELESS.to_string()),
            official,
            official_rank,
            unofficial_rank,
            embedded_placement,
            points,
            total_points,
        });
    }
    Ok(rows)
}

/// Conform, stack and type every primary year.
pub fn normalize_primary(
    inputs: Vec<YearTable>,
    reference: &ReferenceTables,
) -> Result<Vec<PrimaryRow>, NormalizeError> {
    let years = inputs.len();
    let stacked = stack_years(Source::Primary, inputs, reference)?;
    let rows = primary_rows(&stacked, reference)?;
    info!("Normalized {} primary rows from {} years", rows.len(), years);
    Ok(rows)
}

/// Conform, stack and type every secondary year.
pub fn normalize_secondary(
    inputs: Vec<YearTable>,
    reference: &ReferenceTables,
) -> Result<Vec<SecondaryRow>, NormalizeError> {
    let years = inputs.len();
    let stacked = stack_years(Source::Secondary, inputs, reference)?;
    let rows = secondary_rows(&stacked, reference)?;
    info!("Normalized {} secondary rows from {} years", rows.len(), years);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RoundSet, SecondaryYearFormat};
    use serde_json::{json, Map, Value};

    fn table(values: Vec<Value>) -> Table {
        let records: Vec<Map<String, Value>> = values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        Table::from_records(&records)
    }

    fn reference() -> ReferenceTables {
        ReferenceTables::new("test")
            .with_rounds(Source::Primary, 2014, RoundSet::count(2))
            .with_rounds(Source::Primary, 2015, RoundSet::count(3))
            .with_rounds(Source::Secondary, 2014, RoundSet::list(&[1, 2, 10]))
            .with_secondary_format(2014, SecondaryYearFormat { playoff_prefix: Some(2) })
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.5").unwrap(), Some(1234.5));
        assert_eq!(parse_number("12,345,678").unwrap(), Some(12345678.0));
        assert_eq!(parse_number(" 42 ").unwrap(), Some(42.0));
        assert_eq!(parse_number("-3.5").unwrap(), Some(-3.5));
        assert_eq!(parse_number("").unwrap(), None);
        assert_eq!(parse_number("-").unwrap(), None);
        assert_eq!(parse_number("---").unwrap(), None);
        assert!(parse_number("12a").is_err());
        assert!(parse_number("1,23").is_err());
    }

    #[test]
    fn test_conform_fills_registered_rounds() {
        let input = YearTable::new(
            2015,
            "2015.jsonl",
            table(vec![json!({"name": "Alice", "total_points": "1,200", "round_1": 700})]),
        );
        let out = conform(Source::Primary, input, &reference()).unwrap();

        assert_eq!(out.column_type("round_2"), Some(ColumnType::Number));
        assert_eq!(out.column_type("round_3"), Some(ColumnType::Number));
        assert_eq!(out.cell(0, "round_3"), &Cell::Null);
        assert_eq!(out.cell(0, TOTAL_POINTS), &Cell::Number(1200.0));
        assert_eq!(out.cell(0, SOURCE_FILE), &Cell::Text("2015.jsonl".to_string()));
        assert_eq!(out.cell(0, YEAR), &Cell::Number(2015.0));
        assert!(out.has_column(NICKNAME));
    }

    #[test]
    fn test_conform_rejects_unregistered_round() {
        let input = YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![json!({"name": "Alice", "total_points": 5, "round_8": 5})]),
        );
        let err = conform(Source::Primary, input, &reference()).unwrap_err();
        assert!(matches!(err, NormalizeError::UnregisteredRound { round: 8, year: 2014, .. }));
    }

    #[test]
    fn test_conform_rejects_padded_round_column() {
        let input = YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![json!({"name": "Alice", "total_points": 10, "round_01": 10})]),
        );
        let err = conform(Source::Primary, input, &reference()).unwrap_err();
        match err {
            NormalizeError::MalformedRoundColumn { column, year, .. } => {
                assert_eq!(column, "round_01");
                assert_eq!(year, 2014);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conform_rejects_missing_required_column() {
        let input = YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![json!({"name": "Alice", "total_points": 5})]),
        );
        let err = conform(Source::Secondary, input, &reference()).unwrap_err();
        match err {
            NormalizeError::SchemaDrift { column, .. } => assert_eq!(column, OFFICIAL),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conform_rejects_unknown_year() {
        let input = YearTable::new(
            2030,
            "2030.jsonl",
            table(vec![json!({"name": "Alice", "total_points": 5})]),
        );
        let err = conform(Source::Primary, input, &reference()).unwrap_err();
        assert!(matches!(err, NormalizeError::UnknownYear(_)));
    }

    #[test]
    fn test_conform_rejects_garbage_number() {
        let input = YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![json!({"name": "Alice", "total_points": "lots"})]),
        );
        let err = conform(Source::Primary, input, &reference()).unwrap_err();
        match err {
            NormalizeError::InvalidNumber { column, value, .. } => {
                assert_eq!(column, TOTAL_POINTS);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_normalize_primary_across_years() {
        let inputs = vec![
            YearTable::new(
                2014,
                "2014.jsonl",
                table(vec![json!({"name": "Alice", "nickname": "ali", "country": "US",
                                  "total_points": null, "round_1": 10, "round_2": 5})]),
            ),
            YearTable::new(
                2015,
                "2015.jsonl",
                table(vec![
                    json!({"name": "Bob", "total_points": 30, "round_3": 30}),
                    json!({"name": "Carol", "total_points": null}),
                ]),
            ),
        ];

        let rows = normalize_primary(inputs, &reference()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].year, 2014);
        assert_eq!(rows[0].total_points, Some(15.0));
        // 2014 registers two rounds only, even though round_3 exists after stacking.
        assert_eq!(rows[0].points.rounds().collect::<Vec<_>>(), vec![1, 2]);

        assert_eq!(rows[1].nickname, None);
        assert_eq!(rows[1].points.get(3), Some(30.0));
        assert_eq!(rows[2].total_points, None);
    }

    #[test]
    fn test_normalize_secondary_embedded_placements() {
        let inputs = vec![YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![
                json!({"name": "Alice", "official": "Y", "official_rank": 2, "total_points": 90}),
                json!({"name": "Bob", "official": "Y", "official_rank": 3, "total_points": 95}),
                json!({"name": "Carl", "official": "N", "official_rank": 1, "total_points": 99}),
                json!({"name": "Dana", "official": true, "total_points": "-", "round_10": "1,000"}),
            ]),
        )];

        let rows = normalize_secondary(inputs, &reference()).unwrap();
        assert_eq!(rows[0].embedded_placement, Some(2));
        assert_eq!(rows[1].embedded_placement, None);
        assert!(!rows[2].official);
        assert_eq!(rows[2].embedded_placement, None);
        assert_eq!(rows[3].total_points, Some(1000.0));
        assert_eq!(rows[3].points.rounds().collect::<Vec<_>>(), vec![1, 2, 10]);
    }

    #[test]
    fn test_secondary_invalid_flag() {
        let inputs = vec![YearTable::new(
            2014,
            "2014.jsonl",
            table(vec![json!({"name": "Alice", "official": "maybe", "total_points": 1})]),
        )];
        let err = normalize_secondary(inputs, &reference()).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidFlag { .. }));
    }
}
