//! One full load cycle.
//!
//! normalized inputs -> normalize -> identities (primary) / linking
//! (secondary) -> standings per source -> long merge, wide reshape and
//! lifetime ranking. Every step is a pure function of its inputs, so two
//! runs over the same files and reference tables write identical outputs.

use std::fs;

use thiserror::Error;
use tracing::{info, warn};

use crate::calculate::assign_standings;
use crate::config::{ConfigError, OutputConfig, ReferenceError, ReferenceTables};
use crate::identity::build_identities;
use crate::identity::linker::link_secondary;
use crate::models::{
    CompetitorRecord, Fingerprint, LifetimeTotal, MergedRecord, RunReport, Source, WideTable,
};
use crate::normalize::{normalize_primary, normalize_secondary, NormalizeError, Table, YearTable};
use crate::reshape::{
    flatten_source, ids_by_total_points, merge_long, merge_sources, scale_to_column_max,
    ReshapeError,
};
use crate::storage::{
    discover_year_files, write_json, JsonlWriter, ParquetWriter, StorageConfig, StorageError,
    TableType,
};

/// Load errors. Any of them aborts the load.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Reshape(#[from] ReshapeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-year tables of both sources plus a fingerprint of what was read.
#[derive(Debug, Clone)]
pub struct LoadInputs {
    pub primary: Vec<YearTable>,
    pub secondary: Vec<YearTable>,
    pub fingerprint: Fingerprint,
}

/// Everything one load produces.
#[derive(Debug, Clone)]
pub struct LoadOutput {
    pub primary: Vec<CompetitorRecord>,
    pub secondary: Vec<CompetitorRecord>,
    pub merged: Vec<MergedRecord>,
    pub wide: WideTable,
    /// `wide` with each round as a fraction of that round's best score.
    pub wide_scaled: WideTable,
    pub lifetime: Vec<LifetimeTotal>,
    pub report: RunReport,
}

impl LoadOutput {
    /// Both sources' records, primary first.
    pub fn all_records(&self) -> Vec<CompetitorRecord> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .cloned()
            .collect()
    }
}

fn read_source(
    storage: &StorageConfig,
    source: Source,
    parts: &mut Vec<Vec<u8>>,
) -> Result<Vec<YearTable>, PipelineError> {
    let files = discover_year_files(&storage.source_dir(source))?;
    let mut years = Vec::with_capacity(files.len());
    for file in files {
        let bytes = fs::read(&file.path).map_err(StorageError::from)?;
        parts.push(format!("{}/{}", source, file.label()).into_bytes());
        parts.push(bytes);

        let rows = file.read_rows()?;
        years.push(YearTable::new(file.year, file.label(), Table::from_records(&rows)));
    }
    info!("Read {} {} year files", years.len(), source);
    Ok(years)
}

/// Read every per-year input file of both sources.
///
/// The fingerprint covers the reference version and each file's source,
/// name and bytes.
pub fn read_inputs(
    storage: &StorageConfig,
    reference: &ReferenceTables,
) -> Result<LoadInputs, PipelineError> {
    let mut parts: Vec<Vec<u8>> = vec![reference.version.clone().into_bytes()];
    let primary = read_source(storage, Source::Primary, &mut parts)?;
    let secondary = read_source(storage, Source::Secondary, &mut parts)?;

    Ok(LoadInputs {
        primary,
        secondary,
        fingerprint: Fingerprint::generate(&parts),
    })
}

fn years_of(records: &[CompetitorRecord]) -> Vec<i32> {
    let mut years: Vec<i32> = records.iter().map(|r| r.year).collect();
    years.sort_unstable();
    years.dedup();
    years
}

/// Run the whole reconciliation over already-read inputs.
pub fn run(
    inputs: LoadInputs,
    reference: &ReferenceTables,
    output: &OutputConfig,
) -> Result<LoadOutput, PipelineError> {
    let LoadInputs {
        primary,
        secondary,
        fingerprint,
    } = inputs;

    let primary_rows = normalize_primary(primary, reference)?;
    let secondary_rows = normalize_secondary(secondary, reference)?;

    let identity = build_identities(primary_rows, &reference.corrections);
    let mut primary = identity.records;
    let primary_standings = assign_standings(&mut primary, Source::Primary, reference)?;

    let link = link_secondary(&secondary_rows, &primary, &reference.identity_overrides);
    let mut secondary = link.records;
    let secondary_standings = assign_standings(&mut secondary, Source::Secondary, reference)?;

    let flat_primary = flatten_source(&primary);
    let flat_secondary = flatten_source(&secondary);
    let collapsed_wide_rows = flat_primary.collapsed_rows + flat_secondary.collapsed_rows;
    if collapsed_wide_rows > 0 {
        warn!(
            "{} rows shared a pseudo-id with another row of the same year and were folded",
            collapsed_wide_rows
        );
    }
    let wide = merge_sources(
        flat_primary.table,
        flat_secondary.table,
        (
            output.primary_suffix.as_str(),
            output.secondary_suffix.as_str(),
        ),
    )?;

    let wide_scaled = scale_to_column_max(&wide);
    let merged = merge_long(&primary, &secondary);
    let lifetime = ids_by_total_points(&merged);

    let report = RunReport {
        fingerprint,
        reference_version: reference.version.clone(),
        primary_years: years_of(&primary),
        secondary_years: years_of(&secondary),
        identity: identity.stats,
        linking: link.stats,
        primary_standings,
        secondary_standings,
        wide_rows: wide.len(),
        wide_columns: wide.columns.len(),
        collapsed_wide_rows,
    };
    info!("{}", report.summary());

    Ok(LoadOutput {
        primary,
        secondary,
        merged,
        wide,
        wide_scaled,
        lifetime,
        report,
    })
}

/// Read inputs from the data directory and run the load.
pub fn load(
    storage: &StorageConfig,
    reference: &ReferenceTables,
    output: &OutputConfig,
) -> Result<LoadOutput, PipelineError> {
    let inputs = read_inputs(storage, reference)?;
    run(inputs, reference, output)
}

/// Write every output file, replacing previous ones.
pub fn write_outputs(
    storage: &StorageConfig,
    output: &OutputConfig,
    result: &LoadOutput,
) -> Result<(), PipelineError> {
    JsonlWriter::new(storage.records_path(Source::Primary)).write_all(&result.primary)?;
    JsonlWriter::new(storage.records_path(Source::Secondary)).write_all(&result.secondary)?;
    JsonlWriter::new(storage.merged_long_path()).write_all(&result.merged)?;
    JsonlWriter::new(storage.lifetime_ranking_path()).write_all(&result.lifetime)?;
    write_json(&storage.run_report_path(), &result.report)?;

    if output.write_parquet {
        let writer = ParquetWriter::new(storage.clone());
        writer.write_wide(TableType::Wide, &result.wide)?;
        writer.write_wide(TableType::WideScaled, &result.wide_scaled)?;
        writer.write_merged_long(&result.merged)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundSet;
    use crate::models::{MatchRule, PseudoId};
    use serde_json::{json, Map, Value};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn table(values: Vec<Value>) -> Table {
        let records: Vec<Map<String, Value>> = values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        Table::from_records(&records)
    }

    fn reference() -> ReferenceTables {
        ReferenceTables::new("fixture")
            .with_rounds(Source::Primary, 2023, RoundSet::count(2))
            .with_rounds(Source::Primary, 2024, RoundSet::count(2))
            .with_rounds(Source::Secondary, 2024, RoundSet::list(&[1, 2, 10]))
            .with_identity_override("Bob FR", "Bob (nick) - FR")
    }

    fn inputs() -> LoadInputs {
        LoadInputs {
            primary: vec![
                YearTable::new(
                    2023,
                    "2023.jsonl",
                    table(vec![json!({"name": "Carol", "country": "DE", "total_points": 3, "round_1": 3})]),
                ),
                YearTable::new(
                    2024,
                    "2024.jsonl",
                    table(vec![
                        json!({"name": "Alice", "nickname": "", "country": "US", "total_points": 10, "round_1": 10}),
                        json!({"name": "Bob", "nickname": "nick", "country": "FR", "total_points": 8, "round_1": 8}),
                    ]),
                ),
            ],
            secondary: vec![YearTable::new(
                2024,
                "2024.jsonl",
                table(vec![
                    json!({"name": "Bob FR", "official": true, "total_points": 8, "round_1": 8}),
                    json!({"name": "Dave Unknown", "official": false, "total_points": 2, "round_2": 2}),
                ]),
            )],
            fingerprint: Fingerprint::generate(&["fixture"]),
        }
    }

    #[test]
    fn test_override_links_and_merges_both_sources() {
        let output = run(inputs(), &reference(), &OutputConfig::default()).unwrap();

        let bob = PseudoId::from("Bob (nick) - FR");
        let linked = &output.secondary[0];
        assert_eq!(linked.pseudo_id, bob);
        assert_eq!(linked.match_rule, Some(MatchRule::Override));

        let merged = output
            .merged
            .iter()
            .find(|m| m.pseudo_id == bob && m.year == 2024)
            .unwrap();
        assert_eq!(merged.primary.as_ref().unwrap().points.get(1), Some(8.0));
        assert_eq!(merged.secondary.as_ref().unwrap().points.get(1), Some(8.0));

        assert_eq!(output.wide.value(&bob, "2024_1_gp"), Some(8.0));
        assert_eq!(output.wide.value(&bob, "2024_1_wsc"), Some(8.0));

        // Alice's 10 is the best primary round 1 score that year.
        let alice = PseudoId::from("Alice (Nickless) - US");
        assert_eq!(output.wide_scaled.value(&alice, "2024_1_gp"), Some(1.0));
        assert_eq!(output.wide_scaled.value(&bob, "2024_1_gp"), Some(0.8));
        assert_eq!(output.wide_scaled.value(&bob, "2024_1_wsc"), Some(1.0));
    }

    #[test]
    fn test_playoff_scenario() {
        let reference = reference().with_playoff(Source::Primary, 2024, &["Alice (Nickless) - US"]);
        let mut inputs = inputs();
        inputs.primary[1] = YearTable::new(
            2024,
            "2024.jsonl",
            table(vec![
                json!({"name": "Alice", "country": "US", "total_points": 8}),
                json!({"name": "Bob", "nickname": "nick", "country": "FR", "total_points": 10}),
            ]),
        );

        let output = run(inputs, &reference, &OutputConfig::default()).unwrap();
        let ranks: Vec<(&str, Option<u32>, Option<u32>)> = output
            .primary
            .iter()
            .filter(|r| r.year == 2024)
            .map(|r| (r.pseudo_id.as_str(), r.rank_preliminary, r.rank_final))
            .collect();
        assert_eq!(
            ranks,
            vec![
                ("Alice (Nickless) - US", Some(2), Some(1)),
                ("Bob (nick) - FR", Some(1), Some(2)),
            ]
        );
    }

    #[test]
    fn test_no_row_loss_and_pruning() {
        let output = run(inputs(), &reference(), &OutputConfig::default()).unwrap();

        let union: BTreeSet<&PseudoId> = output
            .primary
            .iter()
            .chain(output.secondary.iter())
            .map(|r| &r.pseudo_id)
            .collect();
        let wide: BTreeSet<&PseudoId> = output.wide.ids().collect();
        assert_eq!(wide, union);
        assert_eq!(output.wide.len(), union.len());

        // 2024 secondary registers round 10, but nobody scored in it.
        assert!(!output.wide.has_column("2024_10_wsc"));
        assert!(output.wide.has_column("2024_2_wsc"));
        // 2023 primary registers round 2, but nobody scored in it.
        assert!(!output.wide.has_column("2023_2_gp"));

        assert_eq!(output.report.linking.fallbacks(), 1);
        assert_eq!(output.report.primary_years, vec![2023, 2024]);
        assert_eq!(output.lifetime[0].pseudo_id, PseudoId::from("Bob (nick) - FR"));
    }

    #[test]
    fn test_unknown_year_aborts_load() {
        let mut inputs = inputs();
        inputs.secondary.push(YearTable::new(
            2019,
            "2019.jsonl",
            table(vec![json!({"name": "X", "official": true, "total_points": 1})]),
        ));
        let err = run(inputs, &reference(), &OutputConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Normalize(NormalizeError::UnknownYear(_))
        ));
    }

    fn write_inputs(storage: &StorageConfig) {
        let primary = storage.source_dir(Source::Primary);
        let secondary = storage.source_dir(Source::Secondary);
        fs::create_dir_all(&primary).unwrap();
        fs::create_dir_all(&secondary).unwrap();
        fs::write(
            primary.join("2024.jsonl"),
            "{\"name\":\"Alice\",\"country\":\"US\",\"total_points\":\"1,000\",\"round_1\":1000}\n\
             {\"name\":\"Bob\",\"nickname\":\"nick\",\"country\":\"FR\",\"total_points\":800,\"round_2\":800}\n",
        )
        .unwrap();
        fs::write(
            secondary.join("2024.jsonl"),
            "{\"name\":\"Bob FR\",\"official\":\"Y\",\"total_points\":8,\"round_1\":8}\n",
        )
        .unwrap();
    }

    #[test]
    fn test_repeated_runs_write_identical_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageConfig::new(temp_dir.path().to_path_buf());
        write_inputs(&storage);
        let reference = reference();
        let output_config = OutputConfig::default();

        let snapshot = |storage: &StorageConfig| -> Vec<Vec<u8>> {
            [
                storage.records_path(Source::Primary),
                storage.records_path(Source::Secondary),
                storage.merged_long_path(),
                storage.lifetime_ranking_path(),
                storage.run_report_path(),
                storage.parquet_dir().join("wide.parquet"),
                storage.parquet_dir().join("wide_scaled.parquet"),
            ]
            .iter()
            .map(|p| fs::read(p).unwrap())
            .collect()
        };

        let first = load(&storage, &reference, &output_config).unwrap();
        write_outputs(&storage, &output_config, &first).unwrap();
        let before = snapshot(&storage);

        let second = load(&storage, &reference, &output_config).unwrap();
        write_outputs(&storage, &output_config, &second).unwrap();
        let after = snapshot(&storage);

        assert_eq!(before, after);
        assert_eq!(first.report.fingerprint, second.report.fingerprint);
    }

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageConfig::new(temp_dir.path().to_path_buf());
        write_inputs(&storage);

        let before = read_inputs(&storage, &reference()).unwrap().fingerprint;
        fs::write(
            storage.source_dir(Source::Secondary).join("2024.jsonl"),
            "{\"name\":\"Bob FR\",\"official\":\"Y\",\"total_points\":9,\"round_1\":9}\n",
        )
        .unwrap();
        let after = read_inputs(&storage, &reference()).unwrap().fingerprint;

        assert_ne!(before, after);
    }
}
