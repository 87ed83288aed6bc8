//! Parquet storage for analytics.
//!
//! The wide table has one column per year-round, so its schema is built
//! from the table itself instead of being fixed. Files are rebuilt from
//! scratch on every load.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int32Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};

use super::{StorageConfig, StorageError};
use crate::models::{MergedRecord, SourceStanding, WideTable};

/// Parquet table types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Wide,
    /// Wide table with every round as a fraction of its column maximum.
    WideScaled,
    MergedLong,
}

impl TableType {
    /// Get the filename for this table.
    pub fn filename(&self) -> &'static str {
        match self {
            TableType::Wide => "wide.parquet",
            TableType::WideScaled => "wide_scaled.parquet",
            TableType::MergedLong => "merged_long.parquet",
        }
    }
}

/// Schema definitions for Parquet tables.
pub mod schemas {
    use super::*;

    /// Descriptive columns, then one nullable float per year-round column.
    pub fn wide_schema(table: &WideTable) -> Schema {
        let mut fields = vec![
            Field::new("pseudo_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("nickname", DataType::Utf8, true),
            Field::new("country", DataType::Utf8, true),
            Field::new("is_official", DataType::Boolean, true),
            Field::new("total_points", DataType::Float64, true),
        ];
        fields.extend(
            table
                .columns
                .iter()
                .map(|c| Field::new(c.as_str(), DataType::Float64, true)),
        );
        Schema::new(fields)
    }

    /// Schema for the merged long table.
    pub fn merged_long_schema() -> Schema {
        Schema::new(vec![
            Field::new("pseudo_id", DataType::Utf8, false),
            Field::new("year", DataType::Int32, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("nickname", DataType::Utf8, true),
            Field::new("country", DataType::Utf8, true),
            Field::new("primary_total", DataType::Float64, true),
            Field::new("primary_rank_preliminary", DataType::UInt32, true),
            Field::new("primary_rank_final", DataType::UInt32, true),
            Field::new("secondary_name", DataType::Utf8, true),
            Field::new("secondary_official", DataType::Boolean, true),
            Field::new("secondary_total", DataType::Float64, true),
            Field::new("secondary_rank_preliminary", DataType::UInt32, true),
            Field::new("secondary_rank_final", DataType::UInt32, true),
            Field::new("secondary_rank_official", DataType::UInt32, true),
        ])
    }
}

/// Parquet file writer.
pub struct ParquetWriter {
    config: StorageConfig,
}

impl ParquetWriter {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Get the path for a table.
    pub fn table_path(&self, table: TableType) -> PathBuf {
        self.config.parquet_dir().join(table.filename())
    }

    /// Ensure the directory exists.
    fn ensure_dir(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Write a wide table (`Wide` or `WideScaled`) to Parquet.
    pub fn write_wide(&self, kind: TableType, table: &WideTable) -> Result<PathBuf, StorageError> {
        let path = self.table_path(kind);
        self.ensure_dir(&path)?;

        let schema = Arc::new(schemas::wide_schema(table));
        let rows = &table.rows;

        let ids: Vec<&str> = rows.iter().map(|r| r.pseudo_id.as_str()).collect();
        let names: Vec<Option<&str>> = rows.iter().map(|r| r.name.as_deref()).collect();
        let nicknames: Vec<Option<&str>> = rows.iter().map(|r| r.nickname.as_deref()).collect();
        let countries: Vec<Option<&str>> = rows.iter().map(|r| r.country.as_deref()).collect();
        let official: Vec<Option<bool>> = rows.iter().map(|r| r.is_official).collect();
        let totals: Vec<Option<f64>> = rows.iter().map(|r| r.total_points).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(StringArray::from(nicknames)),
            Arc::new(StringArray::from(countries)),
            Arc::new(BooleanArray::from(official)),
            Arc::new(Float64Array::from(totals)),
        ];
        for column in &table.columns {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|r| r.values.get(column).copied())
                .collect();
            columns.push(Arc::new(Float64Array::from(values)));
        }

        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        self.write_batch(&path, &schema, &batch)?;

        info!(
            "Wrote {} wide rows x {} round columns to {:?}",
            rows.len(),
            table.columns.len(),
            path
        );
        Ok(path)
    }

    /// Write the merged long table to Parquet.
    pub fn write_merged_long(&self, records: &[MergedRecord]) -> Result<PathBuf, StorageError> {
        let path = self.table_path(TableType::MergedLong);
        self.ensure_dir(&path)?;

        let schema = Arc::new(schemas::merged_long_schema());

        let primary = |f: fn(&SourceStanding) -> Option<u32>| -> Vec<Option<u32>> {
            records
                .iter()
                .map(|r| r.primary.as_ref().and_then(f))
                .collect()
        };
        let secondary = |f: fn(&SourceStanding) -> Option<u32>| -> Vec<Option<u32>> {
            records
                .iter()
                .map(|r| r.secondary.as_ref().and_then(f))
                .collect()
        };

        let ids: Vec<&str> = records.iter().map(|r| r.pseudo_id.as_str()).collect();
        let years: Vec<i32> = records.iter().map(|r| r.year).collect();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let nicknames: Vec<Option<&str>> = records.iter().map(|r| r.nickname.as_deref()).collect();
        let countries: Vec<Option<&str>> = records.iter().map(|r| r.country.as_deref()).collect();
        let primary_totals: Vec<Option<f64>> = records
            .iter()
            .map(|r| r.primary.as_ref().and_then(|s| s.total_points))
            .collect();
        let secondary_names: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.secondary.as_ref().map(|s| s.display_name.as_str()))
            .collect();
        let secondary_official: Vec<Option<bool>> = records
            .iter()
            .map(|r| r.secondary.as_ref().map(|s| s.is_official))
            .collect();
        let secondary_totals: Vec<Option<f64>> = records
            .iter()
            .map(|r| r.secondary.as_ref().and_then(|s| s.total_points))
            .collect();

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                Arc::new(Int32Array::from(years)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(StringArray::from(nicknames)) as ArrayRef,
                Arc::new(StringArray::from(countries)) as ArrayRef,
                Arc::new(Float64Array::from(primary_totals)) as ArrayRef,
                Arc::new(UInt32Array::from(primary(|s| s.rank_preliminary))) as ArrayRef,
                Arc::new(UInt32Array::from(primary(|s| s.rank_final))) as ArrayRef,
                Arc::new(StringArray::from(secondary_names)) as ArrayRef,
                Arc::new(BooleanArray::from(secondary_official)) as ArrayRef,
                Arc::new(Float64Array::from(secondary_totals)) as ArrayRef,
                Arc::new(UInt32Array::from(secondary(|s| s.rank_preliminary))) as ArrayRef,
                Arc::new(UInt32Array::from(secondary(|s| s.rank_final))) as ArrayRef,
                Arc::new(UInt32Array::from(secondary(|s| s.rank_official))) as ArrayRef,
            ],
        )?;

        self.write_batch(&path, &schema, &batch)?;

        info!("Wrote {} merged rows to {:?}", records.len(), path);
        Ok(path)
    }

    /// Write a record batch to a Parquet file.
    fn write_batch(
        &self,
        path: &Path,
        schema: &Arc<Schema>,
        batch: &RecordBatch,
    ) -> Result<(), StorageError> {
        let file = File::create(path)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        Ok(())
    }
}

/// Parquet file reader.
pub struct ParquetReader {
    config: StorageConfig,
}

impl ParquetReader {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn table_path(&self, table: TableType) -> PathBuf {
        self.config.parquet_dir().join(table.filename())
    }

    /// Check if a table exists.
    pub fn exists(&self, table: TableType) -> bool {
        self.table_path(table).exists()
    }

    /// Read all record batches from a Parquet file.
    pub fn read_batches(&self, table: TableType) -> Result<Vec<RecordBatch>, StorageError> {
        let path = self.table_path(table);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let batches: Result<Vec<_>, _> = reader.collect();
        let batches = batches?;

        debug!("Read {} batches from {:?}", batches.len(), path);
        Ok(batches)
    }

    /// Get row count for a table.
    pub fn count(&self, table: TableType) -> Result<usize, StorageError> {
        let batches = self.read_batches(table)?;
        Ok(batches.iter().map(|b| b.num_rows()).sum())
    }
}
