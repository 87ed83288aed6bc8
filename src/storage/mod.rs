//! Filesystem data lake operations.
//!
//! Handles reading and writing to the local data lake:
//! - Normalized per-year JSONL inputs, one directory per source
//! - Derived JSONL outputs and the run report
//! - Parquet exports of the wide and merged long tables

mod jsonl;
mod parquet;

pub use self::jsonl::*;
pub use self::parquet::*;

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Source;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path:?} line {line}: {source}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("File name is not a year: {0}")]
    InvalidYearFile(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn normalized_dir(&self) -> PathBuf {
        self.data_dir.join("normalized")
    }

    /// Per-year input tables of one source.
    pub fn source_dir(&self, source: Source) -> PathBuf {
        self.normalized_dir().join(source.as_str())
    }

    pub fn parquet_dir(&self) -> PathBuf {
        self.data_dir.join("parquet")
    }

    pub fn derived_dir(&self) -> PathBuf {
        self.data_dir.join("derived")
    }

    pub fn records_path(&self, source: Source) -> PathBuf {
        self.derived_dir()
            .join(format!("{}_records.jsonl", source.as_str()))
    }

    pub fn merged_long_path(&self) -> PathBuf {
        self.derived_dir().join("merged_long.jsonl")
    }

    pub fn lifetime_ranking_path(&self) -> PathBuf {
        self.derived_dir().join("lifetime_ranking.jsonl")
    }

    pub fn run_report_path(&self) -> PathBuf {
        self.derived_dir().join("run_report.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}
