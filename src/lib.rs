//! # Results Ledger
//!
//! Reconciles yearly competition results from two sources with drifting
//! schemas into one ranked, per-competitor time series.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (pseudo-ids, rows, records, wide table, run report)
//! - **config**: Application configuration and the hand-maintained reference tables
//! - **normalize**: Round/schema normalization of the per-year tables
//! - **identity**: Pseudo-identifier construction and secondary-to-primary linking
//! - **calculate**: Standings, positions and percentile labels
//! - **reshape**: Long merge, wide reshape and lifetime ranking
//! - **storage**: Filesystem data lake operations (JSONL, Parquet)
//! - **pipeline**: One full load cycle over all of the above

pub mod calculate;
pub mod config;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reshape;
pub mod storage;

pub use models::*;
