//! Core data models for the results ledger.

mod ids;
mod record;
mod report;
mod rounds;
mod source;
mod wide;

pub use ids::*;
pub use record::*;
pub use report::*;
pub use rounds::*;
pub use source::*;
pub use wide::*;
