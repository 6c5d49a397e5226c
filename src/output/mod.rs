//! Output module for streaming harvested records
//!
//! This module handles:
//! - Writing flattened records to CSV incrementally
//! - Reporting run statistics

mod csv_sink;
pub mod stats;
mod traits;

pub use csv_sink::CsvSink;
pub use stats::{print_statistics, HarvestStats};
pub use traits::{OutputError, OutputResult, RecordSink};
