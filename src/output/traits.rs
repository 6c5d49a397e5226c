//! Output sink traits and types
//!
//! This module defines the trait interface for record sinks and the errors
//! they report.

use crate::model::OutputRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Trait for record sinks
///
/// Sinks receive records one response at a time and persist them
/// incrementally; they never hold the full result set.
pub trait RecordSink {
    /// Writes one record
    ///
    /// # Arguments
    ///
    /// * `record` - The flattened record; its keys must match the first
    ///   record's keys
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()>;

    /// Flushes buffered rows to the underlying writer
    fn flush(&mut self) -> OutputResult<()>;

    /// Number of data rows written so far
    fn rows_written(&self) -> u64;

    /// Writes a batch of records and flushes
    fn write_batch(&mut self, records: &[OutputRecord]) -> OutputResult<()> {
        for record in records {
            self.write_record(record)?;
        }
        self.flush()
    }
}
