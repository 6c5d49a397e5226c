//! CSV record sink

use crate::model::OutputRecord;
use crate::output::traits::{OutputResult, RecordSink};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Streams records to CSV
///
/// The header comes from the keys of the first record and is written once,
/// immediately before the first row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    columns: Option<Vec<String>>,
    rows: u64,
}

impl CsvSink<BufWriter<File>> {
    /// Creates a sink writing to `path`
    ///
    /// Any existing file is truncated. Missing parent directories are
    /// created.
    pub fn create(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        tracing::debug!("Truncated output file {}", path.display());
        Ok(Self::new(BufWriter::with_capacity(128 * 1024, file)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(inner),
            columns: None,
            rows: 0,
        }
    }

    /// Header columns, once the first record has been written
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_record(&mut self, record: &OutputRecord) -> OutputResult<()> {
        if self.columns.is_none() {
            let columns: Vec<String> = record.keys().map(str::to_string).collect();
            self.writer.write_record(&columns)?;
            self.columns = Some(columns);
        }

        self.writer
            .write_record(record.values().map(|value| value.render().into_owned()))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows
    }
}
