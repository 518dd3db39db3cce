//! CSV output backend.
//!
//! One `CsvWriter` owns one file.  Files ending in `.tsv` or `.txt` are
//! tab-separated, everything else uses commas.

use std::fs::File;
use std::path::Path;

use csv::{Writer, WriterBuilder};
use tracing::debug;

use crate::OutputResult;
use crate::writer::OutputWriter;

/// Writes delimited records to one file.
pub struct CsvWriter {
    writer:   Writer<File>,
    records:  u64,
    finished: bool,
}

impl CsvWriter {
    /// Create (or truncate) the file at `path`, choosing the delimiter from
    /// the extension.  `header` is written first when given.
    pub fn create(path: &Path, header: Option<&[&str]>) -> OutputResult<Self> {
        let tabs = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv") || e.eq_ignore_ascii_case("txt"));
        let mut writer = WriterBuilder::new()
            .delimiter(if tabs { b'\t' } else { b',' })
            .flexible(true)
            .from_path(path)?;
        if let Some(cols) = header {
            writer.write_record(cols)?;
        }
        debug!(path = %path.display(), tabs, "output file opened");
        Ok(Self { writer, records: 0, finished: false })
    }

    /// Records written so far, excluding the header.
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl OutputWriter for CsvWriter {
    fn write_record(&mut self, fields: &[String]) -> OutputResult<()> {
        self.writer.write_record(fields)?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}
