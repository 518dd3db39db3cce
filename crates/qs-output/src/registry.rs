//! Output files shared by the stations of one thread, keyed by path.
//!
//! Several output stations may write to the same file.  The registry opens
//! each path once, keeps the first error and closes everything at the end
//! of the run.  Writing never fails from the caller's point of view.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::csv::CsvWriter;
use crate::writer::OutputWriter;
use crate::{OutputError, OutputResult};

#[derive(Default)]
pub struct WriterRegistry {
    writers:     FxHashMap<PathBuf, CsvWriter>,
    /// Paths that failed to open; later writes to them are dropped.
    failed:      Vec<PathBuf>,
    first_error: Option<OutputError>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `fields` to the file at `path`, opening it (with `header`) on
    /// first use.  Returns `false` if the record was not written.
    pub fn write(&mut self, path: &Path, header: Option<&[&str]>, fields: &[String]) -> bool {
        if self.failed.iter().any(|p| p == path) {
            return false;
        }
        if !self.writers.contains_key(path) {
            match CsvWriter::create(path, header) {
                Ok(w) => {
                    self.writers.insert(path.to_path_buf(), w);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open output file");
                    self.failed.push(path.to_path_buf());
                    self.store_err(Err(e));
                    return false;
                }
            }
        }
        let Some(w) = self.writers.get_mut(path) else {
            return false;
        };
        let result = w.write_record(fields);
        let ok = result.is_ok();
        self.store_err(result);
        ok
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Flush and close every open file.
    pub fn finish_all(&mut self) {
        let results: Vec<_> = self.writers.values_mut().map(OutputWriter::finish).collect();
        for r in results {
            self.store_err(r);
        }
        self.writers.clear();
    }

    /// Take the stored write error (if any).
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.first_error.take()
    }

    fn store_err(&mut self, result: OutputResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.first_error.is_none() {
                self.first_error = Some(e);
            }
        }
    }
}
