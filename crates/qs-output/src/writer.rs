//! The `OutputWriter` trait implemented by all backend writers.

use crate::OutputResult;

/// A sink for delimited records: station output files and the summary
/// export both go through it.
pub trait OutputWriter: Send {
    /// Write one record.  Fields are written as given.
    fn write_record(&mut self, fields: &[String]) -> OutputResult<()>;

    /// Flush and close the underlying file handle.
    ///
    /// Calling it again is a no-op.
    fn finish(&mut self) -> OutputResult<()>;
}
