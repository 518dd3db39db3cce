//! `qs-output`: output writers for the rust_qs simulator.
//!
//! | Module       | Contents                                                     |
//! |--------------|--------------------------------------------------------------|
//! | [`writer`]   | `OutputWriter` trait                                         |
//! | [`csv`]      | `CsvWriter` (comma or tab separated, chosen by extension)    |
//! | [`registry`] | `WriterRegistry`: files shared by stations, keyed by path   |
//! | [`summary`]  | `summary_rows` / `write_summary` for a finished `Statistics` |
//! | [`error`]    | `OutputError`, `OutputResult<T>`                             |
//!
//! # Usage
//!
//! ```rust,ignore
//! use qs_output::{CsvWriter, write_summary};
//!
//! let stats = simulator.run(&mut observer)?;
//! let mut writer = CsvWriter::create(Path::new("summary.csv"), None)?;
//! write_summary(&stats, &mut writer)?;
//! ```

pub mod csv;
pub mod error;
pub mod registry;
pub mod summary;
pub mod writer;


pub use self::csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use registry::WriterRegistry;
pub use summary::{SUMMARY_HEADER, SummaryRow, summary_rows, write_summary};
pub use writer::OutputWriter;
