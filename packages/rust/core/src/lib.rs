//! Two-phase pipeline orchestration for Arxivist.
//!
//! Ties the tool-server manager and the chunking engine together into the
//! ingestion pipeline (search, extract, chunk, index), the query pipeline
//! (retrieve, synthesize, log, persist), and the run driver around both.

pub mod ingest;
pub mod progress;
pub mod query;
pub mod runner;

pub use ingest::IngestionOutcome;
pub use progress::{ProgressReporter, SilentProgress};
pub use query::QueryOutcome;
pub use runner::{DEFAULT_QUERY, RunOptions, RunReport};
