//! Output module for reporting what the sync has stored
//!
//! Statistics are read back from storage for the `--stats` mode.

pub mod stats;

pub use stats::{load_statistics, print_statistics, SyncStatistics};
