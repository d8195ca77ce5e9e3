//! repoharvest mines git repositories, external analysis-tool reports and
//! issue-tracker data into a per-project SQLite dataset.
//!
//! The pipeline is GENERATE → backup file → LOAD: every populator first
//! derives raw records into a timestamped CSV/JSON backup, and a separate
//! load step bulk-inserts the newest backup into the store. The database is
//! therefore always rebuildable from the backup directory alone.

pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod paths;
pub mod populate;
pub mod report;
pub mod tools;
pub mod walker;

#[cfg(test)]
pub(crate) mod testutil;
