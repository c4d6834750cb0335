//! # rosman – configuration crate
//!
//! Loads the declared state of the fleet from JSON files: a main
//! params file pointing at per-kind files (hosts, tasks, users, groups,
//! schedules), resolves alias fan-out and schedule scripts, and hands
//! back an immutable [`Config`](config::Config) shared by every device
//! loop.

pub mod config;

pub use config::*;
