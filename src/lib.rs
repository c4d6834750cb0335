//! # rosman
//!
//! A headless fleet agent for MikroTik RouterOS devices: converges
//! each device's users, permission groups and scheduler entries to a
//! centrally declared state, pulls backup artifacts home over SFTP
//! with move semantics, and repeats forever on an anchor-aligned
//! per-device interval with failure back-off.
//!
//! The protocol and configuration layers live in their own crates
//! (`rosman-api`, `rosman-ssh`, `rosman-config`); this crate holds the
//! agent core: session management, reconciliation, backup transfer,
//! key provisioning and the per-device scheduler.

pub mod connection;
pub mod error;
pub mod keys;
pub mod reconcile;
pub mod scheduler;
pub mod transfer;

pub use connection::DeviceConnections;
pub use error::{AgentError, AgentErrorKind};
pub use scheduler::{next_aligned_instant, next_cycle_instant, DeviceRunner};
