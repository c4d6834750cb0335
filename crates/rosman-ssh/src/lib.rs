//! # rosman – SSH transport crate
//!
//! Dials RouterOS devices over SSH (password auth) and opens SFTP
//! channels on top of the shell session. The agent trusts devices by
//! address, so no host-key verification is performed.

pub mod ssh;

pub use ssh::*;
