//! # rosman – RouterOS API crate
//!
//! Implements the MikroTik RouterOS binary API: length-prefixed words,
//! zero-terminated sentences, the plain and legacy (md5 challenge) login
//! handshakes, and a small async client that runs one command at a time
//! over a TCP connection.

pub mod api;

pub use api::*;
