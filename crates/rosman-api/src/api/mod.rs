//! RouterOS API crate: sub-modules.

pub mod types;
pub mod codec;
pub mod sentence;
pub mod client;

// Re-export top-level items for convenience.
pub use types::*;
pub use sentence::{Command, Reply, ReplyRow, Sentence};
pub use client::ApiClient;
