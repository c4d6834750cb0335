//! Configuration crate: sub-modules.

pub mod types;
pub mod loader;
pub mod password;

// Re-export top-level items for convenience.
pub use types::*;
pub use loader::DEFAULT_CONFIG_PATH;
pub use password::{generate_password, GENERATED_PASSWORD_LEN};
