//! SSH crate: sub-modules.

pub mod types;
pub mod session;
pub mod sftp;

// Re-export top-level items for convenience.
pub use types::*;
pub use session::{connect_shell, open_sftp};
pub use sftp::mkdir_all;
