//! Shared utilities
//!
//! - [`fs`] - atomic file writes
//! - [`progress`] - progress bars and spinners for long-running operations

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, write_json};
pub use progress::ProgressBar;
