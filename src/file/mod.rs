//! On-disk log files
//!
//! Owns the main and fatal streams, rotates them by size or hour, and
//! optionally prunes old rotated backups.

mod log_file;
mod retention;

pub use log_file::LogFile;
pub use retention::{cleanup_rotated_logs, is_rotated_backup};
