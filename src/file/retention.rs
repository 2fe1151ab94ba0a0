//! Rotated backup retention
//!
//! Removes rotated backups (`<name>.log.<YYYYMMDDHH>[_n]` and
//! `<name>.log.wf.<YYYYMMDDHH>[_n]`) that are older than a retention window.
//! The live `<name>.log` and `<name>.log.wf` files are never touched.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;

/// Check whether `file_name` is a rotated backup of the log named `name`
pub fn is_rotated_backup(file_name: &str, name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(name)
        .and_then(|r| r.strip_prefix(".log."))
    else {
        return false;
    };
    let rest = rest.strip_prefix("wf.").unwrap_or(rest);

    let (stamp, index) = match rest.split_once('_') {
        Some((stamp, index)) => (stamp, Some(index)),
        None => (rest, None),
    };
    if stamp.len() != 10 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match index {
        Some(index) => !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()),
        None => true,
    }
}

/// Delete rotated backups of `name` in `logs_dir` older than `retention_days`
///
/// Returns the number of files deleted.
pub fn cleanup_rotated_logs(logs_dir: &Path, name: &str, retention_days: u64) -> Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }

    let retention_duration = Duration::from_secs(retention_days * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(retention_duration)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted_count = 0;

    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();

        match path.file_name().and_then(|n| n.to_str()) {
            Some(file_name) if is_rotated_backup(file_name, name) => {}
            _ => continue,
        }

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff && fs::remove_file(&path).is_ok() {
                    deleted_count += 1;
                }
            }
        }
    }

    Ok(deleted_count)
}
