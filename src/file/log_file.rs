//! Main and fatal log files with size/hour rotation
//!
//! The main stream lives at `<dir>/<name>.log` and the fatal stream at
//! `<dir>/<name>.log.wf`. Every access goes through one mutex, so a rotation
//! (rename + reopen) never interleaves with a write to either stream.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, Timelike};
use tracing::{debug, error, info, warn};

use super::retention::cleanup_rotated_logs;
use crate::config::LogConfig;
use crate::error::{LogError, LogResult};

/// Open handles plus the bookkeeping of the rotation check
struct FileState {
    main: File,
    fatal: File,
    /// Main-file writes since the last rotation check, modulo the check interval
    since_last_check: u32,
    last_check: DateTime<Local>,
}

/// What a rotation did to the fatal stream when it did not follow the main one
enum FatalFailure {
    /// Rename failed; the current fatal file stays in place
    Rename(io::Error),
    /// Renamed but not reopened; writes keep going to the renamed file
    Reopen(LogError),
}

/// Outcome of a rotation, reported after the state lock is released
struct Rotated {
    main_backup: PathBuf,
    fatal_failure: Option<FatalFailure>,
}

/// Pair of append-only log files with rotation
pub struct LogFile {
    dir: PathBuf,
    name: String,
    main_path: PathBuf,
    fatal_path: PathBuf,
    max_size: u64,
    check_interval: u32,
    retention_days: Option<u64>,
    state: Mutex<FileState>,
}

impl LogFile {
    /// Create the log directory and open both streams in append mode
    pub fn open(config: &LogConfig) -> LogResult<Self> {
        config.validate()?;

        fs::create_dir_all(&config.dir).map_err(|source| LogError::CreateDir {
            path: config.dir.clone(),
            source,
        })?;

        let main_path = config.dir.join(format!("{}.log", config.name));
        let fatal_path = config.dir.join(format!("{}.log.wf", config.name));

        let state = FileState {
            main: open_append(&main_path)?,
            fatal: open_append(&fatal_path)?,
            since_last_check: 0,
            last_check: Local::now(),
        };

        debug!(path = %main_path.display(), "Opened log files");

        Ok(Self {
            dir: config.dir.clone(),
            name: config.name.clone(),
            main_path,
            fatal_path,
            max_size: config.max_file_size,
            check_interval: config.rotation_check_interval,
            retention_days: config.retention_days,
            state: Mutex::new(state),
        })
    }

    /// Path of the current main stream
    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    /// Path of the current fatal stream
    pub fn fatal_path(&self) -> &Path {
        &self.fatal_path
    }

    /// Time recorded at the last rotation check
    pub fn last_check(&self) -> DateTime<Local> {
        self.lock().last_check
    }

    /// Append to the main stream, rotating first when a check is due
    ///
    /// A failed rotation is reported and the bytes go to the previous handle.
    pub fn write_main(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        let rotation = self.maybe_rotate(&mut state);
        let written = state.main.write_all(bytes);
        drop(state);

        // Diagnostics may be routed back into this file, so they run unlocked
        match rotation {
            Ok(Some(rotated)) => self.finish_rotation(&rotated),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Log rotation failed"),
        }

        written?;
        Ok(bytes.len())
    }

    /// Append to the fatal stream. Never triggers a rotation.
    pub fn write_fatal(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        state.fatal.write_all(bytes)?;
        Ok(bytes.len())
    }

    /// Rotate both streams now, regardless of size and time
    ///
    /// Returns the path the main stream was moved to.
    pub fn rotate(&self) -> LogResult<PathBuf> {
        let rotated = {
            let mut state = self.lock();
            let stamp = std::mem::replace(&mut state.last_check, Local::now());
            self.rotate_locked(&mut state, stamp)?
        };
        self.finish_rotation(&rotated);
        Ok(rotated.main_backup)
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the amortized rotation check; `Some` when a rotation happened
    fn maybe_rotate(&self, state: &mut FileState) -> LogResult<Option<Rotated>> {
        let due = state.since_last_check == 0;
        state.since_last_check = (state.since_last_check + 1) % self.check_interval;
        if !due {
            return Ok(None);
        }

        let size = match state.main.metadata() {
            Ok(metadata) => metadata.len(),
            Err(_) => return Ok(None),
        };

        let now = Local::now();
        let previous = std::mem::replace(&mut state.last_check, now);
        if !hour_changed(&previous, &now) && size <= self.max_size {
            return Ok(None);
        }

        self.rotate_locked(state, previous).map(Some)
    }

    /// Move both streams to backups stamped with `stamp` and reopen them
    ///
    /// Emits nothing: the caller reports the outcome once the lock is gone.
    fn rotate_locked(&self, state: &mut FileState, stamp: DateTime<Local>) -> LogResult<Rotated> {
        let suffix = stamp.format("%Y%m%d%H").to_string();
        let (main_backup, fatal_backup) = self.free_backup_paths(&suffix);

        fs::rename(&self.main_path, &main_backup).map_err(|source| LogError::Rotate {
            path: self.main_path.clone(),
            source,
        })?;
        state.main = open_append(&self.main_path).map_err(|e| match e {
            LogError::Open { path, source } => LogError::Rotate { path, source },
            other => other,
        })?;

        let fatal_failure = match fs::rename(&self.fatal_path, &fatal_backup) {
            Ok(()) => match open_append(&self.fatal_path) {
                Ok(file) => {
                    state.fatal = file;
                    None
                }
                Err(e) => Some(FatalFailure::Reopen(e)),
            },
            Err(e) => Some(FatalFailure::Rename(e)),
        };

        Ok(Rotated {
            main_backup,
            fatal_failure,
        })
    }

    /// Report a finished rotation and apply retention
    fn finish_rotation(&self, rotated: &Rotated) {
        match &rotated.fatal_failure {
            Some(FatalFailure::Rename(e)) => warn!(
                path = %self.fatal_path.display(),
                error = %e,
                "Failed to rotate fatal log, keeping current file"
            ),
            Some(FatalFailure::Reopen(e)) => {
                error!(error = %e, "Failed to reopen fatal log after rotation")
            }
            None => {}
        }

        info!(backup = %rotated.main_backup.display(), "Rotated log file");

        if let Some(days) = self.retention_days {
            match cleanup_rotated_logs(&self.dir, &self.name, days) {
                Ok(count) if count > 0 => info!("Cleaned up {} old log backups", count),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to clean up old log backups"),
            }
        }
    }

    /// First `(main, fatal)` backup pair for `suffix` that overwrites nothing
    fn free_backup_paths(&self, suffix: &str) -> (PathBuf, PathBuf) {
        let mut index = 0;
        loop {
            let main = backup_path(&self.main_path, suffix, index);
            let fatal = backup_path(&self.fatal_path, suffix, index);
            if !main.exists() && !fatal.exists() {
                return (main, fatal);
            }
            index += 1;
        }
    }
}

fn open_append(path: &Path) -> LogResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LogError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// `<path>.<suffix>` for index 0, `<path>.<suffix>_<index>` otherwise
fn backup_path(path: &Path, suffix: &str, index: u32) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    if index != 0 {
        name.push(format!("_{}", index));
    }
    PathBuf::from(name)
}

/// Whether two check times fall in different wall-clock hours (date included)
fn hour_changed(previous: &DateTime<Local>, now: &DateTime<Local>) -> bool {
    previous.date_naive() != now.date_naive() || previous.hour() != now.hour()
}
