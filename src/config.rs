//! Configuration for the logging engine

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Logging engine configuration
///
/// All values are plain options validated once at construction. Fields left
/// out of a TOML file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Severity threshold, higher is more verbose (0 = notice .. 4 = debug)
    #[serde(default = "default_level")]
    pub level: u8,

    /// Server/process name, embedded verbatim into every line and used as the file stem
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory holding `<name>.log` and `<name>.log.wf`
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Main file size in bytes above which the file is rotated
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Capacity in bytes of each buffered page
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,

    /// Number of full pages that may wait for the flusher before writers block
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Interval after which a partially filled page is flushed anyway (default: 1000ms)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Number of main-file writes between two rotation checks
    #[serde(default = "default_rotation_check_interval")]
    pub rotation_check_interval: u32,

    /// Initial capacity of the logger's per-call formatting pages
    #[serde(default = "default_scratch_capacity")]
    pub scratch_capacity: usize,

    /// Rotated backups older than this many days are deleted after a rotation.
    /// Unset keeps every backup.
    #[serde(default)]
    pub retention_days: Option<u64>,
}

fn default_level() -> u8 {
    3 // info
}

fn default_name() -> String {
    "pagelog".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_max_file_size() -> u64 {
    2_000_000_000
}

fn default_page_capacity() -> usize {
    4_000_000
}

fn default_queue_capacity() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_rotation_check_interval() -> u32 {
    20
}

fn default_scratch_capacity() -> usize {
    256
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            name: default_name(),
            dir: default_dir(),
            max_file_size: default_max_file_size(),
            page_capacity: default_page_capacity(),
            queue_capacity: default_queue_capacity(),
            flush_interval_ms: default_flush_interval_ms(),
            rotation_check_interval: default_rotation_check_interval(),
            scratch_capacity: default_scratch_capacity(),
            retention_days: None,
        }
    }
}

impl LogConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read log config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse log config")?;
        config.validate().context("Log config rejected")?;
        Ok(config)
    }

    /// Check that every value can be used to build the engine
    pub fn validate(&self) -> Result<(), LogError> {
        if self.level > crate::logger::Level::Debug as u8 {
            return Err(LogError::InvalidConfig(format!(
                "level {} is above the most verbose level 4",
                self.level
            )));
        }
        if self.name.is_empty() {
            return Err(LogError::InvalidConfig("name must not be empty".into()));
        }
        if self.name.contains(std::path::is_separator) {
            return Err(LogError::InvalidConfig(format!(
                "name '{}' must not contain a path separator",
                self.name
            )));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(LogError::InvalidConfig("dir must not be empty".into()));
        }
        if self.max_file_size == 0 {
            return Err(LogError::InvalidConfig("max_file_size must be positive".into()));
        }
        if self.page_capacity == 0 {
            return Err(LogError::InvalidConfig("page_capacity must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(LogError::InvalidConfig("queue_capacity must be positive".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(LogError::InvalidConfig("flush_interval_ms must be positive".into()));
        }
        if self.rotation_check_interval == 0 {
            return Err(LogError::InvalidConfig(
                "rotation_check_interval must be positive".into(),
            ));
        }
        if self.scratch_capacity == 0 {
            return Err(LogError::InvalidConfig("scratch_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Flush interval as a `Duration`
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    pub fn with_page_capacity(mut self, capacity: usize) -> Self {
        self.page_capacity = capacity;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_flush_interval_ms(mut self, millis: u64) -> Self {
        self.flush_interval_ms = millis;
        self
    }

    pub fn with_rotation_check_interval(mut self, interval: u32) -> Self {
        self.rotation_check_interval = interval;
        self
    }

    pub fn with_retention_days(mut self, days: u64) -> Self {
        self.retention_days = Some(days);
        self
    }
}
