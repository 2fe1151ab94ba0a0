//! Logger front end
//!
//! Filters records by severity, builds each line with the stage pipeline
//! into a pooled scratch page, and hands the bytes to a `Sink`.
//!
//! Line format:
//!
//! ```text
//! <SEVERITY>: <MM-DD HH:MM:SS.NNNNNN> <server-name>[<file>:<line>] <message>
//! ```

mod level;
mod macros;
mod stages;

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tracing::warn;

use crate::config::LogConfig;
use crate::error::LogResult;
use crate::flusher::AsyncFlusher;
use crate::page::{Page, PagePool};
use crate::sink::{Sink, SinkCapabilities};

pub use level::Level;
pub use stages::{
    CallerStage, Record, ServerNameStage, SeverityStage, Stage, TimestampStage,
};

use stages::append_growing;

/// Default capacity of a scratch page for loggers built over a custom sink
const DEFAULT_SCRATCH_CAPACITY: usize = 256;

/// Formats log lines and routes them to a sink
pub struct Logger {
    name: String,
    threshold: u8,
    stages: Vec<Box<dyn Stage>>,
    sink: Arc<dyn Sink>,
    /// Queried once from the sink at construction
    capabilities: SinkCapabilities,
    scratch: PagePool,
}

impl Logger {
    /// Build a logger writing through a new `AsyncFlusher` into `config.dir`
    pub fn new(config: &LogConfig) -> LogResult<Self> {
        config.validate()?;
        let flusher = AsyncFlusher::new(config)?;
        Ok(Self::build(
            Arc::new(flusher),
            &config.name,
            config.level,
            config.scratch_capacity,
        ))
    }

    /// Build a logger over any sink
    pub fn with_sink(sink: Arc<dyn Sink>, name: &str, threshold: u8) -> Self {
        Self::build(sink, name, threshold, DEFAULT_SCRATCH_CAPACITY)
    }

    fn build(sink: Arc<dyn Sink>, name: &str, threshold: u8, scratch_capacity: usize) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(SeverityStage),
            Box::new(TimestampStage::new()),
            Box::new(ServerNameStage::new(name)),
            Box::new(CallerStage),
        ];
        let capabilities = sink.capabilities();

        Self {
            name: name.to_string(),
            threshold,
            stages,
            sink,
            capabilities,
            scratch: PagePool::new(scratch_capacity),
        }
    }

    /// Server name embedded in every line
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Most verbose level that is still emitted
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// The sink records are written to
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Check if a record at `level` would be emitted
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.threshold
    }

    /// Emit a record at `level`, attributed to the caller
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.emit(level, Some(Location::caller()), args);
    }

    /// Emit a record with an explicit call site; `None` renders as `???:0`
    pub fn log_at(&self, level: Level, location: Option<&Location<'_>>, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.emit(level, location, args);
    }

    #[track_caller]
    pub fn notice(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Notice, args);
    }

    /// Emit a fatal record; also mirrored to the sink's fatal stream
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Fatal, args);
    }

    #[track_caller]
    pub fn warning(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warning, args);
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    /// Stop the sink if it supports stopping. Safe to call more than once.
    pub fn stop(&self) {
        if self.capabilities.stop {
            self.sink.stop();
        }
    }

    fn emit(&self, level: Level, location: Option<&Location<'_>>, args: fmt::Arguments<'_>) {
        let record = Record { level, location };
        let mut page = self.scratch.acquire();

        for stage in &self.stages {
            stage.apply(&mut page, &record);
        }
        write_message(&mut page, args);
        append_growing(&mut page, b"\n");

        if let Err(e) = self.sink.write(page.as_bytes()) {
            warn!(error = %e, "Failed to write log record");
        }
        if level == Level::Fatal && self.capabilities.fatal {
            if let Err(e) = self.sink.write_fatal(page.as_bytes()) {
                warn!(error = %e, "Failed to write fatal log record");
            }
        }

        self.scratch.release(page);
    }
}

/// Format the message into the page, growing it for long messages
fn write_message(page: &mut Page, args: fmt::Arguments<'_>) {
    if let Some(message) = args.as_str() {
        append_growing(page, message.as_bytes());
        return;
    }

    let start = page.len();
    if fmt::write(page, args).is_err() {
        page.truncate(start);
        let message = fmt::format(args);
        append_growing(page, message.as_bytes());
    }
}
