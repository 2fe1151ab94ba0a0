//! pagelog - Low-overhead asynchronous file logging
//!
//! Log lines are formatted into pooled pages, handed to a background flusher
//! thread through a bounded queue, and written to size/hour rotated files.
//! Fatal records are mirrored to a separate `.wf` stream.
//!
//! ```no_run
//! use pagelog::{LogConfig, Logger};
//!
//! let config = LogConfig::default().with_name("trader").with_dir("log");
//! let logger = Logger::new(&config).expect("logging must start");
//!
//! pagelog::info!(logger, "balance {} ratio {:.3}", 1200, 0.512);
//! pagelog::fatal!(logger, "order rejected: {}", "insufficient funds");
//!
//! logger.stop();
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod file;
pub mod flusher;
pub mod logger;
pub mod page;
pub mod sink;

pub use config::LogConfig;
pub use error::{LogError, LogResult};
pub use file::LogFile;
pub use flusher::{AsyncFlusher, FlusherState};
pub use logger::{Level, Logger};
pub use page::{Page, PagePool};
pub use sink::{Sink, SinkCapabilities, WriterSink};
