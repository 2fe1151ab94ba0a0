//! Output sinks consumed by the `Logger`
//!
//! A sink must accept plain writes. Writing to a dedicated fatal stream and
//! stopping are optional capabilities, advertised once through
//! `capabilities()` so the logger never queries a sink per call.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Optional capabilities of a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCapabilities {
    /// Fatal records can be mirrored to a separate stream via `write_fatal`
    pub fatal: bool,
    /// The sink buffers data and must be stopped to flush it
    pub stop: bool,
}

/// Destination for formatted log lines
///
/// # Object Safety
/// This trait is object-safe so loggers can hold an `Arc<dyn Sink>`.
pub trait Sink: Send + Sync {
    /// Write one complete record; its bytes must land contiguously
    fn write(&self, bytes: &[u8]) -> io::Result<usize>;

    /// Capabilities beyond `write`
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::default()
    }

    /// Write a record to the fatal stream
    fn write_fatal(&self, _bytes: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sink has no fatal stream",
        ))
    }

    /// Flush everything buffered and stop; later calls are no-ops
    fn stop(&self) {}
}

/// Unbuffered sink over any `Write`, e.g. stderr or an in-memory `Vec<u8>`
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the wrapped writer
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the wrapped writer
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer)
    }
}

impl WriterSink<io::Stderr> {
    /// Sink writing straight to standard error
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        self.with_writer(|w| {
            w.write_all(bytes)?;
            w.flush()?;
            Ok(bytes.len())
        })
    }
}
