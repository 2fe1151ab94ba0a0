//! Routing `tracing` output into a sink
//!
//! Lets a host application send its own `tracing` events through the paged
//! flusher. `ERROR` events are mirrored to the fatal stream when the sink
//! has one.

use std::cell::Cell;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::flusher::FLUSHER_THREAD_NAME;
use crate::logger::Level;
use crate::sink::{Sink, SinkCapabilities};

thread_local! {
    /// Set while this thread is inside a sink write started by the bridge
    static IN_SINK_WRITE: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as writing into the sink until dropped
struct SinkWriteScope;

impl SinkWriteScope {
    /// `None` when the thread is already inside a bridged sink write
    fn enter() -> Option<Self> {
        IN_SINK_WRITE.with(|flag| (!flag.replace(true)).then_some(SinkWriteScope))
    }
}

impl Drop for SinkWriteScope {
    fn drop(&mut self) {
        IN_SINK_WRITE.with(|flag| flag.set(false));
    }
}

/// A writer handing each formatted event to the sink
pub struct SinkWriter {
    sink: Arc<dyn Sink>,
    fatal: bool,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The flusher's own diagnostics must not queue onto the flusher
        if thread::current().name() == Some(FLUSHER_THREAD_NAME) {
            return io::stderr().write(buf);
        }
        // Events raised by the sink while it handles one of ours (rotation
        // notices, say) would recurse into it
        let _scope = match SinkWriteScope::enter() {
            Some(scope) => scope,
            None => return io::stderr().write(buf),
        };

        let written = self.sink.write(buf)?;
        if self.fatal {
            if let Err(e) = self.sink.write_fatal(buf) {
                let _ = writeln!(io::stderr(), "pagelog: failed to write fatal stream: {}", e);
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer factory for tracing-subscriber
pub struct SinkMakeWriter {
    sink: Arc<dyn Sink>,
    capabilities: SinkCapabilities,
}

impl SinkMakeWriter {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        let capabilities = sink.capabilities();
        Self { sink, capabilities }
    }
}

impl<'a> MakeWriter<'a> for SinkMakeWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            sink: Arc::clone(&self.sink),
            fatal: false,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SinkWriter {
            sink: Arc::clone(&self.sink),
            fatal: self.capabilities.fatal && Level::from(*meta.level()) == Level::Fatal,
        }
    }
}

/// Install a global `tracing` subscriber writing through `sink`
///
/// `default_filter` applies when `RUST_LOG` is not set.
pub fn init_tracing(sink: Arc<dyn Sink>, default_filter: &str) -> Result<()> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(SinkMakeWriter::new(sink))
        .with_ansi(false)
        .with_target(true);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::flusher::AsyncFlusher;
    use std::fs;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CaptureSink {
        main: Mutex<String>,
        fatal: Mutex<String>,
        fail_fatal: bool,
        /// Emit a tracing event from inside every write
        chatty: bool,
    }

    impl Sink for CaptureSink {
        fn write(&self, bytes: &[u8]) -> io::Result<usize> {
            if self.chatty {
                tracing::warn!("sink is busy");
            }
            self.main
                .lock()
                .unwrap()
                .push_str(std::str::from_utf8(bytes).unwrap());
            Ok(bytes.len())
        }

        fn capabilities(&self) -> SinkCapabilities {
            SinkCapabilities {
                fatal: true,
                stop: false,
            }
        }

        fn write_fatal(&self, bytes: &[u8]) -> io::Result<usize> {
            if self.fail_fatal {
                return Err(io::Error::new(io::ErrorKind::Other, "fatal stream closed"));
            }
            self.fatal
                .lock()
                .unwrap()
                .push_str(std::str::from_utf8(bytes).unwrap());
            Ok(bytes.len())
        }
    }

    fn subscriber_for(sink: Arc<dyn Sink>) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(SinkMakeWriter::new(sink))
            .with_ansi(false)
            .finish()
    }

    #[test]
    fn test_tracing_events_reach_sink() {
        let sink = Arc::new(CaptureSink::default());

        tracing::subscriber::with_default(subscriber_for(sink.clone()), || {
            tracing::info!("balance polled");
            tracing::error!("order failed");
        });

        let main = sink.main.lock().unwrap().clone();
        let fatal = sink.fatal.lock().unwrap().clone();
        assert_eq!(main.lines().count(), 2);
        assert!(main.contains("balance polled"));
        assert!(main.contains("order failed"));
        assert_eq!(fatal.lines().count(), 1);
        assert!(fatal.contains("order failed"));
    }

    #[test]
    fn test_failed_fatal_write_keeps_main_write() {
        let sink = Arc::new(CaptureSink {
            fail_fatal: true,
            ..Default::default()
        });

        tracing::subscriber::with_default(subscriber_for(sink.clone()), || {
            tracing::error!("order failed");
        });

        let main = sink.main.lock().unwrap().clone();
        assert!(main.contains("order failed"));
        assert!(sink.fatal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_events_from_inside_the_sink_do_not_recurse() {
        let sink = Arc::new(CaptureSink {
            chatty: true,
            ..Default::default()
        });

        tracing::subscriber::with_default(subscriber_for(sink.clone()), || {
            tracing::info!("balance polled");
        });

        let main = sink.main.lock().unwrap().clone();
        assert_eq!(main.lines().count(), 1);
        assert!(main.contains("balance polled"));
        assert!(!main.contains("sink is busy"));
    }

    #[test]
    fn test_flusher_thread_events_bypass_sink() {
        let sink = Arc::new(CaptureSink::default());
        let dispatch = tracing::Dispatch::new(subscriber_for(sink.clone()));

        thread::Builder::new()
            .name(FLUSHER_THREAD_NAME.to_string())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    tracing::error!("flush failed");
                });
            })
            .unwrap()
            .join()
            .unwrap();

        assert!(sink.main.lock().unwrap().is_empty());
        assert!(sink.fatal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rotation_after_stop_with_bridged_flusher() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_name("svc")
            .with_dir(temp_dir.path())
            .with_max_file_size(4)
            .with_rotation_check_interval(1);
        let flusher = Arc::new(AsyncFlusher::new(&config).unwrap());
        flusher.stop();

        let (done_tx, done_rx) = mpsc::channel();
        let writer = Arc::clone(&flusher);
        thread::spawn(move || {
            let sink: Arc<dyn Sink> = writer.clone();
            tracing::subscriber::with_default(subscriber_for(sink), || {
                writer.write(b"first line\n").unwrap();
                // File is over the limit: this write rotates and logs it
                writer.write(b"second line\n").unwrap();
            });
            done_tx.send(()).unwrap();
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("write after stop must not hang on rotation");

        let all: String = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| !p.to_string_lossy().contains(".wf"))
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        assert!(all.contains("first line\n"));
        assert!(all.contains("second line\n"));
        assert!(all.contains("Rotated log file"));
    }
}
