//! Asynchronous page flusher
//!
//! Producers append record bytes to the current page. A full page is pushed
//! onto a bounded handoff queue and a background thread writes queued pages
//! through the `LogFile`, then returns them to the pool. A ticker hands a
//! partially filled page to the queue so quiet loggers still reach disk.
//!
//! ```text
//! write() -> [current page] -> bounded queue -> flusher thread -> LogFile
//!                 ^                                   |
//!                 +------------- PagePool <-----------+
//! ```
//!
//! The bounded queue is the only backpressure point: a slow disk blocks
//! producers instead of growing memory.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{after, bounded, never, select, tick, Receiver, Sender};
use tracing::{debug, error};

use crate::config::LogConfig;
use crate::error::{LogError, LogResult};
use crate::file::LogFile;
use crate::page::{Page, PagePool};
use crate::sink::{Sink, SinkCapabilities};

/// Name of the background flusher thread
pub(crate) const FLUSHER_THREAD_NAME: &str = "pagelog-flusher";

/// Delay before retrying a tick hand-off that lost the page lock to a producer
const HANDOFF_RETRY: Duration = Duration::from_millis(1);

/// Lifecycle of a flusher. There is no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlusherState {
    /// Writes are buffered and flushed by the background thread
    Running = 0,
    /// `stop()` was called; writers no longer enqueue
    Stopping = 1,
    /// The background thread is flushing everything still queued
    Draining = 2,
    /// All buffered data is on disk; writes go straight to the file
    Stopped = 3,
}

impl FlusherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FlusherState::Running,
            1 => FlusherState::Stopping,
            2 => FlusherState::Draining,
            _ => FlusherState::Stopped,
        }
    }
}

/// One item on the handoff queue
enum Chunk {
    Page(Page),
    /// A single write larger than a whole page
    Oversize(Vec<u8>),
}

/// State shared between producers and the flusher thread
struct Shared {
    log_file: Arc<LogFile>,
    pool: PagePool,
    /// Page currently being filled. Guarded together with the state
    /// transitions out of `Running`.
    current: Mutex<Option<Page>>,
    /// Signalled once the final drain is complete
    stopped: Condvar,
    state: AtomicU8,
}

impl Shared {
    fn state(&self) -> FlusherState {
        FlusherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: FlusherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Page>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a chunk through the log file and recycle its page
    fn flush(&self, chunk: Chunk) {
        match chunk {
            Chunk::Page(page) => {
                if !page.is_empty() {
                    if let Err(e) = self.log_file.write_main(page.as_bytes()) {
                        error!(error = %e, bytes = page.len(), "Failed to flush log page");
                    }
                }
                self.pool.release(page);
            }
            Chunk::Oversize(bytes) => {
                if let Err(e) = self.log_file.write_main(&bytes) {
                    error!(error = %e, bytes = bytes.len(), "Failed to flush oversized log record");
                }
            }
        }
    }

    /// Hand a partially filled current page to the queue on a timer tick
    ///
    /// Never blocks: a producer holding the page lock may itself be blocked on
    /// the queue this thread drains. Returns `false` when the lock was busy so
    /// the caller can retry shortly. A full queue is not retried; the page
    /// goes out with the next tick or when it fills.
    fn hand_off_current(&self, pages: &Sender<Chunk>) -> bool {
        let mut current = match self.current.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let page = match current.take() {
            Some(page) if !page.is_empty() => page,
            other => {
                *current = other;
                return true;
            }
        };

        match pages.try_send(Chunk::Page(page)) {
            Ok(()) => *current = Some(self.pool.acquire()),
            Err(e) => {
                if let Chunk::Page(page) = e.into_inner() {
                    *current = Some(page);
                }
            }
        }
        true
    }

    /// Final drain: everything queued, then the current page
    fn drain(&self, pages: &Receiver<Chunk>) {
        self.set_state(FlusherState::Draining);

        let mut drained = 0usize;
        while let Ok(chunk) = pages.try_recv() {
            self.flush(chunk);
            drained += 1;
        }

        // Writers arriving now park on `stopped` until the state flips
        let last = self.lock_current().take();
        if let Some(page) = last {
            self.flush(Chunk::Page(page));
        }

        self.mark_stopped();
        debug!(drained, "Flusher drained");
    }

    /// Force the terminal state, e.g. when the flusher thread died
    fn mark_stopped(&self) {
        let _current = self.lock_current();
        self.set_state(FlusherState::Stopped);
        self.stopped.notify_all();
    }
}

/// Buffered writer that flushes pages to a `LogFile` on a background thread
pub struct AsyncFlusher {
    shared: Arc<Shared>,
    pages: Sender<Chunk>,
    stop_tx: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncFlusher {
    /// Open the log files described by `config` and start the flusher thread
    pub fn new(config: &LogConfig) -> LogResult<Self> {
        let log_file = Arc::new(LogFile::open(config)?);
        Self::with_log_file(
            log_file,
            config.page_capacity,
            config.queue_capacity,
            config.flush_interval(),
        )
    }

    /// Start a flusher over an already opened `LogFile`
    ///
    /// # Arguments
    /// * `page_capacity` - Bytes per buffered page
    /// * `queue_capacity` - Full pages that may wait before writers block
    /// * `flush_interval` - Maximum time a partially filled page is held
    pub fn with_log_file(
        log_file: Arc<LogFile>,
        page_capacity: usize,
        queue_capacity: usize,
        flush_interval: Duration,
    ) -> LogResult<Self> {
        if page_capacity == 0 || queue_capacity == 0 || flush_interval.is_zero() {
            return Err(LogError::InvalidConfig(
                "page capacity, queue capacity and flush interval must be positive".into(),
            ));
        }

        let (pages_tx, pages_rx) = bounded(queue_capacity);
        let (stop_tx, stop_rx) = bounded(1);

        let shared = Arc::new(Shared {
            log_file,
            pool: PagePool::new(page_capacity),
            current: Mutex::new(None),
            stopped: Condvar::new(),
            state: AtomicU8::new(FlusherState::Running as u8),
        });

        let worker = thread::Builder::new()
            .name(FLUSHER_THREAD_NAME.to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                let pages_tx = pages_tx.clone();
                move || run(shared, pages_tx, pages_rx, stop_rx, flush_interval)
            })
            .map_err(LogError::SpawnFlusher)?;

        debug!(page_capacity, queue_capacity, "Flusher started");

        Ok(Self {
            shared,
            pages: pages_tx,
            stop_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> FlusherState {
        self.shared.state()
    }

    /// The files this flusher writes to
    pub fn log_file(&self) -> &Arc<LogFile> {
        &self.shared.log_file
    }

    /// Capacity of every buffered page
    pub fn page_capacity(&self) -> usize {
        self.shared.pool.capacity()
    }

    /// Buffer `bytes` for the main stream
    ///
    /// The bytes of one call are never split across pages. Blocks while the
    /// handoff queue is full. Once the flusher is stopped the bytes are
    /// written synchronously.
    pub fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut current = self.shared.lock_current();

        if self.shared.state() != FlusherState::Running {
            // Let the drain finish so this line lands after everything buffered
            while matches!(
                self.shared.state(),
                FlusherState::Stopping | FlusherState::Draining
            ) {
                current = self
                    .shared
                    .stopped
                    .wait(current)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            drop(current);
            return self.shared.log_file.write_main(bytes);
        }

        let pool = &self.shared.pool;

        if bytes.len() > pool.capacity() {
            match current.take() {
                Some(page) if !page.is_empty() => self.push(Chunk::Page(page))?,
                Some(page) => pool.release(page),
                None => {}
            }
            self.push(Chunk::Oversize(bytes.to_vec()))?;
            return Ok(bytes.len());
        }

        let page = current.get_or_insert_with(|| pool.acquire());
        if !page.fits(bytes.len()) {
            let full = std::mem::replace(page, pool.acquire());
            self.push(Chunk::Page(full))?;
        }
        page.append(bytes);

        Ok(bytes.len())
    }

    /// Write directly to the fatal stream
    pub fn write_fatal(&self, bytes: &[u8]) -> io::Result<usize> {
        self.shared.log_file.write_fatal(bytes)
    }

    /// Stop the flusher, blocking until everything buffered is on disk
    ///
    /// Calling `stop` again is a no-op.
    pub fn stop(&self) {
        {
            let _current = self.shared.lock_current();
            if self.shared.state() != FlusherState::Running {
                return;
            }
            self.shared.set_state(FlusherState::Stopping);
        }

        let _ = self.stop_tx.send(());

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Flusher thread panicked before draining");
            }
        }
        self.shared.mark_stopped();
    }

    /// Queue a chunk; if the flusher thread is gone, write it synchronously
    fn push(&self, chunk: Chunk) -> io::Result<()> {
        match self.pages.send(chunk) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Flusher thread is gone, writing synchronously");
                match e.into_inner() {
                    Chunk::Page(page) => {
                        let result = self.shared.log_file.write_main(page.as_bytes());
                        self.shared.pool.release(page);
                        result.map(|_| ())
                    }
                    Chunk::Oversize(bytes) => self.shared.log_file.write_main(&bytes).map(|_| ()),
                }
            }
        }
    }
}

impl Drop for AsyncFlusher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Sink for AsyncFlusher {
    fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        AsyncFlusher::write(self, bytes)
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            fatal: true,
            stop: true,
        }
    }

    fn write_fatal(&self, bytes: &[u8]) -> io::Result<usize> {
        AsyncFlusher::write_fatal(self, bytes)
    }

    fn stop(&self) {
        AsyncFlusher::stop(self);
    }
}

/// Body of the flusher thread
fn run(
    shared: Arc<Shared>,
    pages_tx: Sender<Chunk>,
    pages: Receiver<Chunk>,
    stop: Receiver<()>,
    flush_interval: Duration,
) {
    let ticker = tick(flush_interval);
    let mut retry = never();

    loop {
        let mut hand_off = false;
        select! {
            recv(pages) -> chunk => match chunk {
                Ok(chunk) => shared.flush(chunk),
                Err(_) => break,
            },
            recv(ticker) -> _ => hand_off = true,
            recv(retry) -> _ => hand_off = true,
            recv(stop) -> _ => break,
        }

        if hand_off {
            retry = if shared.hand_off_current(&pages_tx) {
                never()
            } else {
                after(HANDOFF_RETRY)
            };
        }
    }

    shared.drain(&pages);
}
