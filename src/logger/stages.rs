//! Formatting stages
//!
//! Each stage appends one field of the line header to the scratch page. The
//! logger runs them in a fixed order: severity tag, timestamp, server name,
//! caller location.

use std::panic::Location;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Local};

use super::level::Level;
use crate::page::Page;

/// Per-call data available to every stage
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub level: Level,
    /// Call site, if it could be resolved
    pub location: Option<&'a Location<'a>>,
}

/// One step of the header pipeline
pub trait Stage: Send + Sync {
    fn apply(&self, page: &mut Page, record: &Record<'_>);
}

/// Append to a scratch page, growing it when the bytes do not fit
pub(crate) fn append_growing(page: &mut Page, bytes: &[u8]) {
    if !page.fits(bytes.len()) {
        page.reserve_total(page.len() + bytes.len());
    }
    page.append(bytes);
}

/// `INFO: `, `FATAL: `, ...
pub struct SeverityStage;

impl Stage for SeverityStage {
    fn apply(&self, page: &mut Page, record: &Record<'_>) {
        append_growing(page, record.level.tag().as_bytes());
    }
}

/// Length of `MM-DD HH:MM:SS.`
const PREFIX_LEN: usize = 15;

struct CachedPrefix {
    second: i64,
    prefix: [u8; PREFIX_LEN],
}

/// `MM-DD HH:MM:SS.NNNNNN `
///
/// The second-granularity prefix is formatted once per wall-clock second;
/// the microsecond suffix is computed on every call.
pub struct TimestampStage {
    cached_second: AtomicI64,
    cache: RwLock<CachedPrefix>,
}

impl TimestampStage {
    pub fn new() -> Self {
        Self {
            cached_second: AtomicI64::new(i64::MIN),
            cache: RwLock::new(CachedPrefix {
                second: i64::MIN,
                prefix: [0; PREFIX_LEN],
            }),
        }
    }

    fn prefix_for(&self, now: &DateTime<Local>) -> [u8; PREFIX_LEN] {
        let second = now.timestamp();

        if self.cached_second.load(Ordering::Acquire) == second {
            let cached = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if cached.second == second {
                return cached.prefix;
            }
        }

        let mut cached = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cached.second != second {
            cached.prefix = format_prefix(now);
            cached.second = second;
            self.cached_second.store(second, Ordering::Release);
        }
        cached.prefix
    }

    /// Append the timestamp for `now`
    pub fn append_at(&self, page: &mut Page, now: &DateTime<Local>) {
        let prefix = self.prefix_for(now);
        append_growing(page, &prefix);

        // Leap seconds report 1_000_000.. micros
        let micros = now.timestamp_subsec_micros().min(999_999);
        if !page.fits(7) {
            page.reserve_total(page.len() + 7);
        }
        page.append_uint_padded(u64::from(micros), 6);
        page.append_byte(b' ');
    }
}

impl Default for TimestampStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TimestampStage {
    fn apply(&self, page: &mut Page, _record: &Record<'_>) {
        self.append_at(page, &Local::now());
    }
}

fn format_prefix(now: &DateTime<Local>) -> [u8; PREFIX_LEN] {
    let formatted = now.format("%m-%d %H:%M:%S.").to_string();
    let mut prefix = [b' '; PREFIX_LEN];
    let len = formatted.len().min(PREFIX_LEN);
    prefix[..len].copy_from_slice(&formatted.as_bytes()[..len]);
    prefix
}

/// Server/process name, embedded verbatim
pub struct ServerNameStage {
    name: Vec<u8>,
}

impl ServerNameStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
        }
    }
}

impl Stage for ServerNameStage {
    fn apply(&self, page: &mut Page, _record: &Record<'_>) {
        append_growing(page, &self.name);
    }
}

/// `[file:line] ` of the call site, `[???:0] ` when unknown
pub struct CallerStage;

impl Stage for CallerStage {
    fn apply(&self, page: &mut Page, record: &Record<'_>) {
        let (file, line) = match record.location {
            Some(location) => (base_name(location.file()), location.line()),
            None => ("???", 0),
        };
        append_growing(page, b"[");
        append_growing(page, file.as_bytes());
        append_growing(page, b":");
        if !page.fits(10) {
            page.reserve_total(page.len() + 10);
        }
        page.append_uint(u64::from(line));
        append_growing(page, b"] ");
    }
}

/// Last component of a source path, for either separator style
fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn render(stage: &dyn Stage, record: &Record<'_>) -> String {
        let mut page = Page::with_capacity(4);
        stage.apply(&mut page, record);
        String::from_utf8(page.as_bytes().to_vec()).unwrap()
    }

    fn record(level: Level) -> Record<'static> {
        Record {
            level,
            location: None,
        }
    }

    #[test]
    fn test_severity_stage() {
        assert_eq!(render(&SeverityStage, &record(Level::Warning)), "WARNING: ");
        assert_eq!(render(&SeverityStage, &record(Level::Fatal)), "FATAL: ");
    }

    #[test]
    fn test_server_name_stage_is_verbatim() {
        let stage = ServerNameStage::new("shannon");
        assert_eq!(render(&stage, &record(Level::Info)), "shannon");
    }

    #[test]
    fn test_caller_stage_known_location() {
        let location = Location::caller();
        let rec = Record {
            level: Level::Info,
            location: Some(location),
        };
        assert_eq!(
            render(&CallerStage, &rec),
            format!("[stages.rs:{}] ", location.line())
        );
    }

    #[test]
    fn test_caller_stage_unknown_location() {
        assert_eq!(render(&CallerStage, &record(Level::Info)), "[???:0] ");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("src/logger/mod.rs"), "mod.rs");
        assert_eq!(base_name("C:\\work\\main.rs"), "main.rs");
        assert_eq!(base_name("main.rs"), "main.rs");
    }

    #[test]
    fn test_timestamp_format() {
        let stage = TimestampStage::new();
        let at = Local
            .with_ymd_and_hms(2026, 3, 7, 9, 5, 2)
            .unwrap()
            .checked_add_signed(chrono::Duration::microseconds(4321))
            .unwrap();

        let mut page = Page::with_capacity(64);
        stage.append_at(&mut page, &at);
        assert_eq!(page.as_bytes(), b"03-07 09:05:02.004321 ");
    }

    #[test]
    fn test_timestamp_grows_small_scratch_page() {
        let stage = TimestampStage::new();
        let at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap()
            + chrono::Duration::microseconds(7);

        let mut page = Page::with_capacity(16);
        stage.append_at(&mut page, &at);
        assert_eq!(page.as_bytes(), b"03-07 09:05:02.000007 ");
    }

    #[test]
    fn test_timestamp_prefix_cached_per_second() {
        let stage = TimestampStage::new();
        let base = Local.with_ymd_and_hms(2026, 10, 16, 14, 30, 45).unwrap();
        let later = base + chrono::Duration::microseconds(999_000);
        let next = base + chrono::Duration::seconds(1);

        let mut page = Page::with_capacity(128);
        stage.append_at(&mut page, &base);
        stage.append_at(&mut page, &later);
        stage.append_at(&mut page, &next);
        assert_eq!(
            String::from_utf8(page.as_bytes().to_vec()).unwrap(),
            "10-16 14:30:45.000000 10-16 14:30:45.999000 10-16 14:30:46.000000 "
        );
        assert_eq!(stage.cached_second.load(Ordering::Acquire), next.timestamp());
    }

    #[test]
    fn test_timestamp_stage_live_clock_shape() {
        let stage = TimestampStage::new();
        let rendered = render(&stage, &record(Level::Info));
        let bytes = rendered.as_bytes();
        assert_eq!(bytes.len(), 22);
        assert_eq!(bytes[2], b'-');
        assert_eq!(bytes[5], b' ');
        assert_eq!(bytes[14], b'.');
        assert_eq!(bytes[21], b' ');
        assert!(bytes[15..21].iter().all(u8::is_ascii_digit));
    }
}
