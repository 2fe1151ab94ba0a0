//! Fixed-capacity byte pages and the pool that recycles them
//!
//! A `Page` is the unit of batched disk I/O. Pages move by value between the
//! pool, the flusher's current slot, the handoff queue and the flusher thread,
//! so at any moment exactly one holder owns each page.

use std::fmt;
use std::sync::Mutex;

/// A byte buffer with a fixed capacity
#[derive(Debug)]
pub struct Page {
    bytes: Vec<u8>,
    capacity: usize,
}

impl Page {
    /// Create an empty page able to hold `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Configured capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes that can still be appended before the page is full
    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    /// Check whether `len` more bytes fit in this page
    pub fn fits(&self, len: usize) -> bool {
        len <= self.remaining()
    }

    /// Append bytes to the page
    ///
    /// # Panics
    /// Panics if `bytes` does not fit. Callers check `remaining()` first.
    pub fn append(&mut self, bytes: &[u8]) {
        assert!(
            self.fits(bytes.len()),
            "page overflow: {} bytes into {} remaining",
            bytes.len(),
            self.remaining()
        );
        self.bytes.extend_from_slice(bytes);
    }

    pub fn append_byte(&mut self, byte: u8) {
        self.append(&[byte]);
    }

    pub fn append_str(&mut self, s: &str) {
        self.append(s.as_bytes());
    }

    /// Append the decimal form of `value`
    pub fn append_uint(&mut self, value: u64) {
        self.append_uint_padded(value, 1);
    }

    /// Append the decimal form of `value`, zero-padded to at least `width` digits
    pub fn append_uint_padded(&mut self, value: u64, width: usize) {
        let mut digits = [b'0'; 20];
        let mut pos = digits.len();
        let mut v = value;
        loop {
            pos -= 1;
            digits[pos] = b'0' + (v % 10) as u8;
            v /= 10;
            if v == 0 {
                break;
            }
        }
        let start = pos.min(digits.len().saturating_sub(width));
        self.append(&digits[start..]);
    }

    /// Grow the capacity so that the page can hold `total` bytes
    ///
    /// Only scratch pages are grown; a grown page no longer matches its pool's
    /// capacity and is dropped instead of recycled on release.
    pub fn reserve_total(&mut self, total: usize) {
        if total > self.capacity {
            self.bytes.reserve_exact(total - self.bytes.len());
            self.capacity = total;
        }
    }

    /// Drop everything past the first `len` bytes
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// View of the bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn reset(&mut self) {
        self.bytes.clear();
    }
}

impl fmt::Write for Page {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !self.fits(s.len()) {
            return Err(fmt::Error);
        }
        self.append_str(s);
        Ok(())
    }
}

/// Thread-safe free list of uniformly sized pages
///
/// The pool never blocks and never fails: when the free list is empty a new
/// page is allocated. It never shrinks either.
#[derive(Debug)]
pub struct PagePool {
    capacity: usize,
    free: Mutex<Vec<Page>>,
}

impl PagePool {
    /// Create an empty pool issuing pages of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Capacity of every page issued by this pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take an empty page from the free list, allocating if none is free
    pub fn acquire(&self) -> Page {
        let recycled = self.free.lock().ok().and_then(|mut free| free.pop());
        match recycled {
            Some(mut page) => {
                page.reset();
                page
            }
            None => Page::with_capacity(self.capacity),
        }
    }

    /// Return a page to the free list
    pub fn release(&self, mut page: Page) {
        if page.capacity() != self.capacity {
            return;
        }
        page.reset();
        if let Ok(mut free) = self.free.lock() {
            free.push(page);
        }
    }

    /// Number of pages currently waiting on the free list
    pub fn free_len(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    #[test]
    fn test_page_append_and_remaining() {
        let mut page = Page::with_capacity(8);
        assert!(page.is_empty());
        assert_eq!(page.remaining(), 8);

        page.append(b"abc");
        page.append_byte(b'-');
        assert_eq!(page.len(), 4);
        assert_eq!(page.remaining(), 4);
        assert_eq!(page.as_bytes(), b"abc-");
        assert!(page.fits(4));
        assert!(!page.fits(5));
    }

    #[test]
    #[should_panic(expected = "page overflow")]
    fn test_page_append_past_capacity_panics() {
        let mut page = Page::with_capacity(4);
        page.append(b"12345");
    }

    #[test]
    fn test_page_append_uint() {
        let mut page = Page::with_capacity(64);
        page.append_uint(0);
        page.append_byte(b' ');
        page.append_uint(42);
        page.append_byte(b' ');
        page.append_uint(u64::MAX);
        assert_eq!(page.as_bytes(), b"0 42 18446744073709551615");
    }

    #[test]
    fn test_page_append_uint_padded() {
        let mut page = Page::with_capacity(64);
        page.append_uint_padded(4321, 6);
        page.append_byte(b' ');
        page.append_uint_padded(999_999, 6);
        page.append_byte(b' ');
        page.append_uint_padded(1_234_567, 6);
        page.append_byte(b' ');
        page.append_uint_padded(0, 3);
        assert_eq!(page.as_bytes(), b"004321 999999 1234567 000");
    }

    #[test]
    fn test_page_fmt_write_respects_capacity() {
        let mut page = Page::with_capacity(6);
        assert!(write!(page, "{}-{}", 12, 34).is_ok());
        assert_eq!(page.as_bytes(), b"12-34");
        assert!(write!(page, "toolong").is_err());
        assert_eq!(page.len(), 5);
    }

    #[test]
    fn test_page_reserve_total() {
        let mut page = Page::with_capacity(4);
        page.append(b"ab");
        page.reserve_total(10);
        assert_eq!(page.capacity(), 10);
        page.append(b"cdefghij");
        assert_eq!(page.as_bytes(), b"abcdefghij");
    }

    #[test]
    fn test_pool_allocates_when_empty() {
        let pool = PagePool::new(32);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(a.capacity(), 32);
        assert_eq!(b.capacity(), 32);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_pool_recycles_reset_pages() {
        let pool = PagePool::new(16);
        let mut page = pool.acquire();
        page.append(b"hello");
        pool.release(page);
        assert_eq!(pool.free_len(), 1);

        let page = pool.acquire();
        assert!(page.is_empty());
        assert_eq!(page.capacity(), 16);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_pool_drops_foreign_capacity() {
        let pool = PagePool::new(16);
        let mut page = pool.acquire();
        page.reserve_total(64);
        pool.release(page);
        assert_eq!(pool.free_len(), 0);

        pool.release(Page::with_capacity(8));
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn test_pool_concurrent_use() {
        use std::sync::Arc;
        use std::thread;

        let pool = Arc::new(PagePool::new(8));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut page = pool.acquire();
                        page.append(b"12345678");
                        pool.release(page);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.free_len() >= 1 && pool.free_len() <= 4);
    }
}
