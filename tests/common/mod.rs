//! Shared test support: a recording observer and small codecs.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use spoolq::codec::CodecError;
use spoolq::config::FileFactory;
use spoolq::{DataCodec, Observer, StreamError};

/// Records every event it sees and exposes wait helpers for the async drain.
pub struct TestObserver<T> {
    inner: Arc<ObserverInner<T>>,
}

struct ObserverInner<T> {
    items: Mutex<Vec<T>>,
    error: Mutex<Option<String>>,
    completed: AtomicBool,
    terminal_events: AtomicU64,
}

impl<T> TestObserver<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                items: Mutex::new(Vec::new()),
                error: Mutex::new(None),
                completed: AtomicBool::new(false),
                terminal_events: AtomicU64::new(0),
            }),
        }
    }

    pub fn item_count(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.error.lock().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub fn terminal_events(&self) -> u64 {
        self.inner.terminal_events.load(Ordering::SeqCst)
    }

    pub fn wait_for_items(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.item_count() >= n)
    }

    pub fn wait_for_terminal(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.terminal_events() > 0)
    }
}

impl<T: Clone> TestObserver<T> {
    pub fn items(&self) -> Vec<T> {
        self.inner.items.lock().clone()
    }
}

impl<T> Clone for TestObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> Observer<T> for TestObserver<T> {
    fn on_next(&self, item: T) {
        self.inner.items.lock().push(item);
    }

    fn on_error(&self, error: StreamError) {
        *self.inner.error.lock() = Some(error.to_string());
        self.inner.terminal_events.fetch_add(1, Ordering::SeqCst);
    }

    fn on_completed(&self) {
        self.inner.completed.store(true, Ordering::SeqCst);
        self.inner.terminal_events.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    check()
}

/// Little-endian `u32` codec.
pub struct U32Codec;

impl DataCodec<u32> for U32Codec {
    fn encode(&self, item: &u32, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&item.to_le_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u32, CodecError> {
        let arr: [u8; 4] = bytes.try_into().map_err(|_| "bad u32 payload length")?;
        Ok(u32::from_le_bytes(arr))
    }
}

/// `u32` codec padded to a fixed 20-byte payload, for rollover sizing tests.
pub struct PaddedU32Codec;

impl DataCodec<u32> for PaddedU32Codec {
    fn encode(&self, item: &u32, out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(&item.to_le_bytes());
        out.extend_from_slice(&[0u8; 16]);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u32, CodecError> {
        if bytes.len() != 20 {
            return Err("bad padded payload length".into());
        }
        let arr: [u8; 4] = bytes[..4].try_into().map_err(|_| "bad prefix")?;
        Ok(u32::from_le_bytes(arr))
    }
}

/// File factory producing numbered segment files in `dir`, counting how many
/// segments were ever created.
pub fn counting_file_factory(dir: &Path) -> (FileFactory, Arc<AtomicU64>) {
    let created = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&created);
    let base = dir.to_path_buf();
    let factory: FileFactory = Arc::new(move || {
        let seq = counter.fetch_add(1, Ordering::SeqCst);
        base.join(format!("segment-{seq}.buf"))
    });
    (factory, created)
}

/// Number of files currently present in `dir`.
pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
