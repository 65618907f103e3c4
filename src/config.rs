//! Spool configuration.
//!
//! All knobs the operator exposes: per-segment ring capacity, the two
//! rollover caps, the delay-error policy, and the segment file factory.
//! Validation happens once, in [`SpoolConfigBuilder::build`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default per-segment ring capacity (2 MiB).
pub const DEFAULT_BUFFER_SIZE_BYTES: u64 = 2 * 1024 * 1024;

/// Smallest usable ring: room for one minimal frame plus the seal sentinel.
pub const MIN_BUFFER_SIZE_BYTES: u64 = 16;

/// Produces a fresh file path per segment.
///
/// The factory is responsible for uniqueness; the queue is responsible for
/// unlinking the file when the segment retires and on teardown.
pub type FileFactory = Arc<dyn Fn() -> PathBuf + Send + Sync>;

/// Error type for configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The per-segment capacity cannot hold even one minimal frame.
    #[error("buffer_size_bytes must be at least {MIN_BUFFER_SIZE_BYTES}, got {0}")]
    BufferTooSmall(u64),

    /// A rollover cap was set to zero; use `None` to disable a cap instead.
    #[error("{0} must be positive when set")]
    ZeroRollover(&'static str),
}

/// Options for the buffer-to-file operator.
///
/// Build through [`SpoolConfig::builder`]; a constructed config is always
/// valid.
#[derive(Clone)]
pub struct SpoolConfig {
    /// Ring capacity per segment, in bytes.
    pub buffer_size_bytes: u64,

    /// Seal the current segment once it holds this many payload bytes.
    /// `None` disables size-based rollover.
    pub rollover_size_bytes: Option<u64>,

    /// Seal the current segment once it holds this many items.
    /// `None` disables count-based rollover.
    pub rollover_every: Option<u64>,

    /// Defer an upstream error until every buffered item has been delivered.
    pub delay_error: bool,

    /// Produces the backing file path for each segment.
    pub file_factory: FileFactory,
}

impl SpoolConfig {
    /// Creates a builder with the defaults.
    #[must_use]
    pub fn builder() -> SpoolConfigBuilder {
        SpoolConfigBuilder::default()
    }

    /// True when either rollover cap is configured.
    #[must_use]
    pub fn rolls_over(&self) -> bool {
        self.rollover_size_bytes.is_some() || self.rollover_every.is_some()
    }
}

impl std::fmt::Debug for SpoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolConfig")
            .field("buffer_size_bytes", &self.buffer_size_bytes)
            .field("rollover_size_bytes", &self.rollover_size_bytes)
            .field("rollover_every", &self.rollover_every)
            .field("delay_error", &self.delay_error)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SpoolConfig`].
#[derive(Default)]
pub struct SpoolConfigBuilder {
    buffer_size_bytes: Option<u64>,
    rollover_size_bytes: Option<u64>,
    rollover_every: Option<u64>,
    delay_error: bool,
    file_factory: Option<FileFactory>,
}

impl SpoolConfigBuilder {
    /// Sets the ring capacity per segment, in bytes.
    #[must_use]
    pub fn buffer_size_bytes(mut self, bytes: u64) -> Self {
        self.buffer_size_bytes = Some(bytes);
        self
    }

    /// Seals a segment once it holds `bytes` payload bytes.
    #[must_use]
    pub fn rollover_size_bytes(mut self, bytes: u64) -> Self {
        self.rollover_size_bytes = Some(bytes);
        self
    }

    /// Seals a segment once it holds `items` items.
    #[must_use]
    pub fn rollover_every(mut self, items: u64) -> Self {
        self.rollover_every = Some(items);
        self
    }

    /// Defers an upstream error until buffered items have been delivered.
    #[must_use]
    pub fn delay_error(mut self, delay: bool) -> Self {
        self.delay_error = delay;
        self
    }

    /// Sets the segment file factory.
    #[must_use]
    pub fn file_factory(mut self, factory: FileFactory) -> Self {
        self.file_factory = Some(factory);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the buffer is too small for a single frame
    /// or a rollover cap is zero.
    pub fn build(self) -> Result<SpoolConfig, ConfigError> {
        let buffer_size_bytes = self.buffer_size_bytes.unwrap_or(DEFAULT_BUFFER_SIZE_BYTES);
        if buffer_size_bytes < MIN_BUFFER_SIZE_BYTES {
            return Err(ConfigError::BufferTooSmall(buffer_size_bytes));
        }
        if self.rollover_size_bytes == Some(0) {
            return Err(ConfigError::ZeroRollover("rollover_size_bytes"));
        }
        if self.rollover_every == Some(0) {
            return Err(ConfigError::ZeroRollover("rollover_every"));
        }

        Ok(SpoolConfig {
            buffer_size_bytes,
            rollover_size_bytes: self.rollover_size_bytes,
            rollover_every: self.rollover_every,
            delay_error: self.delay_error,
            file_factory: self.file_factory.unwrap_or_else(default_file_factory),
        })
    }
}

/// Default factory: unique paths under the system temp directory, from the
/// process id plus a process-wide counter.
fn default_file_factory() -> FileFactory {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    Arc::new(|| {
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("spoolq-{}-{seq}.buf", std::process::id()))
    })
}
