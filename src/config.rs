//! Configuration options for HadroDB storage engine.

use crate::record::RecordFormat;

/// Default read buffer used by forward scans (8 MiB).
pub const DEFAULT_SCAN_BLOCK_SIZE: usize = 8 * 1024 * 1024;

/// When appended frames are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Writes are handed to the OS immediately and flushed at its discretion,
    /// and always on `close`.
    #[default]
    Deferred,

    /// Every append is followed by an fsync before it returns.
    Aggressive,
}

/// Configuration options for opening a collection.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the collection directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Durability mode for appends.
    /// Default: Durability::Deferred
    pub durability: Durability,

    /// Wire format used for row payloads.
    /// Default: RecordFormat::Fixed
    pub record_format: RecordFormat,

    /// Read buffer size for forward scans (in bytes).
    /// Default: 8MB
    pub scan_block_size: usize,

    /// Cut a partially written trailing frame off the log on open.
    /// Default: true
    pub repair_truncated_tail: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            durability: Durability::Deferred,
            record_format: RecordFormat::Fixed,
            scan_block_size: DEFAULT_SCAN_BLOCK_SIZE,
            repair_truncated_tail: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the collection if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the durability mode.
    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets the row wire format.
    pub fn record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    /// Sets the scan read buffer size.
    pub fn scan_block_size(mut self, size: usize) -> Self {
        self.scan_block_size = size;
        self
    }

    /// Sets whether a truncated trailing frame is cut off on open.
    pub fn repair_truncated_tail(mut self, value: bool) -> Self {
        self.repair_truncated_tail = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.scan_block_size == 0 {
            return Err(crate::Error::invalid_argument("scan_block_size must be > 0"));
        }
        Ok(())
    }
}
