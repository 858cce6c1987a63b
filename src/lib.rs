//! # HadroDB - An Embedded Log-Structured Key-Value Engine
//!
//! HadroDB stores schema-typed rows under byte-string keys in a BitCask-style
//! layout: one append-only log file per collection plus an in-memory hash
//! index (the KeyDir) that maps every live key to the offset of its most
//! recent frame.
//!
//! ## Architecture
//!
//! The storage engine consists of several key components:
//!
//! - **Record codec**: Encodes rows as fixed-width typed fields or as
//!   self-describing tagged values
//! - **Log segment**: Append-only frame log with positioned reads and a
//!   block-buffered forward scan
//! - **KeyDir**: Point-lookup index, rebuilt from the log on every open
//! - **Compaction**: Rewrites live frames into a fresh log on demand
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hadrodb::{DataType, Field, Options, Schema, Value, DB};
//!
//! # fn main() -> Result<(), hadrodb::Error> {
//! let schema = Schema::new(vec![
//!     Field::new("id", DataType::Integer),
//!     Field::new("name", DataType::Varchar),
//!     Field::nullable("score", DataType::Float),
//! ])?;
//!
//! // Open or create a collection
//! let db = DB::open("./users", schema, Options::default())?;
//!
//! // Write operations
//! db.set_values(b"a", vec![1i64.into(), "alice".into(), Value::Null])?;
//! db.set_values(b"b", vec![2i64.into(), "bob".into(), 9.5f64.into()])?;
//!
//! // Read operations
//! let row = db.get(b"a")?;
//! println!("Found: {}", row);
//!
//! // Delete operations
//! db.delete(b"a")?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod compaction;
pub mod config;
pub mod error;
pub mod keydir;
pub mod record;
pub mod schema;
pub mod segment;

// Re-exports
pub use compaction::CompactionStats;
pub use config::{Durability, Options};
pub use error::{Error, Result};
pub use keydir::RecoveryStats;
pub use record::RecordFormat;
pub use schema::{DataType, Field, Row, Schema, Value};

use compaction::CompactionJob;
use keydir::{KeyDir, KeyEntry};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use segment::{LogSegment, FLAG_DELETED};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mutable engine state. `None` once the collection is closed.
struct Inner {
    /// The collection's log
    segment: LogSegment,
    /// Index over `segment`
    keydir: KeyDir,
    /// Bytes of an incomplete trailing frame left in place on open.
    /// Writes are refused while this is non-zero.
    damaged_tail: u64,
}

/// The main collection handle.
///
/// This is the primary interface for interacting with the storage engine.
/// It supports point operations (`get`, `set`, `delete`), full scans and
/// on-demand compaction.
///
/// # Thread Safety
///
/// `DB` can be shared across threads using `Arc<DB>`. Writers are serialized
/// so that an append and its index update are observed together; readers run
/// concurrently with each other.
///
/// Only one `DB` may own a collection directory at a time. Nothing prevents
/// two processes from opening the same directory; callers must.
pub struct DB {
    /// Collection directory path
    path: PathBuf,

    /// Schema every row must conform to
    schema: Arc<Schema>,

    /// Configuration options
    options: Options,

    /// Log and index, guarded together
    inner: RwLock<Option<Inner>>,

    /// What the KeyDir rebuild found on open
    recovery_stats: RecoveryStats,
}

impl DB {
    /// Opens a collection at the specified directory.
    ///
    /// If the directory does not exist it is created (unless
    /// [`Options::create_if_missing`] is off). The KeyDir is then rebuilt by
    /// replaying the whole log, so open time grows with log size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `path` exists and is not a directory (`InvalidCollection`)
    /// - `path` is missing and may not be created (`InvalidCollection`)
    /// - the log cannot be created or written for lack of permission
    ///   (`InvalidCollection`)
    /// - a complete frame in the log cannot be decoded, or a zero-length
    ///   frame is followed by more data (`CorruptRecord`)
    /// - the log cannot be opened or read (`Io`)
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use hadrodb::{DataType, Durability, Field, Options, Schema, DB};
    ///
    /// # fn main() -> Result<(), hadrodb::Error> {
    /// let schema = Schema::new(vec![Field::new("id", DataType::Integer)])?;
    /// let options = Options::default().durability(Durability::Aggressive);
    /// let db = DB::open("./my_collection", schema, options)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(
        path: P,
        schema: impl Into<Arc<Schema>>,
        options: Options,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let schema = schema.into();

        options.validate()?;

        // Step 1: Make sure the collection directory exists
        if path.exists() {
            if !path.is_dir() {
                return Err(Error::invalid_collection(format!(
                    "{:?} exists and is not a directory",
                    path
                )));
            }
        } else if options.create_if_missing {
            std::fs::create_dir_all(&path)?;
        } else {
            return Err(Error::invalid_collection(format!(
                "Collection directory does not exist: {:?}",
                path
            )));
        }

        let log_path = segment::log_path(&path);
        if log_path.is_dir() {
            return Err(Error::invalid_collection(format!(
                "{:?} is a directory, expected a log file",
                log_path
            )));
        }

        log::warn!("HadroDB is experimental; do not trust it with data you cannot lose");

        // Step 2: Drop output of an interrupted compaction
        compaction::remove_stale(&log_path)?;

        // Step 3: Open the log and rebuild the index
        let mut segment = LogSegment::open(&log_path, options.durability).map_err(|e| match e {
            Error::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Error::invalid_collection(format!("Cannot open log {:?} for writing: {}", log_path, e))
            }
            other => other,
        })?;
        let (keydir, mut recovery_stats) = KeyDir::rebuild(&segment, options.scan_block_size)?;

        // Step 4: Deal with a write that never completed. The cut bytes are
        // kept in a side file; a corrupt length field looks exactly like a
        // torn frame.
        let mut damaged_tail = 0;
        if recovery_stats.truncated_bytes > 0 {
            if options.repair_truncated_tail {
                let torn_path = segment::torn_path(&log_path);
                log::warn!(
                    "Moving {} bytes of incomplete trailing frame from {:?} to {:?}",
                    recovery_stats.truncated_bytes,
                    log_path,
                    torn_path
                );
                segment.split_off_tail(recovery_stats.valid_len, &torn_path)?;
                recovery_stats.preserved_tail = Some(torn_path);
            } else {
                log::warn!(
                    "{:?} ends with {} bytes of incomplete frame; collection is read-only until compacted",
                    log_path,
                    recovery_stats.truncated_bytes
                );
                damaged_tail = recovery_stats.truncated_bytes;
            }
        }

        log::info!(
            "Opened collection {:?}: {} live keys, {} frames replayed",
            path,
            recovery_stats.live_keys,
            recovery_stats.frames_replayed
        );

        Ok(DB {
            path,
            schema,
            options,
            inner: RwLock::new(Some(Inner { segment, keydir, damaged_tail })),
            recovery_stats,
        })
    }

    /// Shared access to the open state, or `Closed`.
    fn state(&self) -> Result<MappedRwLockReadGuard<'_, Inner>> {
        RwLockReadGuard::try_map(self.inner.read(), Option::as_ref).map_err(|_| Error::Closed)
    }

    /// Appends one frame and applies it to the index under a single write lock.
    fn write_frame(&self, key: &[u8], flags: u8, payload: &[u8]) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(Error::Closed)?;

        if inner.damaged_tail > 0 {
            return Err(Error::corruption(format!(
                "log ends with {} bytes of incomplete frame; compact or reopen with repair enabled",
                inner.damaged_tail
            )));
        }

        // Index is touched only after the append succeeded.
        let offset = inner.segment.append_frame(flags, payload)?;
        if flags & FLAG_DELETED != 0 {
            inner.keydir.remove(key);
        } else {
            inner.keydir.upsert(key, KeyEntry { offset, size: payload.len() as u32 });
        }
        Ok(())
    }

    /// Stores `row` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` if the row was built against a different schema
    /// - `InvalidArgument` if the key is longer than 65,535 bytes
    /// - `Io` if the append fails; the index is left unchanged
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use hadrodb::{DataType, Field, Options, Schema, DB};
    /// # fn main() -> Result<(), hadrodb::Error> {
    /// # let schema = Schema::new(vec![Field::new("id", DataType::Integer)])?;
    /// # let db = DB::open("./data", schema, Options::default())?;
    /// let row = db.row(vec![42i64.into()])?;
    /// db.set(b"key", &row)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set(&self, key: &[u8], row: &Row) -> Result<()> {
        let payload = record::encode_entry(self.options.record_format, key, row, &self.schema)?;
        self.write_frame(key, 0, &payload)
    }

    /// Builds a row from `values` against the collection schema and stores it.
    pub fn set_values(&self, key: &[u8], values: Vec<Value>) -> Result<()> {
        let row = self.row(values)?;
        self.set(key, &row)
    }

    /// Builds a row bound to this collection's schema.
    pub fn row(&self, values: Vec<Value>) -> Result<Row> {
        Row::new(Arc::clone(&self.schema), values)
    }

    /// Retrieves the row stored under `key`.
    ///
    /// Costs one index lookup and one positioned read of exactly the frame.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if the key has no live value
    /// - `CorruptRecord` or `ShortRead` if the stored frame is damaged
    pub fn get(&self, key: &[u8]) -> Result<Row> {
        let inner = self.state()?;
        let entry = inner.keydir.lookup(key).ok_or(Error::KeyNotFound)?;
        self.read_row(&inner.segment, key, entry)
    }

    /// Looks up several keys under one read lock.
    ///
    /// Missing keys yield `None` in their position; any other error aborts.
    pub fn get_many<I, K>(&self, keys: I) -> Result<Vec<Option<Row>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let inner = self.state()?;
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                match inner.keydir.lookup(key) {
                    Some(entry) => self.read_row(&inner.segment, key, entry).map(Some),
                    None => Ok(None),
                }
            })
            .collect()
    }

    fn read_row(&self, segment: &LogSegment, key: &[u8], entry: KeyEntry) -> Result<Row> {
        let frame = segment.read_frame(entry.offset, entry.size)?;
        if frame.is_tombstone() {
            return Err(Error::corruption(format!(
                "index points at a tombstone at offset {}",
                entry.offset
            )));
        }

        let (stored_key, data) = record::split_entry(&frame.payload)?;
        if stored_key != key {
            return Err(Error::corruption(format!(
                "frame at offset {} belongs to a different key",
                entry.offset
            )));
        }

        self.options.record_format.decode(data, &self.schema)
    }

    /// Deletes `key`.
    ///
    /// A tombstone is appended even if the key is absent, so deleting twice
    /// or deleting a key that never existed is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let payload = record::encode_tombstone(key)?;
        self.write_frame(key, FLAG_DELETED, &payload)
    }

    /// Returns every live key with its current row, in file order of each
    /// key's most recent write.
    pub fn scan_all(&self) -> Result<Vec<(Vec<u8>, Row)>> {
        self.scan_live()
    }

    /// Like [`scan_all`](Self::scan_all), keeping only entries for which
    /// `predicate` returns true.
    ///
    /// The scan reads the log sequentially in
    /// [`Options::scan_block_size`] blocks, independent of the index. The
    /// predicate runs after the scan has released the collection, so it may
    /// call back into this `DB`; rows it sees are the ones live when the scan
    /// finished.
    pub fn scan_where<F>(&self, mut predicate: F) -> Result<Vec<(Vec<u8>, Row)>>
    where
        F: FnMut(&[u8], &Row) -> bool,
    {
        let rows = self.scan_live()?;
        Ok(rows.into_iter().filter(|(key, row)| predicate(key.as_slice(), row)).collect())
    }

    fn scan_live(&self) -> Result<Vec<(Vec<u8>, Row)>> {
        let inner = self.state()?;
        let mut out = Vec::new();

        for frame in inner.segment.scan(self.options.scan_block_size)? {
            let frame = frame?;
            if frame.is_tombstone() {
                continue;
            }

            let (key, data) = record::split_entry(&frame.payload)?;
            // Superseded or later deleted.
            if !inner.keydir.is_current(key, frame.offset) {
                continue;
            }

            let row = self.options.record_format.decode(data, &self.schema)?;
            out.push((key.to_vec(), row));
        }

        Ok(out)
    }

    /// All live keys, in no particular order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let inner = self.state()?;
        Ok(inner.keydir.keys().map(<[u8]>::to_vec).collect())
    }

    /// Whether `key` has a live value. Does not touch the disk.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.state()?.keydir.contains_key(key))
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state()?.keydir.len())
    }

    /// Returns true if the collection holds no live keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.state()?.keydir.is_empty())
    }

    /// Forces all appended frames to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.state()?.segment.sync()
    }

    /// Rewrites the log so it holds only the latest frame of each live key.
    ///
    /// Runs in the foreground under the writer lock. Readers and writers wait
    /// for it; point lookups return the same rows before and after. An
    /// incomplete trailing frame left by a non-repairing open is discarded,
    /// which makes the collection writable again.
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(Error::Closed)?;

        let log_path = inner.segment.path().to_path_buf();
        let result =
            CompactionJob::new(&inner.segment, &inner.keydir, self.options.scan_block_size).run()?;

        if let Err(e) = compaction::install(&result.output_path, &log_path) {
            if let Err(cleanup) = std::fs::remove_file(&result.output_path) {
                log::warn!("Failed to remove compaction output: {}", cleanup);
            }
            return Err(e);
        }

        match LogSegment::open(&log_path, self.options.durability) {
            Ok(segment) => {
                *inner = Inner { segment, keydir: result.keydir, damaged_tail: 0 };
            }
            Err(e) => {
                // The old handle now points at an unlinked file; refuse further use.
                log::error!("Failed to reopen {:?} after compaction: {}", log_path, e);
                *guard = None;
                return Err(e);
            }
        }

        log::info!(
            "Compaction completed: {} live records, {} -> {} bytes",
            result.stats.live_records,
            result.stats.bytes_before,
            result.stats.bytes_after
        );

        Ok(result.stats)
    }

    /// Syncs the log and releases it.
    ///
    /// Calling `close` again is a no-op. Every other operation on a closed
    /// collection fails with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let Some(inner) = self.inner.write().take() else {
            return Ok(());
        };

        inner.segment.close()?;
        log::debug!("Collection {:?} closed", self.path);
        Ok(())
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }

    /// What the KeyDir rebuild found when this collection was opened.
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery_stats
    }

    /// Collection directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collection schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Options the collection was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        // Errors cannot be propagated from drop
        if let Some(inner) = self.inner.get_mut() {
            if let Err(e) = inner.segment.sync() {
                log::warn!("Error syncing log during drop: {}", e);
            }
        }
    }
}
