//! # KeyDir - In-Memory Index
//!
//! The KeyDir maps every live key to the location of its most recent frame in
//! the log. It holds locations only, never values, so a lookup costs one hash-map
//! access plus one positioned read.
//!
//! The KeyDir is never persisted. On open it is rebuilt by replaying the log
//! from the start: a live frame inserts or overwrites its key, a tombstone
//! removes it. File order is write order, so the last frame for a key wins.

use crate::error::Result;
use crate::record;
use crate::segment::{Frame, LogSegment};
use std::collections::HashMap;
use std::path::PathBuf;

/// Location of a key's most recent live frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    /// Byte offset of the frame header
    pub offset: u64,
    /// Payload length in bytes
    pub size: u32,
}

/// Counters gathered while replaying the log on open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Complete frames read from the log
    pub frames_replayed: u64,
    /// How many of those were tombstones
    pub tombstones_replayed: u64,
    /// Keys live after replay
    pub live_keys: usize,
    /// End offset of the last complete frame
    pub valid_len: u64,
    /// Bytes past `valid_len` that belonged to an incomplete trailing frame
    pub truncated_bytes: u64,
    /// Side file the trailing bytes were moved to, if open repaired the log
    pub preserved_tail: Option<PathBuf>,
}

/// In-memory point-lookup index over the log.
#[derive(Debug, Default)]
pub struct KeyDir {
    entries: HashMap<Vec<u8>, KeyEntry>,
}

impl KeyDir {
    /// Creates an empty KeyDir.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the KeyDir by a full forward scan of `segment`.
    ///
    /// An incomplete trailing frame ends the scan without error and is
    /// reported through [`RecoveryStats::truncated_bytes`]. A complete frame
    /// whose key cannot be read fails the rebuild with `CorruptRecord`.
    pub fn rebuild(segment: &LogSegment, block_size: usize) -> Result<(Self, RecoveryStats)> {
        let mut keydir = KeyDir::new();
        let mut stats = RecoveryStats::default();

        let mut scanner = segment.scan(block_size)?;
        for frame in scanner.by_ref() {
            let frame = frame?;
            keydir.apply(&frame)?;

            stats.frames_replayed += 1;
            if frame.is_tombstone() {
                stats.tombstones_replayed += 1;
            }
        }

        stats.valid_len = scanner.valid_len();
        stats.truncated_bytes = segment.len().saturating_sub(stats.valid_len);
        stats.live_keys = keydir.len();

        Ok((keydir, stats))
    }

    /// Applies one replayed frame.
    pub fn apply(&mut self, frame: &Frame) -> Result<()> {
        let (key, _) = record::split_entry(&frame.payload)?;

        if frame.is_tombstone() {
            self.remove(key);
        } else {
            // Frame payloads were read against a u32 length, so this cannot truncate.
            let size = frame.payload.len() as u32;
            self.upsert(key, KeyEntry { offset: frame.offset, size });
        }
        Ok(())
    }

    /// Location of a key's latest live frame.
    pub fn lookup(&self, key: &[u8]) -> Option<KeyEntry> {
        self.entries.get(key).copied()
    }

    /// Points `key` at a newly written frame. Returns the previous location.
    pub fn upsert(&mut self, key: &[u8], entry: KeyEntry) -> Option<KeyEntry> {
        match self.entries.get_mut(key) {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.insert(key.to_vec(), entry);
                None
            }
        }
    }

    /// Drops `key` from the index. Returns its last location, if any.
    pub fn remove(&mut self, key: &[u8]) -> Option<KeyEntry> {
        self.entries.remove(key)
    }

    /// Whether `key` has a live frame.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether the frame at `offset` is the latest live frame for `key`.
    pub fn is_current(&self, key: &[u8], offset: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.offset == offset)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Durability;
    use crate::segment::{log_path, FLAG_DELETED};
    use tempfile::TempDir;

    fn put(log: &mut LogSegment, key: &[u8], body: &[u8]) -> u64 {
        let mut payload = record::encode_tombstone(key).unwrap();
        payload.extend_from_slice(body);
        log.append_frame(0, &payload).unwrap()
    }

    fn del(log: &mut LogSegment, key: &[u8]) -> u64 {
        let payload = record::encode_tombstone(key).unwrap();
        log.append_frame(FLAG_DELETED, &payload).unwrap()
    }

    #[test]
    fn test_upsert_and_remove() {
        let mut keydir = KeyDir::new();
        assert!(keydir.is_empty());

        let first = KeyEntry { offset: 0, size: 10 };
        let second = KeyEntry { offset: 15, size: 4 };

        assert_eq!(keydir.upsert(b"k", first), None);
        assert_eq!(keydir.upsert(b"k", second), Some(first));
        assert_eq!(keydir.lookup(b"k"), Some(second));
        assert_eq!(keydir.len(), 1);

        assert_eq!(keydir.remove(b"k"), Some(second));
        assert_eq!(keydir.lookup(b"k"), None);
        assert_eq!(keydir.remove(b"k"), None);
    }

    #[test]
    fn test_rebuild_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        let mut log = LogSegment::open(log_path(dir.path()), Durability::Deferred).unwrap();

        put(&mut log, b"a", b"v1");
        let a2 = put(&mut log, b"a", b"v2");
        put(&mut log, b"b", b"v1");
        del(&mut log, b"b");
        del(&mut log, b"never-existed");
        let c = put(&mut log, b"c", b"v1");

        let (keydir, stats) = KeyDir::rebuild(&log, 7).unwrap();

        assert_eq!(keydir.len(), 2);
        assert_eq!(keydir.lookup(b"a").map(|e| e.offset), Some(a2));
        assert_eq!(keydir.lookup(b"b"), None);
        assert_eq!(keydir.lookup(b"c").map(|e| e.offset), Some(c));
        assert!(keydir.is_current(b"a", a2));

        assert_eq!(stats.frames_replayed, 6);
        assert_eq!(stats.tombstones_replayed, 2);
        assert_eq!(stats.live_keys, 2);
        assert_eq!(stats.truncated_bytes, 0);
        assert_eq!(stats.valid_len, log.len());
    }

    #[test]
    fn test_rebuild_reinsert_after_delete() {
        let dir = TempDir::new().unwrap();
        let mut log = LogSegment::open(log_path(dir.path()), Durability::Deferred).unwrap();

        put(&mut log, b"k", b"old");
        del(&mut log, b"k");
        let latest = put(&mut log, b"k", b"new");

        let (keydir, _) = KeyDir::rebuild(&log, 1024).unwrap();
        assert_eq!(keydir.lookup(b"k"), Some(KeyEntry { offset: latest, size: 6 }));
    }

    #[test]
    fn test_rebuild_reports_truncated_tail() {
        let dir = TempDir::new().unwrap();
        let mut log = LogSegment::open(log_path(dir.path()), Durability::Deferred).unwrap();

        put(&mut log, b"k", b"value");
        let valid = log.len();
        log.append(&[0, 0, 0, 0, 50, 1, 2]).unwrap();

        let (keydir, stats) = KeyDir::rebuild(&log, 4).unwrap();
        assert_eq!(keydir.len(), 1);
        assert_eq!(stats.valid_len, valid);
        assert_eq!(stats.truncated_bytes, 7);
    }

    #[test]
    fn test_rebuild_rejects_unreadable_key() {
        let dir = TempDir::new().unwrap();
        let mut log = LogSegment::open(log_path(dir.path()), Durability::Deferred).unwrap();

        // Complete frame, but its key length runs past the payload.
        log.append_frame(0, &[0, 9, b'x']).unwrap();

        let result = KeyDir::rebuild(&log, 1024);
        assert!(matches!(result, Err(crate::Error::CorruptRecord(_))));
    }
}
