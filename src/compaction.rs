//! Compaction of obsolete frames.
//!
//! The log only ever grows: overwritten values and tombstones stay on disk
//! until compaction. A compaction job copies the latest live frame of every
//! key into a fresh file next to the log, then the caller installs it with an
//! atomic rename.
//!
//! ## Process
//!
//! 1. Remove any leftover output from an interrupted run
//! 2. Scan the current log; keep a frame only if the KeyDir still points at it
//! 3. Append kept frames to `<log>.compact`, building a new KeyDir as we go
//! 4. Fsync the output
//! 5. Rename it over the log and fsync the directory ([`install`])
//!
//! Tombstones are dropped: once no live frame for a key survives, there is
//! nothing left for them to shadow.

use crate::config::Durability;
use crate::error::Result;
use crate::keydir::{KeyDir, KeyEntry};
use crate::record;
use crate::segment::LogSegment;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Suffix appended to the log file name for compaction output
pub const COMPACT_SUFFIX: &str = ".compact";

/// Path of the compaction output for a given log file
pub fn compact_path(log_path: &Path) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(COMPACT_SUFFIX);
    PathBuf::from(name)
}

/// Delete compaction output left behind by an interrupted run.
///
/// Returns true if a file was removed.
pub fn remove_stale(log_path: &Path) -> Result<bool> {
    let path = compact_path(log_path);
    if !path.exists() {
        return Ok(false);
    }

    std::fs::remove_file(&path)?;
    log::warn!("Removed stale compaction output {:?}", path);
    Ok(true)
}

/// Size accounting for a finished compaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Frames copied into the new log
    pub live_records: usize,
    /// Log size before compaction
    pub bytes_before: u64,
    /// Log size after compaction
    pub bytes_after: u64,
}

impl CompactionStats {
    /// Bytes freed by the compaction
    pub fn reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Output of [`CompactionJob::run`]
pub struct CompactionResult {
    /// Index over the new file
    pub keydir: KeyDir,
    /// Size accounting
    pub stats: CompactionStats,
    /// Path of the written file; not yet installed
    pub output_path: PathBuf,
}

/// Compaction job that rewrites the live frames of one log
pub struct CompactionJob<'a> {
    /// Log being compacted
    source: &'a LogSegment,
    /// Current index over `source`
    keydir: &'a KeyDir,
    /// Read buffer for the scan
    block_size: usize,
}

impl<'a> CompactionJob<'a> {
    /// Create a new compaction job
    pub fn new(source: &'a LogSegment, keydir: &'a KeyDir, block_size: usize) -> Self {
        Self { source, keydir, block_size }
    }

    /// Execute the compaction.
    ///
    /// The source log is only read. On failure the partial output is removed
    /// and the source stays authoritative.
    pub fn run(&self) -> Result<CompactionResult> {
        let output_path = compact_path(self.source.path());
        remove_stale(self.source.path())?;

        log::info!(
            "Starting compaction of {:?}: {} live keys, {} bytes",
            self.source.path(),
            self.keydir.len(),
            self.source.len()
        );

        match self.write_live(&output_path) {
            Ok((keydir, bytes_after)) => {
                let stats = CompactionStats {
                    live_records: keydir.len(),
                    bytes_before: self.source.len(),
                    bytes_after,
                };
                Ok(CompactionResult { keydir, stats, output_path })
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&output_path) {
                    log::warn!("Failed to remove partial compaction output: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    fn write_live(&self, output_path: &Path) -> Result<(KeyDir, u64)> {
        // Durability is settled by the single sync below, not per frame.
        let mut output = LogSegment::open(output_path, Durability::Deferred)?;
        let mut keydir = KeyDir::new();

        for frame in self.source.scan(self.block_size)? {
            let frame = frame?;
            if frame.is_tombstone() {
                continue;
            }

            let (key, _) = record::split_entry(&frame.payload)?;
            if !self.keydir.is_current(key, frame.offset) {
                continue;
            }

            let offset = output.append_frame(frame.flags, &frame.payload)?;
            let size = frame.payload.len() as u32;
            keydir.upsert(key, KeyEntry { offset, size });
        }

        let bytes_after = output.len();
        output.close()?;
        Ok((keydir, bytes_after))
    }
}

/// Atomically replace `log_path` with the compaction output.
///
/// Handles open on the old log keep reading the old file; callers must reopen.
pub fn install(output_path: &Path, log_path: &Path) -> Result<()> {
    std::fs::rename(output_path, log_path)?;

    // Persist the rename itself. Not every platform can open a directory.
    if let Some(dir) = log_path.parent() {
        match File::open(dir).and_then(|d| d.sync_all()) {
            Ok(()) => {}
            Err(e) => log::debug!("Directory sync after compaction skipped: {}", e),
        }
    }
    Ok(())
}
