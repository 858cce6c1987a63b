//! Append-only log segment.
//!
//! The log is the single source of truth for a collection: every `set` and
//! `delete` is appended here as a frame, and the in-memory KeyDir is rebuilt
//! from it on open.
//!
//! ## File Format
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Frame 1                                     │
//! │ ┌───────────┬──────────────┬──────────────┐ │
//! │ │ Flags (1) │ Length (4BE) │ Payload      │ │
//! │ └───────────┴──────────────┴──────────────┘ │
//! ├─────────────────────────────────────────────┤
//! │ Frame 2                                     │
//! │ ...                                         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hadrodb::segment::LogSegment;
//! use hadrodb::Durability;
//!
//! # fn main() -> Result<(), hadrodb::Error> {
//! let mut log = LogSegment::open("00000000.data", Durability::Aggressive)?;
//! let offset = log.append_frame(0, b"payload")?;
//!
//! for frame in log.scan(8 * 1024 * 1024)? {
//!     let frame = frame?;
//!     println!("frame at {}: {} bytes", frame.offset, frame.payload.len());
//! }
//! # let _ = offset;
//! # Ok(())
//! # }
//! ```

pub mod frame;
pub mod scanner;

pub use frame::{Frame, FrameHeader, FLAG_DELETED, HEADER_SIZE};
pub use scanner::FrameScanner;

use crate::config::Durability;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File name of the log inside a collection directory
pub const LOG_FILE_NAME: &str = "00000000.data";

/// Suffix of the side file that receives bytes cut from the end of the log
pub const TORN_SUFFIX: &str = ".torn";

/// Path of the log file for a collection directory
pub fn log_path<P: AsRef<Path>>(dir: P) -> PathBuf {
    dir.as_ref().join(LOG_FILE_NAME)
}

/// Path of the side file for bytes cut from `log_path` on repair
pub fn torn_path(log_path: &Path) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(TORN_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Append-only log file with random-access reads and forward scans.
pub struct LogSegment {
    /// Path to the log file
    path: PathBuf,
    /// Handle opened in append mode; all writes go through it
    file: File,
    /// Separate handle for positional reads; shared by concurrent readers
    reader: File,
    /// Logical end of the log (next append offset)
    len: u64,
    /// Whether appends are fsync'd
    durability: Durability,
    /// Set when a failed append could not be rolled back. The file may then
    /// be longer than `len`, so further appends are refused.
    poisoned: bool,
}

impl LogSegment {
    /// Open or create a log file in append + read mode.
    pub fn open<P: AsRef<Path>>(path: P, durability: Durability) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        let reader = File::open(&path)?;

        Ok(Self { path, file, reader, len, durability, poisoned: false })
    }

    /// Append raw bytes at the end of the log.
    ///
    /// Returns the offset at which the write began. The bytes are handed to the
    /// OS before returning; under [`Durability::Aggressive`] they are also
    /// fsync'd. On failure the file is cut back to its previous length and the
    /// logical end is unchanged. If that cut fails as well, the segment is
    /// poisoned and every later append fails with `Io` until a successful
    /// [`truncate`](Self::truncate).
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Io(io::Error::other(format!(
                "log {:?} has unrecovered bytes from a failed append",
                self.path
            ))));
        }

        let offset = self.len;

        let result = self.file.write_all(data).and_then(|_| match self.durability {
            Durability::Aggressive => self.file.sync_data(),
            Durability::Deferred => Ok(()),
        });

        if let Err(e) = result {
            self.rollback(offset);
            return Err(Error::Io(e));
        }

        self.len += data.len() as u64;
        Ok(offset)
    }

    /// Encode and append a frame; returns the offset of its header.
    pub fn append_frame(&mut self, flags: u8, payload: &[u8]) -> Result<u64> {
        let encoded = frame::encode_frame(flags, payload)?;
        self.append(&encoded)
    }

    fn rollback(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            log::error!("Failed to roll back partial append in {:?}: {}", self.path, e);
            self.poisoned = true;
        }
    }

    /// Whether a failed rollback has stopped further appends
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Read exactly `size` bytes starting at `offset`.
    ///
    /// Fails with `ShortRead` if the log holds fewer bytes than requested.
    pub fn read_at(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let expected = size as u64;
        let available = self.len.saturating_sub(offset);
        if expected > available {
            return Err(Error::ShortRead { offset, expected, available });
        }

        let mut buf = vec![0u8; size];
        match read_exact_at(&self.reader, &mut buf, offset) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // The file shrank underneath us.
                let file_len = self.reader.metadata()?.len();
                Err(Error::ShortRead { offset, expected, available: file_len.saturating_sub(offset) })
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Read the frame whose header starts at `offset` and whose payload is
    /// `payload_size` bytes long.
    pub fn read_frame(&self, offset: u64, payload_size: u32) -> Result<Frame> {
        let mut data = self.read_at(offset, HEADER_SIZE + payload_size as usize)?;
        let header = FrameHeader::decode(&data)?;

        if header.size != payload_size {
            return Err(Error::corruption(format!(
                "Frame at offset {} declares {} bytes, expected {}",
                offset, header.size, payload_size
            )));
        }

        let payload = data.split_off(HEADER_SIZE);
        Ok(Frame { offset, flags: header.flags, payload })
    }

    /// Start a new forward scan from offset 0.
    ///
    /// Each call opens its own read handle, so scans are independent of each
    /// other and of the appender.
    pub fn scan(&self, block_size: usize) -> Result<FrameScanner> {
        FrameScanner::open(&self.path, block_size)
    }

    /// Force all appended data to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Cut the log to `len` bytes and persist the new length.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        self.poisoned = false;
        Ok(())
    }

    /// Move every byte past `len` into `side_path`, then cut the log to `len`.
    ///
    /// The bytes are appended to `side_path`, so tails moved by earlier calls
    /// are kept, and synced before the log shrinks. Returns how many bytes
    /// were moved.
    pub fn split_off_tail(&mut self, len: u64, side_path: &Path) -> Result<u64> {
        if len >= self.len {
            return Ok(0);
        }

        let mut source = File::open(&self.path)?;
        source.seek(SeekFrom::Start(len))?;
        let mut side = OpenOptions::new().create(true).append(true).open(side_path)?;
        let moved = io::copy(&mut source.take(self.len - len), &mut side)?;
        side.sync_all()?;

        if moved != self.len - len {
            return Err(Error::ShortRead { offset: len, expected: self.len - len, available: moved });
        }

        self.truncate(len)?;
        Ok(moved)
    }

    /// Current logical length of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the log holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability mode of this segment
    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Sync and release the file handles.
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}
