//! Forward scan over a log file.

use super::frame::{Frame, FrameHeader, HEADER_SIZE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Block-buffered forward iterator over the frames of a log file.
///
/// The file is read in fixed-size blocks independent of frame sizes. A frame
/// whose header or payload straddles a block boundary is reassembled from as
/// many subsequent blocks as needed before it is yielded.
///
/// The scan ends cleanly on:
/// - end of file at a frame boundary
/// - a header shorter than `HEADER_SIZE` (a write that never completed)
/// - a payload shorter than its header declares
/// - a zero-length frame followed by nothing but zero bytes
///
/// The last three mark a truncated tail; [`valid_len`](Self::valid_len) then
/// reports where the last complete frame ended. A zero-length frame with any
/// non-zero byte after it is not a tail and fails with `CorruptRecord`.
pub struct FrameScanner {
    /// Independent read handle
    file: File,
    /// Read block
    block: Vec<u8>,
    /// Next unread byte in `block`
    pos: usize,
    /// Number of valid bytes in `block`
    filled: usize,
    /// Offset of the next frame header
    offset: u64,
    /// Set once the scan has ended
    finished: bool,
    /// Set if the scan ended on an incomplete frame
    truncated_tail: bool,
}

impl FrameScanner {
    /// Open a scanner at the start of the file
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::invalid_argument("scan block size must be > 0"));
        }

        let file = File::open(path)?;
        Ok(Self {
            file,
            block: vec![0u8; block_size],
            pos: 0,
            filled: 0,
            offset: 0,
            finished: false,
            truncated_tail: false,
        })
    }

    /// End offset of the last complete frame yielded so far
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    /// Whether the scan stopped on an incomplete trailing frame
    pub fn hit_truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Refill the block from the file. Returns false at end of file.
    fn refill(&mut self) -> io::Result<bool> {
        loop {
            match self.file.read(&mut self.block) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pos = 0;
                    self.filled = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Copy up to `n` bytes into `out`, crossing block boundaries as needed.
    /// Returns the number of bytes copied; fewer than `n` means end of file.
    fn read_buffered(&mut self, out: &mut Vec<u8>, n: usize) -> io::Result<usize> {
        let mut copied = 0;

        while copied < n {
            if self.pos == self.filled && !self.refill()? {
                break;
            }

            let take = (n - copied).min(self.filled - self.pos);
            out.extend_from_slice(&self.block[self.pos..self.pos + take]);
            self.pos += take;
            copied += take;
        }

        Ok(copied)
    }

    /// Consume the rest of the file; true if every remaining byte is zero.
    fn rest_is_zero(&mut self) -> io::Result<bool> {
        loop {
            if self.pos == self.filled && !self.refill()? {
                return Ok(true);
            }
            if self.block[self.pos..self.filled].iter().any(|&b| b != 0) {
                return Ok(false);
            }
            self.pos = self.filled;
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        let got = self.read_buffered(&mut header, HEADER_SIZE)?;

        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            log::debug!("Partial frame header ({} bytes) at offset {}", got, self.offset);
            self.truncated_tail = true;
            return Ok(None);
        }

        let header = FrameHeader::decode(&header)?;
        if header.size == 0 {
            // Only a zero-filled region left by a crash may end here.
            if !self.rest_is_zero()? {
                return Err(Error::corruption(format!(
                    "Zero-length frame at offset {} is followed by more data",
                    self.offset
                )));
            }
            log::debug!("Zero-length frame at offset {}, ending scan", self.offset);
            self.truncated_tail = true;
            return Ok(None);
        }

        let size = header.size as usize;
        // Cap the up-front allocation; a bogus length must not reserve gigabytes.
        let mut payload = Vec::with_capacity(size.min(self.block.len()));
        let got = self.read_buffered(&mut payload, size)?;

        if got < size {
            log::debug!(
                "Partial frame payload at offset {}: expected {} bytes, got {}",
                self.offset,
                size,
                got
            );
            self.truncated_tail = true;
            return Ok(None);
        }

        let frame = Frame { offset: self.offset, flags: header.flags, payload };
        self.offset += frame.encoded_size();
        Ok(Some(frame))
    }
}

impl Iterator for FrameScanner {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
