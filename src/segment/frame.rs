//! On-disk frame format.
//!
//! Each frame consists of:
//! - Flags (1 byte): bit 0 marks a tombstone, other bits reserved (zero on write)
//! - Length (4 bytes): payload length, big-endian
//! - Payload (variable): an entry produced by the record codec

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Size of the frame header (flags + length)
pub const HEADER_SIZE: usize = 5;

/// Flag bit marking a deleted key
pub const FLAG_DELETED: u8 = 0x01;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Flag bits
    pub flags: u8,
    /// Payload length in bytes
    pub size: u32,
}

impl FrameHeader {
    /// Create a new header
    pub fn new(flags: u8, size: u32) -> Self {
        Self { flags, size }
    }

    /// Whether the deleted bit is set
    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    /// Write the header into `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags);
        buf.put_u32(self.size);
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `data`
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::corruption(format!("Frame header too short: {} bytes", data.len())));
        }

        let flags = data.get_u8();
        let size = data.get_u32();
        Ok(Self { flags, size })
    }
}

/// A frame read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Byte offset of the frame header in the log
    pub offset: u64,
    /// Flag bits
    pub flags: u8,
    /// Payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Whether this frame is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_DELETED != 0
    }

    /// Total on-disk size of the frame (header + payload)
    pub fn encoded_size(&self) -> u64 {
        (HEADER_SIZE + self.payload.len()) as u64
    }
}

/// Encode a complete frame (header + payload)
pub fn encode_frame(flags: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(payload.len()).map_err(|_| {
        Error::invalid_argument(format!("Payload of {} bytes exceeds frame limit", payload.len()))
    })?;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    FrameHeader::new(flags, size).encode_into(&mut buf);
    buf.put_slice(payload);
    Ok(buf.to_vec())
}
