//! Self-describing row encoding.
//!
//! The tuple is serialized with bincode as a length-prefixed sequence of
//! tagged [`Value`]s, so it decodes without consulting the schema.

use crate::error::{Error, Result};
use crate::schema::Value;
use bincode::Options;
use bytes::{BufMut, BytesMut};

fn options() -> impl Options {
    bincode::DefaultOptions::new().reject_trailing_bytes()
}

/// Appends the encoding of `values` to `buf`.
pub fn encode_into(values: &[Value], buf: &mut BytesMut) -> Result<()> {
    options()
        .serialize_into(buf.writer(), values)
        .map_err(|e| Error::schema_mismatch(format!("cannot serialize row: {}", e)))
}

/// Decodes a tuple of values.
pub fn decode(data: &[u8]) -> Result<Vec<Value>> {
    options()
        .with_limit(data.len() as u64)
        .deserialize(data)
        .map_err(|e| Error::corruption(format!("self-describing row: {}", e)))
}
