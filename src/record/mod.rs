//! Record codec: rows to bytes and back.
//!
//! Two wire formats are supported and selected per collection through
//! [`Options::record_format`](crate::Options):
//!
//! - [`RecordFormat::Fixed`]: schema-typed, fixed-width big-endian fields
//!   with a presence byte for nullable columns. Compact, but undecodable
//!   without the schema.
//! - [`RecordFormat::SelfDescribing`]: each value carries its own tag, so the
//!   tuple can be rebuilt without the schema. Larger per record.
//!
//! ## Entry payload
//!
//! Every frame written to the log carries an *entry*, which prefixes the row
//! bytes with the key so recovery can rebuild the KeyDir from the log alone:
//!
//! ```text
//! ┌──────────────┬───────────┬─────────────────────────────┐
//! │ key_len (2B) │ key bytes │ row bytes (empty: tombstone) │
//! └──────────────┴───────────┴─────────────────────────────┘
//! ```

pub mod fixed;
pub mod tagged;

use crate::error::{Error, Result};
use crate::schema::{Row, Schema};
use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Size of the key length prefix in an entry payload.
pub const KEY_LEN_SIZE: usize = 2;

/// Wire format for row payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// Schema-typed fixed-width encoding.
    #[default]
    Fixed,
    /// Tagged, schema-independent encoding.
    SelfDescribing,
}

impl RecordFormat {
    /// Encodes a row that was built against `schema`.
    pub fn encode(&self, row: &Row, schema: &Schema) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode_into(row, schema, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decodes row bytes and type-checks the result against `schema`.
    pub fn decode(&self, data: &[u8], schema: &Arc<Schema>) -> Result<Row> {
        let values = match self {
            RecordFormat::Fixed => fixed::decode(schema, data)?,
            RecordFormat::SelfDescribing => tagged::decode(data)?,
        };

        // A self-describing payload may decode fine yet not fit the schema.
        Row::new(Arc::clone(schema), values).map_err(|e| match e {
            Error::SchemaMismatch(msg) => Error::corruption(format!("decoded row: {}", msg)),
            other => other,
        })
    }

    fn encode_into(&self, row: &Row, schema: &Schema, buf: &mut BytesMut) -> Result<()> {
        if !std::ptr::eq(row.schema().as_ref(), schema) && row.schema().as_ref() != schema {
            return Err(Error::schema_mismatch("row was built against a different schema"));
        }

        match self {
            RecordFormat::Fixed => fixed::encode_into(schema, row.values(), buf),
            RecordFormat::SelfDescribing => tagged::encode_into(row.values(), buf),
        }
    }
}

/// Encodes a live entry: key followed by the row in `format`.
pub fn encode_entry(format: RecordFormat, key: &[u8], row: &Row, schema: &Schema) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(KEY_LEN_SIZE + key.len() + 16 * row.len());
    put_key(key, &mut buf)?;
    format.encode_into(row, schema, &mut buf)?;
    Ok(buf.to_vec())
}

/// Encodes a tombstone entry: the key alone.
pub fn encode_tombstone(key: &[u8]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(KEY_LEN_SIZE + key.len());
    put_key(key, &mut buf)?;
    Ok(buf.to_vec())
}

/// Splits an entry payload into `(key, row bytes)`.
pub fn split_entry(payload: &[u8]) -> Result<(&[u8], &[u8])> {
    if payload.len() < KEY_LEN_SIZE {
        return Err(Error::corruption(format!(
            "entry too short: {} bytes",
            payload.len()
        )));
    }

    let mut header = &payload[..KEY_LEN_SIZE];
    let key_len = header.get_u16() as usize;
    let rest = &payload[KEY_LEN_SIZE..];

    if rest.len() < key_len {
        return Err(Error::corruption(format!(
            "entry key truncated: expected {} bytes, got {}",
            key_len,
            rest.len()
        )));
    }

    Ok(rest.split_at(key_len))
}

fn put_key(key: &[u8], buf: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(key.len()).map_err(|_| {
        Error::invalid_argument(format!("key is {} bytes, max is {}", key.len(), MAX_KEY_LEN))
    })?;
    buf.put_u16(len);
    buf.put_slice(key);
    Ok(())
}
