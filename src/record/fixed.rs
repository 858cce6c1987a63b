//! Fixed-width, schema-typed row encoding.
//!
//! Fields are written in schema order:
//! - nullable fields start with a presence byte (`0` absent, `1` present);
//!   an absent field writes nothing else
//! - `BOOLEAN`: 1 byte
//! - `INTEGER`, `FLOAT`: 8 bytes, big-endian
//! - `VARCHAR`: 2-byte big-endian length, then the UTF-8 bytes

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema, Value};
use bytes::{Buf, BufMut, BytesMut};

/// Appends the encoding of `values` to `buf`.
pub fn encode_into(schema: &Schema, values: &[Value], buf: &mut BytesMut) -> Result<()> {
    if values.len() != schema.len() {
        return Err(Error::schema_mismatch(format!(
            "expected {} values, got {}",
            schema.len(),
            values.len()
        )));
    }

    for (field, value) in schema.fields().iter().zip(values) {
        if field.nullable {
            if value.is_null() {
                buf.put_u8(0);
                continue;
            }
            buf.put_u8(1);
        }

        match (field.data_type, value) {
            (DataType::Boolean, Value::Boolean(b)) => buf.put_u8(u8::from(*b)),
            (DataType::Integer, Value::Integer(i)) => buf.put_i64(*i),
            (DataType::Float, Value::Float(f)) => buf.put_f64(*f),
            (DataType::Varchar, Value::Varchar(s)) => {
                let len = u16::try_from(s.len()).map_err(|_| {
                    Error::schema_mismatch(format!(
                        "field '{}' is {} bytes, max is {}",
                        field.name,
                        s.len(),
                        u16::MAX
                    ))
                })?;
                buf.put_u16(len);
                buf.put_slice(s.as_bytes());
            }
            (_, Value::Null) => {
                return Err(Error::schema_mismatch(format!(
                    "field '{}' is not nullable",
                    field.name
                )));
            }
            (expected, _) => {
                return Err(Error::schema_mismatch(format!(
                    "field '{}' expects {}",
                    field.name, expected
                )));
            }
        }
    }

    Ok(())
}

/// Decodes a tuple, consuming fields strictly in schema order.
pub fn decode(schema: &Schema, mut data: &[u8]) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(schema.len());

    for field in schema.fields() {
        if field.nullable {
            match take_u8(&mut data, field)? {
                0 => {
                    values.push(Value::Null);
                    continue;
                }
                1 => {}
                other => {
                    return Err(Error::corruption(format!(
                        "field '{}': invalid presence byte {}",
                        field.name, other
                    )));
                }
            }
        }

        let value = match field.data_type {
            DataType::Boolean => match take_u8(&mut data, field)? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(Error::corruption(format!(
                        "field '{}': invalid boolean byte {}",
                        field.name, other
                    )));
                }
            },
            DataType::Integer => {
                ensure(data, 8, field)?;
                Value::Integer(data.get_i64())
            }
            DataType::Float => {
                ensure(data, 8, field)?;
                Value::Float(data.get_f64())
            }
            DataType::Varchar => {
                ensure(data, 2, field)?;
                let len = data.get_u16() as usize;
                ensure(data, len, field)?;
                let s = std::str::from_utf8(&data[..len]).map_err(|e| {
                    Error::corruption(format!("field '{}': invalid UTF-8: {}", field.name, e))
                })?;
                let value = Value::Varchar(s.to_string());
                data.advance(len);
                value
            }
        };
        values.push(value);
    }

    if !data.is_empty() {
        return Err(Error::corruption(format!(
            "{} trailing bytes after last field",
            data.len()
        )));
    }

    Ok(values)
}

fn ensure(data: &[u8], needed: usize, field: &Field) -> Result<()> {
    if data.remaining() < needed {
        return Err(Error::corruption(format!(
            "field '{}': need {} bytes, {} left",
            field.name,
            needed,
            data.remaining()
        )));
    }
    Ok(())
}

fn take_u8(data: &mut &[u8], field: &Field) -> Result<u8> {
    ensure(data, 1, field)?;
    Ok(data.get_u8())
}
