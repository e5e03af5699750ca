//! Binary encoding of messages.
//!
//! The layout is fixed and deterministic:
//!
//! ```text
//! u32 field count
//! per field:
//!   u8 tag            0 = float64, 1 = string
//!   float64           8-byte IEEE-754 double
//!   string            u32 byte length, then UTF-8 bytes
//! ```
//!
//! All integers and doubles are little-endian. Decoding needs the expected
//! [Schema] and rejects any layout that does not match it.

use crate::{
    error::{Error, Result},
    registry::Schema,
    types::{FieldType, Message, Value},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const TAG_FLOAT64: u8 = 0;
const TAG_STRING: u8 = 1;

fn tag_of(ty: FieldType) -> u8 {
    match ty {
        FieldType::Float64 => TAG_FLOAT64,
        FieldType::String => TAG_STRING,
    }
}

/// Encodes the fields of `message` in order.
pub fn encode(message: &Message) -> Bytes {
    let size = message
        .fields()
        .iter()
        .map(|value| match value {
            Value::Float64(_) => 1 + 8,
            Value::String(s) => 1 + 4 + s.len(),
        })
        .sum::<usize>()
        + 4;

    let mut buf = BytesMut::with_capacity(size);
    buf.put_u32_le(message.fields().len() as u32);

    for value in message.fields() {
        buf.put_u8(tag_of(value.field_type()));
        match value {
            Value::Float64(v) => buf.put_f64_le(*v),
            Value::String(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }

    buf.freeze()
}

/// Decodes `bytes` as a message of the type described by `schema`.
pub fn decode(mut bytes: &[u8], schema: &Schema) -> Result<Message> {
    let mismatch = |reason: String| Error::schema_mismatch(schema.name(), reason);

    if bytes.remaining() < 4 {
        return Err(mismatch("truncated field count".into()));
    }
    let count = bytes.get_u32_le() as usize;
    if count != schema.fields().len() {
        return Err(mismatch(format!(
            "expected {} fields, found {}",
            schema.fields().len(),
            count
        )));
    }

    let mut fields = Vec::with_capacity(count);
    for field in schema.fields() {
        if !bytes.has_remaining() {
            return Err(mismatch(format!("truncated before field '{}'", field.name)));
        }
        let tag = bytes.get_u8();
        if tag != tag_of(field.ty) {
            return Err(mismatch(format!(
                "field '{}' expected {}, found tag {}",
                field.name, field.ty, tag
            )));
        }

        let value = match field.ty {
            FieldType::Float64 => {
                if bytes.remaining() < 8 {
                    return Err(mismatch(format!("truncated field '{}'", field.name)));
                }
                Value::Float64(bytes.get_f64_le())
            }
            FieldType::String => {
                if bytes.remaining() < 4 {
                    return Err(mismatch(format!("truncated field '{}'", field.name)));
                }
                let len = bytes.get_u32_le() as usize;
                if bytes.remaining() < len {
                    return Err(mismatch(format!("truncated field '{}'", field.name)));
                }
                let text = std::str::from_utf8(&bytes[..len]).map_err(|err| {
                    mismatch(format!("field '{}' is not UTF-8: {err}", field.name))
                })?;
                let value = Value::String(text.to_string());
                bytes.advance(len);
                value
            }
        };
        fields.push(value);
    }

    if bytes.has_remaining() {
        return Err(mismatch(format!("{} trailing bytes", bytes.remaining())));
    }

    Ok(Message::new(schema.name(), fields))
}
