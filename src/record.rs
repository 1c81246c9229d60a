//! Streaming decoder for the tag/length/value record format.
//!
//! Records are a sequence of fields, each introduced by a varint key
//! `(tag << 3) | wire_type`. Tag 1 carries a length-prefixed UTF-8 name;
//! every other tag is skipped by its declared encoded length, so richer
//! records decode without error. Decoding operates over any [`Buf`] and
//! never assumes the bytes live in one contiguous region — a record
//! straddling two transport reads decodes from a segmented view exactly
//! as it would from a flat slice.
//!
//! Decoding here is advisory: callers log failures and keep relaying.

use bytes::Buf;

/// Wire type for varint-encoded values.
const WIRE_VARINT: u8 = 0;
/// Wire type for 8-byte fixed-width values.
const WIRE_FIXED64: u8 = 1;
/// Wire type for length-prefixed values.
const WIRE_LEN: u8 = 2;
/// Wire type for 4-byte fixed-width values.
const WIRE_FIXED32: u8 = 5;

/// Field tag carrying the record name.
const TAG_NAME: u64 = 1;

/// A decoded record.
///
/// Only the name field is materialized; unrecognized fields are consumed
/// and dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Record {
    /// Value of the tag-1 name field, when present.
    pub name: Option<String>,
}

/// Errors produced by [`decode_record`].
#[derive(Debug, PartialEq, Eq)]
pub enum RecordError {
    /// The buffer ended inside a field header or value.
    Truncated,
    /// A varint ran past its maximum encoded width.
    VarintOverflow,
    /// A declared field length does not fit in memory.
    LengthOverflow(u64),
    /// A field used a wire type this decoder cannot skip.
    UnsupportedWireType(u8),
    /// The name field held invalid UTF-8.
    InvalidUtf8,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => f.write_str("record data truncated"),
            Self::VarintOverflow => f.write_str("varint exceeds maximum width"),
            Self::LengthOverflow(len) => write!(f, "field length {len} too large"),
            Self::UnsupportedWireType(wire) => write!(f, "unsupported wire type {wire}"),
            Self::InvalidUtf8 => f.write_str("name field is not valid UTF-8"),
        }
    }
}

impl std::error::Error for RecordError {}

/// Decode one record from `buf`, consuming fields until the buffer is
/// exhausted or a zero key marks the end.
///
/// # Errors
///
/// Returns a [`RecordError`] for malformed keys, lengths, truncated
/// values, or an invalid UTF-8 name. Skipping an unknown field consumes
/// exactly its declared length, keeping the decoder synchronized for the
/// next field.
pub fn decode_record<B: Buf>(mut buf: B) -> Result<Record, RecordError> {
    let mut record = Record::default();
    while buf.has_remaining() {
        let key = read_varint(&mut buf)?;
        if key == 0 {
            break;
        }
        let tag = key >> 3;
        let wire = u8::try_from(key & 0x7).expect("masked to three bits");
        match (tag, wire) {
            (TAG_NAME, WIRE_LEN) => {
                let len = read_length(&mut buf)?;
                if buf.remaining() < len {
                    return Err(RecordError::Truncated);
                }
                let raw = buf.copy_to_bytes(len);
                let name =
                    String::from_utf8(raw.to_vec()).map_err(|_| RecordError::InvalidUtf8)?;
                record.name = Some(name);
            }
            (_, WIRE_VARINT) => {
                let _ = read_varint(&mut buf)?;
            }
            (_, WIRE_FIXED64) => skip(&mut buf, 8)?,
            (_, WIRE_LEN) => {
                let len = read_length(&mut buf)?;
                skip(&mut buf, len)?;
            }
            (_, WIRE_FIXED32) => skip(&mut buf, 4)?,
            (_, wire) => return Err(RecordError::UnsupportedWireType(wire)),
        }
    }
    Ok(record)
}

fn read_varint<B: Buf>(buf: &mut B) -> Result<u64, RecordError> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return Err(RecordError::Truncated);
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(RecordError::VarintOverflow)
}

fn read_length<B: Buf>(buf: &mut B) -> Result<usize, RecordError> {
    let len = read_varint(buf)?;
    usize::try_from(len).map_err(|_| RecordError::LengthOverflow(len))
}

fn skip<B: Buf>(buf: &mut B, len: usize) -> Result<(), RecordError> {
    if buf.remaining() < len {
        return Err(RecordError::Truncated);
    }
    buf.advance(len);
    Ok(())
}
