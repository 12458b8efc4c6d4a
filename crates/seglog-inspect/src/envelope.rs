//! Versioned entry framing.
//!
//! One stored entry holds one or more logical records. Decoding dispatches on
//! the [`EnvelopeVersion`] recorded in the segment metadata:
//!
//! - `V0`: records back-to-back, each
//!   `flags: u32 | tx_id: i64 | len: u32 | payload[len]` (little-endian).
//! - `V1`: a 14-byte header `version: u8 | codec_flags: u8 | body_len: u32 |
//!   body_xxh3: u64` followed by a `V0` body.
//!
//! Compression is not supported: any nonzero codec flag is rejected.

use seglog_error::{Result, SeglogError};
use seglog_types::{EnvelopeVersion, LogRecord};
use xxhash_rust::xxh3::xxh3_64;

use crate::backend::EntryCodec;

const RECORD_HEADER_BYTES: usize = 4 + 8 + 4;
const ENVELOPE_HEADER_BYTES: usize = 1 + 1 + 4 + 8;

/// The codec for entries written by this log service.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl EntryCodec for EnvelopeCodec {
    fn decode(&self, raw: &[u8], version: EnvelopeVersion) -> Result<Vec<LogRecord>> {
        decode_entry(raw, version)
    }
}

/// Decode one stored entry.
pub fn decode_entry(raw: &[u8], version: EnvelopeVersion) -> Result<Vec<LogRecord>> {
    match version {
        EnvelopeVersion::V0 => decode_records(raw),
        EnvelopeVersion::V1 => decode_enveloped(raw),
    }
}

/// Encode records as one stored entry.
pub fn encode_entry(records: &[LogRecord], version: EnvelopeVersion) -> Result<Vec<u8>> {
    let body = encode_records(records)?;
    match version {
        EnvelopeVersion::V0 => Ok(body),
        EnvelopeVersion::V1 => {
            let body_len = u32::try_from(body.len()).map_err(|_| {
                SeglogError::decode(format!("envelope body too large: {} bytes", body.len()))
            })?;
            let mut out = Vec::with_capacity(ENVELOPE_HEADER_BYTES + body.len());
            out.push(EnvelopeVersion::V1.as_u8());
            out.push(0);
            out.extend_from_slice(&body_len.to_le_bytes());
            out.extend_from_slice(&xxh3_64(&body).to_le_bytes());
            out.extend_from_slice(&body);
            Ok(out)
        }
    }
}

fn encode_records(records: &[LogRecord]) -> Result<Vec<u8>> {
    let total: usize = records
        .iter()
        .map(|record| RECORD_HEADER_BYTES + record.payload.len())
        .sum();
    let mut out = Vec::with_capacity(total);
    for record in records {
        let len = u32::try_from(record.payload.len()).map_err(|_| {
            SeglogError::decode(format!(
                "record payload too large: {} bytes",
                record.payload.len()
            ))
        })?;
        out.extend_from_slice(&record.flags.to_le_bytes());
        out.extend_from_slice(&record.tx_id.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&record.payload);
    }
    Ok(out)
}

fn decode_enveloped(raw: &[u8]) -> Result<Vec<LogRecord>> {
    if raw.len() < ENVELOPE_HEADER_BYTES {
        return Err(SeglogError::decode(format!(
            "envelope too short: expected at least {ENVELOPE_HEADER_BYTES} bytes, got {}",
            raw.len()
        )));
    }
    let mut cursor = 0usize;
    let [version] = read_array::<1>(raw, &mut cursor, "version")?;
    if version != EnvelopeVersion::V1.as_u8() {
        return Err(SeglogError::decode(format!(
            "envelope version byte {version} does not match segment envelope v1"
        )));
    }
    let [codec_flags] = read_array::<1>(raw, &mut cursor, "codec_flags")?;
    if codec_flags != 0 {
        return Err(SeglogError::decode(format!(
            "unsupported envelope codec flags {codec_flags:#04x}"
        )));
    }
    let body_len = read_u32_le(raw, &mut cursor, "body_len")?;
    let stored_checksum = read_u64_le(raw, &mut cursor, "body_xxh3")?;
    let body = &raw[cursor..];
    let expected_len = usize::try_from(body_len)
        .map_err(|_| SeglogError::decode("envelope body length does not fit in usize"))?;
    if body.len() != expected_len {
        return Err(SeglogError::decode(format!(
            "envelope body length mismatch: header says {expected_len}, found {}",
            body.len()
        )));
    }
    let computed = xxh3_64(body);
    if computed != stored_checksum {
        return Err(SeglogError::decode(format!(
            "envelope checksum mismatch: stored {stored_checksum:#018x}, computed {computed:#018x}"
        )));
    }
    decode_records(body)
}

fn decode_records(bytes: &[u8]) -> Result<Vec<LogRecord>> {
    let mut cursor = 0usize;
    let mut records = Vec::new();
    while cursor < bytes.len() {
        let flags = read_u32_le(bytes, &mut cursor, "flags")?;
        let tx_id = i64::from_le_bytes(read_array::<8>(bytes, &mut cursor, "tx_id")?);
        let len = read_u32_le(bytes, &mut cursor, "len")?;
        let len = usize::try_from(len)
            .map_err(|_| SeglogError::decode("record length does not fit in usize"))?;
        let end = cursor
            .checked_add(len)
            .ok_or_else(|| SeglogError::decode("record length overflow"))?;
        if end > bytes.len() {
            return Err(SeglogError::decode(format!(
                "record {} payload truncated: need {len} bytes at offset {cursor}, total {}",
                records.len(),
                bytes.len()
            )));
        }
        records.push(LogRecord {
            tx_id,
            flags,
            payload: bytes[cursor..end].to_vec(),
        });
        cursor = end;
    }
    Ok(records)
}

fn read_u32_le(bytes: &[u8], cursor: &mut usize, field: &str) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array::<4>(bytes, cursor, field)?))
}

fn read_u64_le(bytes: &[u8], cursor: &mut usize, field: &str) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array::<8>(bytes, cursor, field)?))
}

fn read_array<const N: usize>(bytes: &[u8], cursor: &mut usize, field: &str) -> Result<[u8; N]> {
    let end = cursor
        .checked_add(N)
        .ok_or_else(|| SeglogError::decode(format!("overflow reading field {field}")))?;
    if end > bytes.len() {
        return Err(SeglogError::decode(format!(
            "field {field} out of bounds: need {N} bytes at offset {}, total {}",
            *cursor,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[*cursor..end]);
    *cursor = end;
    Ok(out)
}
