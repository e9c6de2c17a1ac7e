//! Length-prefixed wire primitives
//!
//! Every variable-length field on the wire is framed as a u32 big-endian
//! length followed by the raw bytes. Reads are bounds-checked; truncated or
//! oversized input fails with `MalformedEnvelope`.

use crate::{Error, PeerId, Result};

/// Append a length-prefixed byte field
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Read a length-prefixed byte field, advancing the input slice
pub fn read_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    if input.len() < 4 {
        return Err(Error::MalformedEnvelope(
            "truncated length prefix".to_string(),
        ));
    }
    let (len_bytes, rest) = input.split_at(4);
    let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if rest.len() < len {
        return Err(Error::MalformedEnvelope(format!(
            "field length {} exceeds remaining {} bytes",
            len,
            rest.len()
        )));
    }
    let (data, rest) = rest.split_at(len);
    *input = rest;
    Ok(data.to_vec())
}

/// Read a single byte, advancing the input slice
pub fn read_byte(input: &mut &[u8]) -> Result<u8> {
    match input.split_first() {
        Some((byte, rest)) => {
            *input = rest;
            Ok(*byte)
        }
        None => Err(Error::MalformedEnvelope("empty input".to_string())),
    }
}

/// Append a length-prefixed UTF-8 string field
pub fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

/// Read a length-prefixed UTF-8 string field
pub fn read_str(input: &mut &[u8]) -> Result<String> {
    let bytes = read_bytes(input)?;
    String::from_utf8(bytes)
        .map_err(|_| Error::MalformedEnvelope("invalid UTF-8 in string field".to_string()))
}

/// Append a peer-id set: u32 count followed by length-prefixed ids
pub fn write_id_set(out: &mut Vec<u8>, ids: &[PeerId]) {
    out.extend_from_slice(&(ids.len() as u32).to_be_bytes());
    for id in ids {
        write_str(out, id.as_str());
    }
}

/// Read a peer-id set, preserving order
pub fn read_id_set(input: &mut &[u8]) -> Result<Vec<PeerId>> {
    if input.len() < 4 {
        return Err(Error::MalformedEnvelope(
            "truncated id-set count".to_string(),
        ));
    }
    let (count_bytes, rest) = input.split_at(4);
    let count =
        u32::from_be_bytes([count_bytes[0], count_bytes[1], count_bytes[2], count_bytes[3]]);
    *input = rest;

    // each entry needs at least its own length prefix
    if count as usize > input.len() / 4 + 1 {
        return Err(Error::MalformedEnvelope(format!(
            "id-set count {} exceeds remaining input",
            count
        )));
    }

    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ids.push(PeerId::new(read_str(input)?));
    }
    Ok(ids)
}
