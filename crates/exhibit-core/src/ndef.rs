//! NDEF URI record encoding.
//!
//! The proximity-tap channel serves an NFC Forum NDEF message holding one
//! well-known `U` record. The URL is carried verbatim with identifier code
//! `0x00`, so no protocol prefix is abbreviated.
//!
//! ```text
//! +--------+----------+-------------+------+------+-----------------+
//! | header | type len | payload len | 'U'  | 0x00 | URL bytes ...   |
//! +--------+----------+-------------+------+------+-----------------+
//!   MB|ME|SR|TNF=1      1 or 4 bytes
//! ```

use thiserror::Error;

use crate::store::{EncodedTagPayload, MESSAGE_CAPACITY};

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;
const TNF_WELL_KNOWN: u8 = 0x01;
const URI_RECORD_TYPE: u8 = b'U';

/// URI identifier code meaning "no prefix".
pub const URI_IDENTIFIER_NONE: u8 = 0x00;

/// Prefixes for the identifier codes a scanner is most likely to see.
const URI_PREFIXES: [&str; 5] = ["", "http://www.", "https://www.", "http://", "https://"];

/// Failure to build a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The encoded message does not fit the message buffer.
    #[error("Encoded URI record needs {required} bytes but the message buffer holds {capacity}")]
    CapacityExceeded {
        /// Bytes the record would occupy.
        required: usize,
        /// Bytes available.
        capacity: usize,
    },
}

/// Failure to read back a served message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The message ends before the record does.
    #[error("NDEF message is truncated")]
    Truncated,

    /// The first record is not a well-known `U` record.
    #[error("NDEF record is not a URI record")]
    NotUriRecord,

    /// The identifier code has no known prefix.
    #[error("Unsupported URI identifier code 0x{0:02x}")]
    UnsupportedIdentifier(u8),

    /// The URL is not UTF-8.
    #[error("URI is not valid UTF-8")]
    InvalidUtf8,
}

/// Size of the encoded message for a URL of `url_len` bytes.
#[must_use]
pub const fn encoded_len(url_len: usize) -> usize {
    let payload_len = url_len + 1;
    let length_field = if payload_len <= u8::MAX as usize { 1 } else { 4 };
    // header + type length + payload length + type + payload
    1 + 1 + length_field + 1 + payload_len
}

/// Encodes `url` as a single-record NDEF message.
///
/// Deterministic: the same input always gives the same bytes.
///
/// # Errors
///
/// Returns [`EncodeError::CapacityExceeded`] when the message would not fit
/// in [`MESSAGE_CAPACITY`] bytes.
pub fn encode_uri_message(url: &[u8]) -> Result<EncodedTagPayload, EncodeError> {
    let required = encoded_len(url.len());
    if required > MESSAGE_CAPACITY {
        return Err(EncodeError::CapacityExceeded {
            required,
            capacity: MESSAGE_CAPACITY,
        });
    }

    let payload_len = url.len() + 1;
    let mut out = EncodedTagPayload::empty();
    let buf = &mut out.bytes;
    let mut at = 0;

    if let Ok(short_len) = u8::try_from(payload_len) {
        buf[at] = FLAG_MB | FLAG_ME | FLAG_SR | TNF_WELL_KNOWN;
        buf[at + 1] = 1;
        buf[at + 2] = short_len;
        at += 3;
    } else {
        let long_len = u32::try_from(payload_len).unwrap_or(u32::MAX);
        buf[at] = FLAG_MB | FLAG_ME | TNF_WELL_KNOWN;
        buf[at + 1] = 1;
        buf[at + 2..at + 6].copy_from_slice(&long_len.to_be_bytes());
        at += 6;
    }

    buf[at] = URI_RECORD_TYPE;
    buf[at + 1] = URI_IDENTIFIER_NONE;
    at += 2;
    buf[at..at + url.len()].copy_from_slice(url);
    out.len = at + url.len();
    Ok(out)
}

/// Reads the URL out of a message built by [`encode_uri_message`] or by any
/// writer that uses one of the common identifier codes.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the message is not a well-formed URI record.
pub fn parse_uri_message(message: &[u8]) -> Result<String, DecodeError> {
    let (&header, rest) = message.split_first().ok_or(DecodeError::Truncated)?;
    if header & TNF_MASK != TNF_WELL_KNOWN {
        return Err(DecodeError::NotUriRecord);
    }
    let (&type_len, rest) = rest.split_first().ok_or(DecodeError::Truncated)?;

    let (payload_len, rest) = if header & FLAG_SR != 0 {
        let (&len, rest) = rest.split_first().ok_or(DecodeError::Truncated)?;
        (usize::from(len), rest)
    } else {
        if rest.len() < 4 {
            return Err(DecodeError::Truncated);
        }
        let (len, rest) = rest.split_at(4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]);
        (usize::try_from(len).map_err(|_| DecodeError::Truncated)?, rest)
    };

    // The record id, when present, sits between the type and the payload.
    let (id_len, rest) = if header & FLAG_IL != 0 {
        let (&id_len, rest) = rest.split_first().ok_or(DecodeError::Truncated)?;
        (usize::from(id_len), rest)
    } else {
        (0, rest)
    };
    parse_uri_payload(rest, usize::from(type_len), id_len, payload_len)
}

fn parse_uri_payload(
    rest: &[u8],
    type_len: usize,
    id_len: usize,
    payload_len: usize,
) -> Result<String, DecodeError> {
    if rest.len() < type_len + id_len + payload_len {
        return Err(DecodeError::Truncated);
    }
    if type_len != 1 || rest[0] != URI_RECORD_TYPE {
        return Err(DecodeError::NotUriRecord);
    }
    let payload = &rest[type_len + id_len..type_len + id_len + payload_len];
    let (&code, uri) = payload.split_first().ok_or(DecodeError::Truncated)?;
    let prefix = URI_PREFIXES
        .get(usize::from(code))
        .ok_or(DecodeError::UnsupportedIdentifier(code))?;
    let uri = std::str::from_utf8(uri).map_err(|_| DecodeError::InvalidUtf8)?;
    Ok(format!("{prefix}{uri}"))
}
