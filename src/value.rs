// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Typed values, the primitive grammar bookmark bodies are built from.
//!
//! A value on the wire is `(length: u32 LE, type: u32 LE, payload)` padded
//! with zeros to the next 4 byte boundary. The type word splits into a
//! kind (high bytes) and a subkind (low byte). Everything is little
//! endian except the date payload, which is a big endian IEEE-754 double.
//!
//! Encoder functions append to a body buffer and return the offset at
//! which the value began, which is the number an array element or TOC
//! entry must hold to reference it. Decoder functions take the full
//! buffer and an absolute offset, validate the kind strictly and return
//! the payload.

use {
    crate::{
        date,
        error::{Error, Result},
    },
    byteorder::{WriteBytesExt, LE},
    chrono::{DateTime, Utc},
    scroll::Pread,
};

pub const TYPE_MASK: u32 = 0xffff_ff00;
pub const SUBTYPE_MASK: u32 = 0x0000_00ff;

pub const KIND_STRING: u32 = 0x0100;
pub const KIND_DATA: u32 = 0x0200;
pub const KIND_NUMBER: u32 = 0x0300;
pub const KIND_DATE: u32 = 0x0400;
pub const KIND_BOOLEAN: u32 = 0x0500;
pub const KIND_ARRAY: u32 = 0x0600;
pub const KIND_URL: u32 = 0x0900;

pub const SUBTYPE_ZERO: u32 = 0x0000;
pub const SUBTYPE_ONE: u32 = 0x0001;

pub const BOOLEAN_FALSE: u32 = 0x0000;
pub const BOOLEAN_TRUE: u32 = 0x0001;

pub const URL_ABSOLUTE: u32 = 0x0001;
pub const URL_RELATIVE: u32 = 0x0002;

/// CFNumber type codes for the widths we emit.
pub const NUMBER_SINT32: u32 = 0x0003;
pub const NUMBER_SINT64: u32 = 0x0004;

/// Writes the `(length, type)` prefix and returns the body offset at
/// which it began.
fn begin_value(buf: &mut Vec<u8>, payload_len: usize, type_word: u32) -> Result<u32> {
    let offset = u32::try_from(buf.len())
        .map_err(|_| Error::EncodingOverflow("body exceeds 4 GiB"))?;
    let length = u32::try_from(payload_len)
        .map_err(|_| Error::EncodingOverflow("value payload exceeds u32"))?;
    buf.write_u32::<LE>(length)?;
    buf.write_u32::<LE>(type_word)?;
    Ok(offset)
}

/// Zero pads to the next 4 byte boundary.
fn pad(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

pub fn emit_string(buf: &mut Vec<u8>, s: &str) -> Result<u32> {
    let offset = begin_value(buf, s.len(), KIND_STRING | SUBTYPE_ONE)?;
    buf.extend_from_slice(s.as_bytes());
    pad(buf);
    Ok(offset)
}

pub fn emit_data(buf: &mut Vec<u8>, data: &[u8]) -> Result<u32> {
    let offset = begin_value(buf, data.len(), KIND_DATA | SUBTYPE_ONE)?;
    buf.extend_from_slice(data);
    pad(buf);
    Ok(offset)
}

/// Booleans carry their value in the subkind and have no payload.
pub fn emit_bool(buf: &mut Vec<u8>, v: bool) -> Result<u32> {
    let subtype = if v { BOOLEAN_TRUE } else { BOOLEAN_FALSE };
    begin_value(buf, 0, KIND_BOOLEAN | subtype)
}

pub fn emit_i32(buf: &mut Vec<u8>, n: i32) -> Result<u32> {
    let offset = begin_value(buf, 4, KIND_NUMBER | NUMBER_SINT32)?;
    buf.write_i32::<LE>(n)?;
    Ok(offset)
}

pub fn emit_i64(buf: &mut Vec<u8>, n: i64) -> Result<u32> {
    let offset = begin_value(buf, 8, KIND_NUMBER | NUMBER_SINT64)?;
    buf.write_i64::<LE>(n)?;
    Ok(offset)
}

/// The payload double is the one big endian primitive inside a typed
/// value.
pub fn emit_date(buf: &mut Vec<u8>, t: DateTime<Utc>) -> Result<u32> {
    let offset = begin_value(buf, 8, KIND_DATE | SUBTYPE_ZERO)?;
    buf.extend_from_slice(&date::darwin_seconds(t).to_be_bytes());
    Ok(offset)
}

pub fn emit_url(buf: &mut Vec<u8>, absolute: bool, url: &str) -> Result<u32> {
    let subtype = if absolute { URL_ABSOLUTE } else { URL_RELATIVE };
    let offset = begin_value(buf, url.len(), KIND_URL | subtype)?;
    buf.extend_from_slice(url.as_bytes());
    pad(buf);
    Ok(offset)
}

/// Array elements are body offsets of values already present in the
/// buffer, so callers must emit the elements first.
pub fn emit_offset_array(buf: &mut Vec<u8>, offsets: &[u32]) -> Result<u32> {
    let offset = begin_value(buf, offsets.len() * 4, KIND_ARRAY | SUBTYPE_ONE)?;
    for o in offsets {
        buf.write_u32::<LE>(*o)?;
    }
    Ok(offset)
}

pub(crate) struct RawValue {
    pub length: u32,
    pub kind: u32,
    pub subkind: u32,
}

fn read_raw(data: &[u8], offset: &mut usize) -> Result<RawValue> {
    let length = data.gread_with::<u32>(offset, scroll::LE)?;
    let type_word = data.gread_with::<u32>(offset, scroll::LE)?;
    Ok(RawValue {
        length,
        kind: type_word & TYPE_MASK,
        subkind: type_word & SUBTYPE_MASK,
    })
}

fn expect_kind(raw: &RawValue, expected: u32) -> Result<()> {
    if raw.kind != expected {
        return Err(Error::UnexpectedKind {
            expected,
            got: raw.kind | raw.subkind,
        });
    }
    Ok(())
}

fn payload_slice(data: &[u8], offset: usize, length: u32) -> Result<&[u8]> {
    let end = offset
        .checked_add(length as usize)
        .ok_or(Error::TruncatedValue)?;
    if end > data.len() {
        return Err(Error::TruncatedValue);
    }
    Ok(&data[offset..end])
}

pub fn decode_string(data: &[u8], mut offset: usize) -> Result<String> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_STRING)?;
    let payload = payload_slice(data, offset, raw.length)?;
    String::from_utf8(payload.to_vec()).map_err(|_| Error::InvalidString)
}

pub fn decode_data(data: &[u8], mut offset: usize) -> Result<Vec<u8>> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_DATA)?;
    Ok(payload_slice(data, offset, raw.length)?.to_vec())
}

pub fn decode_bool(data: &[u8], mut offset: usize) -> Result<bool> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_BOOLEAN)?;
    match raw.subkind {
        BOOLEAN_FALSE => Ok(false),
        BOOLEAN_TRUE => Ok(true),
        _ => Err(Error::UnexpectedKind {
            expected: KIND_BOOLEAN,
            got: KIND_BOOLEAN | raw.subkind,
        }),
    }
}

pub fn decode_i32(data: &[u8], mut offset: usize) -> Result<i32> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_NUMBER)?;
    if raw.subkind != NUMBER_SINT32 {
        return Err(Error::UnexpectedKind {
            expected: KIND_NUMBER | NUMBER_SINT32,
            got: KIND_NUMBER | raw.subkind,
        });
    }
    payload_slice(data, offset, raw.length)?;
    Ok(data.gread_with::<i32>(&mut offset, scroll::LE)?)
}

pub fn decode_i64(data: &[u8], mut offset: usize) -> Result<i64> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_NUMBER)?;
    if raw.subkind != NUMBER_SINT64 {
        return Err(Error::UnexpectedKind {
            expected: KIND_NUMBER | NUMBER_SINT64,
            got: KIND_NUMBER | raw.subkind,
        });
    }
    payload_slice(data, offset, raw.length)?;
    Ok(data.gread_with::<i64>(&mut offset, scroll::LE)?)
}

pub fn decode_date(data: &[u8], mut offset: usize) -> Result<DateTime<Utc>> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_DATE)?;
    if raw.length != 8 {
        return Err(Error::TruncatedValue);
    }
    payload_slice(data, offset, raw.length)?;
    let secs = data.gread_with::<f64>(&mut offset, scroll::BE)?;
    Ok(date::from_darwin_seconds(secs))
}

/// Returns whether the URL is absolute together with its text.
pub fn decode_url(data: &[u8], mut offset: usize) -> Result<(bool, String)> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_URL)?;
    let absolute = match raw.subkind {
        URL_ABSOLUTE => true,
        URL_RELATIVE => false,
        _ => {
            return Err(Error::UnexpectedKind {
                expected: KIND_URL | URL_ABSOLUTE,
                got: KIND_URL | raw.subkind,
            })
        }
    };
    let payload = payload_slice(data, offset, raw.length)?;
    let url = String::from_utf8(payload.to_vec()).map_err(|_| Error::InvalidString)?;
    Ok((absolute, url))
}

pub fn decode_offset_array(data: &[u8], mut offset: usize) -> Result<Vec<u32>> {
    let raw = read_raw(data, &mut offset)?;
    expect_kind(&raw, KIND_ARRAY)?;
    if raw.length % 4 != 0 {
        return Err(Error::TruncatedValue);
    }
    payload_slice(data, offset, raw.length)?;
    let count = raw.length / 4;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(data.gread_with::<u32>(&mut offset, scroll::LE)?);
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn string_round_trip_and_padding() {
        let mut buf = Vec::new();
        let off = emit_string(&mut buf, "abc").unwrap();
        assert_eq!(off, 0);
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[..4], &3u32.to_le_bytes());
        assert_eq!(&buf[4..8], &(KIND_STRING | SUBTYPE_ONE).to_le_bytes());
        assert_eq!(&buf[8..11], b"abc");
        assert_eq!(buf[11], 0);
        assert_eq!(decode_string(&buf, 0).unwrap(), "abc");
    }

    #[test]
    fn consecutive_values_stay_aligned() {
        let mut buf = Vec::new();
        let a = emit_string(&mut buf, "12345").unwrap();
        let b = emit_data(&mut buf, &[1, 2, 3, 4, 5, 6, 7]).unwrap();
        let c = emit_bool(&mut buf, true).unwrap();
        for off in [a, b, c] {
            assert_eq!(off % 4, 0);
        }
        assert_eq!(decode_data(&buf, b as usize).unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(decode_bool(&buf, c as usize).unwrap());
    }

    #[test]
    fn numbers_round_trip() {
        let mut buf = Vec::new();
        let a = emit_i32(&mut buf, -42).unwrap();
        let b = emit_i64(&mut buf, 0x8a2406).unwrap();
        assert_eq!(decode_i32(&buf, a as usize).unwrap(), -42);
        assert_eq!(decode_i64(&buf, b as usize).unwrap(), 0x8a2406);
    }

    #[test]
    fn number_width_is_checked() {
        let mut buf = Vec::new();
        emit_i32(&mut buf, 7).unwrap();
        assert!(matches!(
            decode_i64(&buf, 0),
            Err(Error::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn date_payload_is_a_big_endian_double() {
        let t = chrono::Utc.timestamp_opt(63_190_694_952, 0).unwrap();
        let mut buf = Vec::new();
        emit_date(&mut buf, t).unwrap();
        assert_eq!(buf.len(), 16);

        let secs = crate::date::darwin_seconds(t);
        assert_eq!(&buf[8..16], &secs.to_be_bytes());
        // A little endian reading of the same bytes must not agree.
        assert_ne!(secs.to_be_bytes(), secs.to_le_bytes());
        assert_eq!(decode_date(&buf, 0).unwrap(), t);
    }

    #[test]
    fn bool_encoding_has_no_payload() {
        let mut buf = Vec::new();
        emit_bool(&mut buf, true).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0x01, 0x05, 0, 0]);
        buf.clear();
        emit_bool(&mut buf, false).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0x00, 0x05, 0, 0]);
    }

    #[test]
    fn bool_with_unknown_subkind_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(KIND_BOOLEAN | 0x02).to_le_bytes());
        assert!(matches!(
            decode_bool(&buf, 0),
            Err(Error::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn url_round_trip() {
        let mut buf = Vec::new();
        let off = emit_url(&mut buf, true, "file:///").unwrap();
        assert_eq!(
            decode_url(&buf, off as usize).unwrap(),
            (true, "file:///".to_string())
        );
    }

    #[test]
    fn array_round_trip() {
        let mut buf = Vec::new();
        let a = emit_string(&mut buf, "Users").unwrap();
        let b = emit_string(&mut buf, "mattetti").unwrap();
        let arr = emit_offset_array(&mut buf, &[a, b]).unwrap();
        assert_eq!(decode_offset_array(&buf, arr as usize).unwrap(), vec![a, b]);
    }

    #[test]
    fn array_length_must_be_a_multiple_of_four() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&6u32.to_le_bytes());
        buf.extend_from_slice(&(KIND_ARRAY | SUBTYPE_ONE).to_le_bytes());
        buf.extend_from_slice(&[0; 8]);
        assert!(matches!(
            decode_offset_array(&buf, 0),
            Err(Error::TruncatedValue)
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&(KIND_STRING | SUBTYPE_ONE).to_le_bytes());
        buf.extend_from_slice(b"short");
        assert!(matches!(decode_string(&buf, 0), Err(Error::TruncatedValue)));
    }

    #[test]
    fn kind_mismatch_is_fatal() {
        let mut buf = Vec::new();
        emit_string(&mut buf, "not a number").unwrap();
        assert!(matches!(
            decode_i32(&buf, 0),
            Err(Error::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&(KIND_STRING | SUBTYPE_ONE).to_le_bytes());
        buf.extend_from_slice(&[0xff, 0xfe, 0, 0]);
        assert!(matches!(decode_string(&buf, 0), Err(Error::InvalidString)));
    }
}
