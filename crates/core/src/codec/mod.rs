// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-describing binary codec
//!
//! Every encoded unit is `tag: u8 | len: u32 LE | contents[len]`, so a reader
//! can always step over a unit it does not understand.
//!
//! ```text
//! 0x00 null       len 0
//! 0x01 bool       len 1, 0x00 or 0x01
//! 0x02 number     len 8, f64 little-endian
//! 0x03 string     UTF-8 bytes
//! 0x04 blob       raw bytes
//! 0x05 sequence   count: u32 LE, then `count` node-ref units
//! 0x06 node-ref   UTF-8 node id
//! 0x07 map        count: u32 LE, then (string key, scalar) pairs, keys ascending
//! 0x08 record     a run of units; readers take known fields and skip the rest
//! 0x09 unsigned   len 8, u64 little-endian
//! ```
//!
//! Records are how operation payloads evolve: a newer writer may append
//! fields, and an older reader ignores the tail instead of failing.

mod decoder;
mod encoder;
mod impls;

pub use decoder::{Decoder, RecordReader, Unit};
pub use encoder::Encoder;

use thiserror::Error;

/// Size of a unit header (tag + length)
pub const UNIT_HEADER_LEN: usize = 5;

/// Type tag of an encoded unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Null = 0x00,
    Bool = 0x01,
    Number = 0x02,
    String = 0x03,
    Blob = 0x04,
    Sequence = 0x05,
    NodeRef = 0x06,
    Map = 0x07,
    Record = 0x08,
    Unsigned = 0x09,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Tag::Null,
            0x01 => Tag::Bool,
            0x02 => Tag::Number,
            0x03 => Tag::String,
            0x04 => Tag::Blob,
            0x05 => Tag::Sequence,
            0x06 => Tag::NodeRef,
            0x07 => Tag::Map,
            0x08 => Tag::Record,
            0x09 => Tag::Unsigned,
            _ => return None,
        })
    }
}

/// Decoding failures; encoding is total and never fails
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("truncated input at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("unknown tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },
    #[error("expected {expected:?} at offset {offset}, found tag 0x{found:02x}")]
    UnexpectedTag {
        expected: &'static str,
        found: u8,
        offset: usize,
    },
    #[error("invalid length {len} for {tag:?} at offset {offset}")]
    InvalidLength { tag: Tag, len: usize, offset: usize },
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("invalid boolean byte 0x{byte:02x} at offset {offset}")]
    InvalidBool { byte: u8, offset: usize },
    #[error("map keys out of order or duplicated at key {key:?}")]
    UnorderedKey { key: String },
    #[error("{count} trailing bytes after value")]
    TrailingBytes { count: usize },
    #[error("missing record field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// A type with a canonical binary encoding
pub trait Encode {
    fn encode_into(&self, enc: &mut Encoder);
}

/// A type that can be rebuilt from a single encoded unit
pub trait Decode: Sized {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError>;
}

/// Encode a value as a standalone byte buffer
pub fn encode<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut enc = Encoder::new();
    value.encode_into(&mut enc);
    enc.into_bytes()
}

/// Decode exactly one unit spanning the whole buffer
pub fn decode<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut dec = Decoder::new(bytes);
    let unit = dec.read_unit()?;
    let value = T::decode_unit(unit)?;
    dec.finish()?;
    Ok(value)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
