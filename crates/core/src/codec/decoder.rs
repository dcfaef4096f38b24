// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounds-checked unit reader
//!
//! Decoding never trusts a length prefix: every read is checked against the
//! bytes actually present, and failures carry the absolute offset.

use super::{CodecError, Decode, Tag, UNIT_HEADER_LEN};
use crate::node::NodeId;
use crate::value::{Metadata, Scalar};

/// Cursor over a buffer of encoded units
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

/// One framed unit borrowed from the input
#[derive(Debug, Clone, Copy)]
pub struct Unit<'a> {
    tag: Tag,
    contents: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Read the next unit header and borrow its contents
    pub fn read_unit(&mut self) -> Result<Unit<'a>, CodecError> {
        let offset = self.base + self.pos;
        let remaining = self.remaining();
        if remaining < UNIT_HEADER_LEN {
            return Err(CodecError::Truncated {
                offset,
                needed: UNIT_HEADER_LEN,
                remaining,
            });
        }

        let tag_byte = self.buf[self.pos];
        let tag = Tag::from_byte(tag_byte).ok_or(CodecError::UnknownTag {
            tag: tag_byte,
            offset,
        })?;

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buf[self.pos + 1..self.pos + UNIT_HEADER_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if remaining - UNIT_HEADER_LEN < len {
            return Err(CodecError::Truncated {
                offset,
                needed: UNIT_HEADER_LEN + len,
                remaining,
            });
        }

        let start = self.pos + UNIT_HEADER_LEN;
        let contents = &self.buf[start..start + len];
        self.pos = start + len;

        Ok(Unit {
            tag,
            contents,
            offset,
        })
    }

    /// Read the next unit and decode it as `T`
    pub fn read<T: Decode>(&mut self) -> Result<T, CodecError> {
        T::decode_unit(self.read_unit()?)
    }

    /// Fail if any bytes remain
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(CodecError::TrailingBytes { count }),
        }
    }
}

impl<'a> Unit<'a> {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn contents(&self) -> &'a [u8] {
        self.contents
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_null(&self) -> bool {
        self.tag == Tag::Null
    }

    fn expect(&self, tag: Tag, expected: &'static str) -> Result<&'a [u8], CodecError> {
        if self.tag != tag {
            return Err(CodecError::UnexpectedTag {
                expected,
                found: self.tag as u8,
                offset: self.offset,
            });
        }
        Ok(self.contents)
    }

    fn fixed<const N: usize>(&self, tag: Tag, expected: &'static str) -> Result<[u8; N], CodecError> {
        let contents = self.expect(tag, expected)?;
        let bytes: [u8; N] = contents.try_into().map_err(|_| CodecError::InvalidLength {
            tag,
            len: contents.len(),
            offset: self.offset,
        })?;
        Ok(bytes)
    }

    fn inner(&self) -> Decoder<'a> {
        Decoder::with_base(self.contents, self.offset + UNIT_HEADER_LEN)
    }

    pub fn read_null(&self) -> Result<(), CodecError> {
        self.fixed::<0>(Tag::Null, "null").map(|_| ())
    }

    pub fn read_bool(&self) -> Result<bool, CodecError> {
        let [byte] = self.fixed::<1>(Tag::Bool, "bool")?;
        match byte {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(CodecError::InvalidBool {
                byte,
                offset: self.offset,
            }),
        }
    }

    pub fn read_number(&self) -> Result<f64, CodecError> {
        self.fixed::<8>(Tag::Number, "number").map(f64::from_le_bytes)
    }

    pub fn read_unsigned(&self) -> Result<u64, CodecError> {
        self.fixed::<8>(Tag::Unsigned, "unsigned").map(u64::from_le_bytes)
    }

    pub fn read_str(&self) -> Result<&'a str, CodecError> {
        let contents = self.expect(Tag::String, "string")?;
        self.utf8(contents)
    }

    pub fn read_blob(&self) -> Result<&'a [u8], CodecError> {
        self.expect(Tag::Blob, "blob")
    }

    pub fn read_node_ref(&self) -> Result<NodeId, CodecError> {
        let contents = self.expect(Tag::NodeRef, "node-ref")?;
        self.utf8(contents).map(NodeId::from)
    }

    pub fn read_sequence(&self) -> Result<Vec<NodeId>, CodecError> {
        self.expect(Tag::Sequence, "sequence")?;
        let (count, mut items) = self.counted()?;
        let mut ids = Vec::with_capacity(count.min(items.remaining() / UNIT_HEADER_LEN));
        for _ in 0..count {
            ids.push(items.read_unit()?.read_node_ref()?);
        }
        items.finish()?;
        Ok(ids)
    }

    pub fn read_map(&self) -> Result<Metadata, CodecError> {
        self.expect(Tag::Map, "map")?;
        let (count, mut items) = self.counted()?;
        let mut map = Metadata::new();
        let mut previous: Option<String> = None;
        for _ in 0..count {
            let key = items.read_unit()?.read_str()?.to_string();
            if previous.as_deref().is_some_and(|prev| prev >= key.as_str()) {
                return Err(CodecError::UnorderedKey { key });
            }
            let value: Scalar = items.read()?;
            previous = Some(key.clone());
            map.insert(key, value);
        }
        items.finish()?;
        Ok(map)
    }

    /// Open a record for field-by-field reading
    pub fn read_record(&self) -> Result<RecordReader<'a>, CodecError> {
        self.expect(Tag::Record, "record")?;
        Ok(RecordReader {
            fields: self.inner(),
        })
    }

    /// Split `count: u32` off the front of a sequence or map
    fn counted(&self) -> Result<(usize, Decoder<'a>), CodecError> {
        if self.contents.len() < 4 {
            return Err(CodecError::InvalidLength {
                tag: self.tag,
                len: self.contents.len(),
                offset: self.offset,
            });
        }
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&self.contents[..4]);
        let count = u32::from_le_bytes(count_bytes) as usize;
        let items = Decoder::with_base(&self.contents[4..], self.offset + UNIT_HEADER_LEN + 4);
        Ok((count, items))
    }

    fn utf8(&self, bytes: &'a [u8]) -> Result<&'a str, CodecError> {
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 {
            offset: self.offset,
        })
    }
}

/// Reads the fields of a record in declaration order
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    fields: Decoder<'a>,
}

impl<'a> RecordReader<'a> {
    /// Read a required field
    pub fn field<T: Decode>(&mut self, name: &'static str) -> Result<T, CodecError> {
        if self.fields.is_empty() {
            return Err(CodecError::MissingField(name));
        }
        self.fields.read()
    }

    /// Read a field that older writers may not have produced
    pub fn optional_field<T: Decode>(&mut self) -> Result<Option<T>, CodecError> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        self.fields.read().map(Some)
    }

    /// Skip any fields appended by newer writers
    pub fn finish(mut self) -> Result<(), CodecError> {
        while !self.fields.is_empty() {
            self.fields.read_unit()?;
        }
        Ok(())
    }
}
