// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit writer

use super::{Encode, Tag, UNIT_HEADER_LEN};
use crate::node::NodeId;
use crate::value::Scalar;
use std::collections::BTreeMap;

/// Appends encoded units to an owned buffer
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn null(&mut self) {
        self.unit(Tag::Null, &[]);
    }

    pub fn bool(&mut self, value: bool) {
        self.unit(Tag::Bool, &[u8::from(value)]);
    }

    pub fn number(&mut self, value: f64) {
        self.unit(Tag::Number, &value.to_le_bytes());
    }

    pub fn unsigned(&mut self, value: u64) {
        self.unit(Tag::Unsigned, &value.to_le_bytes());
    }

    pub fn string(&mut self, value: &str) {
        self.unit(Tag::String, value.as_bytes());
    }

    pub fn blob(&mut self, value: &[u8]) {
        self.unit(Tag::Blob, value);
    }

    pub fn node_ref(&mut self, id: &NodeId) {
        self.unit(Tag::NodeRef, id.as_str().as_bytes());
    }

    pub fn sequence(&mut self, ids: &[NodeId]) {
        self.nested(Tag::Sequence, |enc| {
            enc.raw_u32(ids.len() as u32);
            for id in ids {
                enc.node_ref(id);
            }
        });
    }

    pub fn map(&mut self, entries: &BTreeMap<String, Scalar>) {
        self.nested(Tag::Map, |enc| {
            enc.raw_u32(entries.len() as u32);
            for (key, value) in entries {
                enc.string(key);
                value.encode_into(enc);
            }
        });
    }

    /// Write a record whose fields are produced by `fields`
    pub fn record(&mut self, fields: impl FnOnce(&mut Encoder)) {
        self.nested(Tag::Record, fields);
    }

    /// Write any encodable value as the next unit
    pub fn put<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode_into(self);
    }

    fn unit(&mut self, tag: Tag, contents: &[u8]) {
        self.buf.push(tag as u8);
        self.raw_u32(contents.len() as u32);
        self.buf.extend_from_slice(contents);
    }

    /// Write a unit whose length is only known after its contents
    fn nested(&mut self, tag: Tag, contents: impl FnOnce(&mut Encoder)) {
        let start = self.buf.len();
        self.buf.push(tag as u8);
        self.raw_u32(0);
        contents(self);
        let len = (self.buf.len() - start - UNIT_HEADER_LEN) as u32;
        self.buf[start + 1..start + UNIT_HEADER_LEN].copy_from_slice(&len.to_le_bytes());
    }

    fn raw_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }
}
