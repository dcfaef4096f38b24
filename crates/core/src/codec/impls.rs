// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encode/Decode for the primitive and value types

use super::{CodecError, Decode, Encode, Encoder, Tag, Unit};
use crate::node::NodeId;
use crate::value::{Metadata, Scalar, Value};

impl Encode for bool {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.bool(*self);
    }
}

impl Decode for bool {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_bool()
    }
}

impl Encode for f64 {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.number(*self);
    }
}

impl Decode for f64 {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_number()
    }
}

impl Encode for u64 {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.unsigned(*self);
    }
}

impl Decode for u64 {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_unsigned()
    }
}

// Signed integers share the unsigned tag as two's complement.
impl Encode for i64 {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.unsigned(*self as u64);
    }
}

impl Decode for i64 {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_unsigned().map(|n| n as i64)
    }
}

impl Encode for str {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.string(self);
    }
}

impl Encode for String {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.string(self);
    }
}

impl Decode for String {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_str().map(str::to_string)
    }
}

impl Encode for [u8] {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.blob(self);
    }
}

impl Encode for Vec<u8> {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.blob(self);
    }
}

impl Decode for Vec<u8> {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_blob().map(<[u8]>::to_vec)
    }
}

impl Encode for NodeId {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.node_ref(self);
    }
}

impl Decode for NodeId {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_node_ref()
    }
}

impl Encode for [NodeId] {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.sequence(self);
    }
}

impl Encode for Vec<NodeId> {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.sequence(self);
    }
}

impl Decode for Vec<NodeId> {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_sequence()
    }
}

impl Encode for Metadata {
    fn encode_into(&self, enc: &mut Encoder) {
        enc.map(self);
    }
}

impl Decode for Metadata {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        unit.read_map()
    }
}

impl Encode for Scalar {
    fn encode_into(&self, enc: &mut Encoder) {
        match self {
            Scalar::Null => enc.null(),
            Scalar::Bool(b) => enc.bool(*b),
            Scalar::Number(n) => enc.number(*n),
            Scalar::String(s) => enc.string(s),
        }
    }
}

impl Decode for Scalar {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        match unit.tag() {
            Tag::Null => unit.read_null().map(|()| Scalar::Null),
            Tag::Bool => unit.read_bool().map(Scalar::Bool),
            Tag::Number => unit.read_number().map(Scalar::Number),
            Tag::String => unit.read_str().map(|s| Scalar::String(s.to_string())),
            other => Err(CodecError::UnexpectedTag {
                expected: "scalar",
                found: other as u8,
                offset: unit.offset(),
            }),
        }
    }
}

impl Encode for Value {
    fn encode_into(&self, enc: &mut Encoder) {
        match self {
            Value::Null => enc.null(),
            Value::Bool(b) => enc.bool(*b),
            Value::Number(n) => enc.number(*n),
            Value::String(s) => enc.string(s),
            Value::Blob(bytes) => enc.blob(bytes),
            Value::Sequence(ids) => enc.sequence(ids),
        }
    }
}

impl Decode for Value {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        match unit.tag() {
            Tag::Null => unit.read_null().map(|()| Value::Null),
            Tag::Bool => unit.read_bool().map(Value::Bool),
            Tag::Number => unit.read_number().map(Value::Number),
            Tag::String => unit.read_str().map(|s| Value::String(s.to_string())),
            Tag::Blob => unit.read_blob().map(|b| Value::Blob(b.to_vec())),
            Tag::Sequence => unit.read_sequence().map(Value::Sequence),
            other => Err(CodecError::UnexpectedTag {
                expected: "value",
                found: other as u8,
                offset: unit.offset(),
            }),
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode_into(&self, enc: &mut Encoder) {
        match self {
            Some(value) => value.encode_into(enc),
            None => enc.null(),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode_unit(unit: Unit<'_>) -> Result<Self, CodecError> {
        if unit.is_null() {
            unit.read_null()?;
            return Ok(None);
        }
        T::decode_unit(unit).map(Some)
    }
}
