// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations carried in WAL payloads
//!
//! Each payload is a single codec record. Readers take the fields they know
//! and skip any that a newer writer appended.

use super::record::Opcode;
use fxd_core::codec::{CodecError, Decoder, Encoder, RecordReader};
use fxd_core::{Graph, GraphError, Node, NodeId, NodeKind, Signal, Snippet, Value};

/// A logged mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create a node, or replace the content of an existing one in place
    PutNode(Node),
    UpdateValue {
        id: NodeId,
        value: Value,
        modified_at_micros: u64,
    },
    /// Remove a node and its subtree
    DeleteNode { id: NodeId },
    PutSnippet(Snippet),
    EmitSignal {
        stream_id: String,
        payload: Value,
        timestamp_micros: u64,
    },
    /// Everything before this record is folded into the snapshot
    CheckpointMarker { timestamp_micros: u64 },
}

impl Operation {
    pub fn opcode(&self) -> Opcode {
        match self {
            Operation::PutNode(_) => Opcode::PutNode,
            Operation::UpdateValue { .. } => Opcode::UpdateValue,
            Operation::DeleteNode { .. } => Opcode::DeleteNode,
            Operation::PutSnippet(_) => Opcode::PutSnippet,
            Operation::EmitSignal { .. } => Opcode::EmitSignal,
            Operation::CheckpointMarker { .. } => Opcode::CheckpointMarker,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.record(|r| match self {
            Operation::PutNode(node) => {
                r.put(&node.id);
                r.put(&node.parent_id);
                r.put(&node.key);
                r.put(node.kind.as_str());
                r.put(&node.value);
                r.put(&node.prototypes);
                r.put(&node.metadata);
                r.put(&node.created_at_micros);
                r.put(&node.modified_at_micros);
            }
            Operation::UpdateValue {
                id,
                value,
                modified_at_micros,
            } => {
                r.put(id);
                r.put(value);
                r.put(modified_at_micros);
            }
            Operation::DeleteNode { id } => r.put(id),
            Operation::PutSnippet(snippet) => {
                r.put(&snippet.snippet_id);
                r.put(&snippet.node_id);
                r.put(&snippet.body);
                r.put(&snippet.language);
                r.put(&snippet.virtual_file_path);
                r.put(&snippet.order_index);
                r.put(&snippet.version);
            }
            Operation::EmitSignal {
                stream_id,
                payload,
                timestamp_micros,
            } => {
                r.put(stream_id);
                r.put(payload);
                r.put(timestamp_micros);
            }
            Operation::CheckpointMarker { timestamp_micros } => r.put(timestamp_micros),
        });
        enc.into_bytes()
    }

    pub fn decode(opcode: Opcode, payload: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(payload);
        let mut fields = dec.read_unit()?.read_record()?;
        let op = match opcode {
            Opcode::PutNode => Operation::PutNode(decode_node(&mut fields)?),
            Opcode::UpdateValue => Operation::UpdateValue {
                id: fields.field("id")?,
                value: fields.field("value")?,
                modified_at_micros: fields.field("modified_at")?,
            },
            Opcode::DeleteNode => Operation::DeleteNode {
                id: fields.field("id")?,
            },
            Opcode::PutSnippet => Operation::PutSnippet(decode_snippet(&mut fields)?),
            Opcode::EmitSignal => Operation::EmitSignal {
                stream_id: fields.field("stream_id")?,
                payload: fields.field("payload")?,
                timestamp_micros: fields.field("timestamp")?,
            },
            Opcode::CheckpointMarker => Operation::CheckpointMarker {
                timestamp_micros: fields.field("timestamp")?,
            },
        };
        fields.finish()?;
        dec.finish()?;
        Ok(op)
    }

    /// Apply to the live graph; signals and markers leave it untouched
    pub fn apply(&self, graph: &mut Graph) -> Result<(), GraphError> {
        match self {
            Operation::PutNode(node) => graph.upsert(node.clone()),
            Operation::UpdateValue {
                id,
                value,
                modified_at_micros,
            } => graph.set_value(id, value.clone(), *modified_at_micros),
            Operation::DeleteNode { id } => graph.remove(id).map(|_| ()),
            Operation::PutSnippet(snippet) => graph.apply_snippet(snippet.clone()),
            Operation::EmitSignal { .. } | Operation::CheckpointMarker { .. } => Ok(()),
        }
    }

    /// The signal this operation emits, stamped with its WAL sequence
    pub fn as_signal(&self, sequence: u64) -> Option<Signal> {
        match self {
            Operation::EmitSignal {
                stream_id,
                payload,
                timestamp_micros,
            } => Some(Signal {
                stream_id: stream_id.clone(),
                sequence,
                payload: payload.clone(),
                timestamp_micros: *timestamp_micros,
            }),
            _ => None,
        }
    }
}

fn decode_node(fields: &mut RecordReader<'_>) -> Result<Node, CodecError> {
    let id: NodeId = fields.field("id")?;
    let parent_id: Option<NodeId> = fields.field("parent_id")?;
    let key: String = fields.field("key")?;
    let kind: String = fields.field("kind")?;
    let value: Value = fields.field("value")?;
    let mut node = Node::new(id, parent_id, key, NodeKind::parse(&kind), value, 0);
    node.prototypes = fields.field("prototypes")?;
    node.metadata = fields.field("metadata")?;
    node.created_at_micros = fields.field("created_at")?;
    node.modified_at_micros = fields.field("modified_at")?;
    node.refresh_checksum();
    Ok(node)
}

fn decode_snippet(fields: &mut RecordReader<'_>) -> Result<Snippet, CodecError> {
    let mut snippet = Snippet {
        snippet_id: fields.field("snippet_id")?,
        node_id: fields.field("node_id")?,
        body: fields.field("body")?,
        language: fields.field("language")?,
        virtual_file_path: fields.field("virtual_file_path")?,
        order_index: fields.field("order_index")?,
        version: fields.field("version")?,
        checksum: 0,
    };
    snippet.checksum = snippet.compute_checksum();
    Ok(snippet)
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
