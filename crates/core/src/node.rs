// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph vertices

use crate::checksum;
use crate::codec;
use crate::value::{Metadata, Value};
use std::fmt;

/// Opaque node identifier, stable across save and load
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Role a node plays in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    /// Plain scalar leaf
    #[default]
    Raw,
    /// Composite whose fields are child nodes
    Object,
    /// Node that owns a snippet
    Snippet,
    /// Any other typed role, kept verbatim
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Raw => "raw",
            NodeKind::Object => "object",
            NodeKind::Snippet => "snippet",
            NodeKind::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "raw" => NodeKind::Raw,
            "object" => NodeKind::Object,
            "snippet" => NodeKind::Snippet,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex in the persisted graph
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// `None` for a root
    pub parent_id: Option<NodeId>,
    /// Name under the parent, unique among siblings
    pub key: String,
    pub kind: NodeKind,
    pub value: Value,
    /// Delegation targets; not ownership
    pub prototypes: Vec<NodeId>,
    pub metadata: Metadata,
    /// Digest over value and metadata, see [`Node::compute_checksum`]
    pub checksum: u64,
    pub created_at_micros: u64,
    pub modified_at_micros: u64,
    /// Changed since the last checkpoint
    pub dirty: bool,
}

impl Node {
    /// Build a fresh, dirty node with its checksum filled in
    pub fn new(
        id: NodeId,
        parent_id: Option<NodeId>,
        key: impl Into<String>,
        kind: NodeKind,
        value: Value,
        now_micros: u64,
    ) -> Self {
        let mut node = Self {
            id,
            parent_id,
            key: key.into(),
            kind,
            value,
            prototypes: Vec::new(),
            metadata: Metadata::new(),
            checksum: 0,
            created_at_micros: now_micros,
            modified_at_micros: now_micros,
            dirty: true,
        };
        node.refresh_checksum();
        node
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn value_bytes(&self) -> Vec<u8> {
        codec::encode(&self.value)
    }

    pub fn metadata_bytes(&self) -> Vec<u8> {
        codec::encode(&self.metadata)
    }

    pub fn prototypes_bytes(&self) -> Vec<u8> {
        codec::encode(&self.prototypes)
    }

    pub fn compute_checksum(&self) -> u64 {
        checksum::node_checksum(&self.value_bytes(), &self.metadata_bytes())
    }

    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Record a content change at `now_micros`
    pub fn touch(&mut self, now_micros: u64) {
        self.refresh_checksum();
        self.modified_at_micros = now_micros;
        self.dirty = true;
    }
}

// Dirty is checkpoint bookkeeping, not content.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.parent_id == other.parent_id
            && self.key == other.key
            && self.kind == other.kind
            && self.value == other.value
            && self.prototypes == other.prototypes
            && self.metadata == other.metadata
            && self.checksum == other.checksum
            && self.created_at_micros == other.created_at_micros
            && self.modified_at_micros == other.modified_at_micros
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
