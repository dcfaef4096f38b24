// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text payloads attached to nodes

use crate::checksum;
use crate::node::NodeId;

/// A snippet bound to exactly one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// User-facing stable id, unique across the store
    pub snippet_id: String,
    pub node_id: NodeId,
    pub body: String,
    pub language: String,
    pub virtual_file_path: String,
    /// Ordering among siblings
    pub order_index: i64,
    /// Bumped on every rewrite of the same `snippet_id`
    pub version: u64,
    pub checksum: u64,
}

/// Caller-supplied snippet fields; version and checksum are assigned on put
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSnippet {
    pub snippet_id: String,
    pub node_id: NodeId,
    pub body: String,
    pub language: String,
    pub virtual_file_path: String,
    pub order_index: i64,
}

impl Snippet {
    pub fn from_new(new: NewSnippet, version: u64) -> Self {
        let mut snippet = Self {
            snippet_id: new.snippet_id,
            node_id: new.node_id,
            body: new.body,
            language: new.language,
            virtual_file_path: new.virtual_file_path,
            order_index: new.order_index,
            version,
            checksum: 0,
        };
        snippet.checksum = snippet.compute_checksum();
        snippet
    }

    pub fn compute_checksum(&self) -> u64 {
        checksum::snippet_checksum(
            &self.body,
            &self.language,
            &self.virtual_file_path,
            self.order_index,
        )
    }

    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Whether `new` would change anything stored
    pub fn differs_from(&self, new: &NewSnippet) -> bool {
        self.node_id != new.node_id
            || self.body != new.body
            || self.language != new.language
            || self.virtual_file_path != new.virtual_file_path
            || self.order_index != new.order_index
    }
}
