// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-fatal findings from loading a store
//!
//! Load never drops data silently: anything it had to repair or skip is
//! recorded here and logged, and the caller can inspect the notes through
//! [`crate::Store::recovery_notes`].

use fxd_core::NodeId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryNote {
    /// A node's parent was missing; the node was promoted to a root
    OrphanReference { node: NodeId, missing_parent: NodeId },
    /// Two siblings claimed the same key; the later one was promoted to a root
    DuplicateKey { node: NodeId, parent: NodeId, key: String },
    /// The WAL ended in an invalid record and was cut back
    WalTruncated {
        offset: u64,
        reason: String,
        discarded_bytes: u64,
    },
    /// A replayed record decoded but could not be applied
    SkippedOperation { sequence: u64, reason: String },
    /// A snippet row pointed at a node that did not survive reconstruction
    UnboundSnippet { snippet_id: String, node: NodeId },
    /// A parent cycle; its members and everything under them were detached
    CycleDetected { nodes: Vec<NodeId> },
}

impl fmt::Display for RecoveryNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryNote::OrphanReference {
                node,
                missing_parent,
            } => write!(f, "node {node} references missing parent {missing_parent}; promoted to root"),
            RecoveryNote::DuplicateKey { node, parent, key } => write!(
                f,
                "node {node} reuses key {key:?} under {parent}; promoted to root"
            ),
            RecoveryNote::WalTruncated {
                offset,
                reason,
                discarded_bytes,
            } => write!(
                f,
                "WAL truncated at offset {offset} ({reason}), {discarded_bytes} bytes discarded"
            ),
            RecoveryNote::SkippedOperation { sequence, reason } => {
                write!(f, "skipped WAL record {sequence}: {reason}")
            }
            RecoveryNote::UnboundSnippet { snippet_id, node } => {
                write!(f, "snippet {snippet_id} references missing node {node}")
            }
            RecoveryNote::CycleDetected { nodes } => {
                write!(f, "parent cycle through {} nodes; subtree detached", nodes.len())
            }
        }
    }
}
