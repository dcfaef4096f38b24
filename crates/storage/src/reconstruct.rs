// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rebuild the live graph from flat `(id, parent_id, key)` rows
//!
//! Rows arrive in storage order, which says nothing about parents. Each row
//! walks its parent chain until it reaches something already placed, a
//! root, a dangling parent or itself. Chains are then attached top-down,
//! so a parent always exists before its children.
//!
//! - A dangling parent turns the top of the chain into a root (orphan).
//! - A key clash under one parent turns the later node into a root.
//! - A chain that revisits itself is a cycle: every node on it, and every
//!   node hanging off it, is detached and reported rather than guessed at.

use crate::recovery::RecoveryNote;
use fxd_core::{Graph, GraphError, Node, NodeId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct Reconstruction {
    pub graph: Graph,
    pub notes: Vec<RecoveryNote>,
    /// Members of each parent cycle, in chain order
    pub cycles: Vec<Vec<NodeId>>,
    /// Nodes that could not be placed because of a cycle
    pub detached: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Attached,
    Detached,
}

pub fn reconstruct(rows: Vec<Node>) -> Reconstruction {
    let mut pending: BTreeMap<NodeId, Node> =
        rows.into_iter().map(|node| (node.id.clone(), node)).collect();
    let all_ids: Vec<NodeId> = pending.keys().cloned().collect();
    let known: BTreeSet<NodeId> = all_ids.iter().cloned().collect();

    let mut out = Reconstruction::default();
    let mut placed: BTreeMap<NodeId, Placement> = BTreeMap::new();

    for start in all_ids {
        if placed.contains_key(&start) {
            continue;
        }

        // Walk up until the chain is anchored
        let mut chain: Vec<NodeId> = Vec::new();
        let mut on_chain: BTreeSet<NodeId> = BTreeSet::new();
        let mut current = start;
        let anchor = loop {
            if let Some(placement) = placed.get(&current) {
                break Some(*placement);
            }
            if on_chain.contains(&current) {
                let from = chain.iter().position(|id| *id == current).unwrap_or(0);
                out.cycles.push(chain[from..].to_vec());
                break Some(Placement::Detached);
            }
            chain.push(current.clone());
            on_chain.insert(current.clone());

            let parent = pending.get(&current).and_then(|node| node.parent_id.clone());
            match parent {
                None => break None,
                Some(parent) if !known.contains(&parent) => {
                    if let Some(node) = pending.get_mut(&current) {
                        tracing::warn!(node = %current, missing_parent = %parent, "orphan node promoted to root");
                        out.notes.push(RecoveryNote::OrphanReference {
                            node: current.clone(),
                            missing_parent: parent,
                        });
                        node.parent_id = None;
                        node.dirty = true;
                    }
                    break None;
                }
                Some(parent) => current = parent,
            }
        };

        if anchor == Some(Placement::Detached) {
            for id in chain {
                if let Some(node) = pending.remove(&id) {
                    out.detached.push(node);
                }
                placed.insert(id, Placement::Detached);
            }
            continue;
        }

        // Top of the chain first
        for id in chain.into_iter().rev() {
            if let Some(node) = pending.remove(&id) {
                attach(&mut out, node);
            }
            placed.insert(id, Placement::Attached);
        }
    }

    if !out.cycles.is_empty() {
        tracing::error!(
            cycles = out.cycles.len(),
            detached = out.detached.len(),
            "parent cycle in snapshot"
        );
    }
    out
}

fn attach(out: &mut Reconstruction, node: Node) {
    match out.graph.attach(node.clone()) {
        Ok(()) => {}
        Err(GraphError::DuplicateKey {
            parent: Some(parent),
            key,
        }) => {
            tracing::warn!(node = %node.id, %parent, %key, "duplicate sibling key; promoted to root");
            out.notes.push(RecoveryNote::DuplicateKey {
                node: node.id.clone(),
                parent,
                key,
            });
            let mut root = node;
            root.parent_id = None;
            root.dirty = true;
            if let Err(e) = out.graph.attach(root) {
                tracing::error!(?e, "failed to attach promoted root");
            }
        }
        Err(e) => tracing::error!(?e, "failed to attach node"),
    }
}

#[cfg(test)]
#[path = "reconstruct_tests.rs"]
mod tests;
