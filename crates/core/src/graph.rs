// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory node graph
//!
//! The graph is an explicit value owned by whoever drives it; there is no
//! process-wide instance. It maintains the forest invariants (unique ids,
//! unique sibling keys, parents exist before children) and tracks which
//! nodes and snippets changed since the last checkpoint.

use crate::node::{Node, NodeId, NodeKind};
use crate::snippet::{NewSnippet, Snippet};
use crate::value::{Metadata, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Separator for dotted paths such as `app.config.theme`
pub const PATH_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node id already exists: {0}")]
    DuplicateId(NodeId),
    #[error("key {key:?} already used under {}", parent_label(.parent))]
    DuplicateKey { parent: Option<NodeId>, key: String },
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("parent not found: {0}")]
    ParentNotFound(NodeId),
    #[error("snippet {snippet_id} references missing node {node_id}")]
    SnippetOwnerNotFound { snippet_id: String, node_id: NodeId },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid key {0:?}")]
    InvalidKey(String),
    #[error("invalid path {0:?}")]
    InvalidPath(String),
}

fn parent_label(parent: &Option<NodeId>) -> String {
    match parent {
        Some(id) => format!("node {id}"),
        None => "the roots".to_string(),
    }
}

/// Fields for a node about to be created
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub key: String,
    pub kind: NodeKind,
    pub value: Value,
    pub prototypes: Vec<NodeId>,
    pub metadata: Metadata,
}

impl NewNode {
    pub fn root(id: impl Into<NodeId>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn child(id: impl Into<NodeId>, parent: impl Into<NodeId>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent.into()),
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn into_node(self, now_micros: u64) -> Node {
        let mut node = Node::new(
            self.id,
            self.parent_id,
            self.key,
            self.kind,
            self.value,
            now_micros,
        );
        node.prototypes = self.prototypes;
        node.metadata = self.metadata;
        node.refresh_checksum();
        node
    }
}

/// Node and snippet deletions awaiting the next checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    pub nodes: Vec<NodeId>,
    /// Removed snippet ids with the last version each one reached
    pub snippets: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
    children: BTreeMap<NodeId, BTreeMap<String, NodeId>>,
    roots: BTreeSet<NodeId>,
    snippets: BTreeMap<String, Snippet>,
    snippet_by_node: BTreeMap<NodeId, String>,
    removed_nodes: BTreeSet<NodeId>,
    removed_snippets: BTreeSet<String>,
    dirty_snippets: BTreeSet<String>,
    /// Highest version ever given to a snippet id that was later removed;
    /// survives checkpoints so a re-created snippet keeps counting up
    retired_versions: BTreeMap<String, u64>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn snippet_count(&self) -> usize {
        self.snippets.len()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Children of `id` in key order
    pub fn children(&self, id: &NodeId) -> impl Iterator<Item = &Node> {
        self.children
            .get(id)
            .into_iter()
            .flat_map(|keys| keys.values())
            .filter_map(|child| self.nodes.get(child))
    }

    pub fn child(&self, parent: &NodeId, key: &str) -> Option<&Node> {
        self.children
            .get(parent)
            .and_then(|keys| keys.get(key))
            .and_then(|id| self.nodes.get(id))
    }

    /// First root with `key`, in id order
    pub fn root(&self, key: &str) -> Option<&Node> {
        self.roots().find(|node| node.key == key)
    }

    /// Resolve a dotted path from the roots
    pub fn resolve(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut node = self.root(segments.next()?)?;
        for segment in segments {
            node = self.child(&node.id, segment)?;
        }
        Some(node)
    }

    /// Dotted path of `id`, or `None` when the node is unknown
    pub fn path_of(&self, id: &NodeId) -> Option<String> {
        let mut keys = Vec::new();
        let mut current = self.nodes.get(id)?;
        // Bounded by node count in case a caller built a cycle via attach
        for _ in 0..=self.nodes.len() {
            keys.push(current.key.as_str());
            match &current.parent_id {
                None => {
                    keys.reverse();
                    return Some(keys.join("."));
                }
                Some(parent) => current = self.nodes.get(parent)?,
            }
        }
        None
    }

    pub fn snippets(&self) -> impl Iterator<Item = &Snippet> {
        self.snippets.values()
    }

    pub fn snippet(&self, snippet_id: &str) -> Option<&Snippet> {
        self.snippets.get(snippet_id)
    }

    pub fn snippet_for_node(&self, id: &NodeId) -> Option<&Snippet> {
        self.snippet_by_node
            .get(id)
            .and_then(|snippet_id| self.snippets.get(snippet_id))
    }

    /// Validate a create without applying it
    pub fn check_insert(&self, new: &NewNode) -> Result<(), GraphError> {
        check_key(&new.key)?;
        if self.nodes.contains_key(&new.id) {
            return Err(GraphError::DuplicateId(new.id.clone()));
        }
        self.check_slot(new.parent_id.as_ref(), &new.key)
    }

    fn check_slot(&self, parent: Option<&NodeId>, key: &str) -> Result<(), GraphError> {
        let taken = match parent {
            Some(parent) => {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphError::ParentNotFound(parent.clone()));
                }
                self.child(parent, key).is_some()
            }
            None => self.root(key).is_some(),
        };
        if taken {
            return Err(GraphError::DuplicateKey {
                parent: parent.cloned(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, new: NewNode, now_micros: u64) -> Result<&Node, GraphError> {
        self.check_insert(&new)?;
        let id = new.id.clone();
        self.link(new.into_node(now_micros));
        self.removed_nodes.remove(&id);
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Validate an upsert without applying it
    pub fn check_upsert(&self, node: &Node) -> Result<(), GraphError> {
        match self.nodes.get(&node.id) {
            Some(existing) => {
                if existing.parent_id != node.parent_id || existing.key != node.key {
                    return Err(GraphError::Conflict(format!(
                        "node {} cannot move from {:?} to {:?}",
                        node.id,
                        self.path_of(&node.id),
                        node.key
                    )));
                }
                Ok(())
            }
            None => {
                check_key(&node.key)?;
                self.check_slot(node.parent_id.as_ref(), &node.key)
            }
        }
    }

    /// Insert `node`, or replace the content of the node with the same id
    /// at the same position
    pub fn upsert(&mut self, mut node: Node) -> Result<(), GraphError> {
        self.check_upsert(&node)?;
        node.dirty = true;
        node.refresh_checksum();
        match self.nodes.get_mut(&node.id) {
            Some(existing) => *existing = node,
            None => {
                self.removed_nodes.remove(&node.id);
                self.link(node);
            }
        }
        Ok(())
    }

    /// Attach a loaded node without sibling-key or dirty bookkeeping
    ///
    /// The parent must already be present. Root keys may repeat, since
    /// recovered orphans keep their original key.
    pub fn attach(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        if let Some(parent) = &node.parent_id {
            if !self.nodes.contains_key(parent) {
                return Err(GraphError::ParentNotFound(parent.clone()));
            }
            if self.child(parent, &node.key).is_some() {
                return Err(GraphError::DuplicateKey {
                    parent: Some(parent.clone()),
                    key: node.key,
                });
            }
        }
        self.link(node);
        Ok(())
    }

    fn link(&mut self, node: Node) {
        match &node.parent_id {
            Some(parent) => {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(node.key.clone(), node.id.clone());
            }
            None => {
                self.roots.insert(node.id.clone());
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    pub fn set_value(&mut self, id: &NodeId, value: Value, now_micros: u64) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        node.value = value;
        node.touch(now_micros);
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        id: &NodeId,
        metadata: Metadata,
        now_micros: u64,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        node.metadata = metadata;
        node.touch(now_micros);
        Ok(())
    }

    pub fn set_prototypes(
        &mut self,
        id: &NodeId,
        prototypes: Vec<NodeId>,
        now_micros: u64,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        node.prototypes = prototypes;
        node.touch(now_micros);
        Ok(())
    }

    /// Ids removed by [`Graph::remove`], children before parents
    pub fn subtree(&self, id: &NodeId) -> Result<Vec<NodeId>, GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        let mut order = Vec::new();
        let mut stack = vec![(id.clone(), false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current.clone(), true));
            if let Some(keys) = self.children.get(&current) {
                stack.extend(keys.values().rev().map(|child| (child.clone(), false)));
            }
        }
        Ok(order)
    }

    /// Remove a node and its whole subtree, including bound snippets
    pub fn remove(&mut self, id: &NodeId) -> Result<Vec<NodeId>, GraphError> {
        let order = self.subtree(id)?;
        for current in &order {
            let Some(node) = self.nodes.remove(current) else {
                continue;
            };
            match &node.parent_id {
                Some(parent) => {
                    if let Some(keys) = self.children.get_mut(parent) {
                        if keys.get(&node.key) == Some(current) {
                            keys.remove(&node.key);
                        }
                        if keys.is_empty() {
                            self.children.remove(parent);
                        }
                    }
                }
                None => {
                    self.roots.remove(current);
                }
            }
            self.children.remove(current);
            if let Some(snippet_id) = self.snippet_by_node.remove(current) {
                self.drop_snippet(&snippet_id);
            }
            self.removed_nodes.insert(current.clone());
        }
        Ok(order)
    }

    /// Work out the snippet a put would store, or `None` if nothing changes
    pub fn prepare_snippet(&self, new: &NewSnippet) -> Result<Option<Snippet>, GraphError> {
        if !self.nodes.contains_key(&new.node_id) {
            return Err(GraphError::SnippetOwnerNotFound {
                snippet_id: new.snippet_id.clone(),
                node_id: new.node_id.clone(),
            });
        }
        if let Some(bound) = self.snippet_by_node.get(&new.node_id) {
            if *bound != new.snippet_id {
                return Err(GraphError::Conflict(format!(
                    "node {} already owns snippet {bound}",
                    new.node_id
                )));
            }
        }
        match self.snippets.get(&new.snippet_id) {
            Some(existing) if existing.node_id != new.node_id => Err(GraphError::Conflict(format!(
                "snippet {} is bound to node {}",
                new.snippet_id, existing.node_id
            ))),
            Some(existing) if !existing.differs_from(new) => Ok(None),
            Some(existing) => Ok(Some(Snippet::from_new(new.clone(), existing.version + 1))),
            None => {
                let retired = self.retired_version(&new.snippet_id).unwrap_or(0);
                Ok(Some(Snippet::from_new(new.clone(), retired + 1)))
            }
        }
    }

    /// Store a fully formed snippet and mark it for the next checkpoint
    pub fn apply_snippet(&mut self, snippet: Snippet) -> Result<(), GraphError> {
        self.bind_snippet(snippet.clone())?;
        self.removed_snippets.remove(&snippet.snippet_id);
        self.dirty_snippets.insert(snippet.snippet_id);
        Ok(())
    }

    pub fn put_snippet(&mut self, new: NewSnippet) -> Result<Option<&Snippet>, GraphError> {
        let Some(snippet) = self.prepare_snippet(&new)? else {
            return Ok(None);
        };
        self.apply_snippet(snippet)?;
        Ok(self.snippets.get(&new.snippet_id))
    }

    /// Bind a loaded snippet to its node without dirty bookkeeping
    pub fn bind_snippet(&mut self, snippet: Snippet) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&snippet.node_id) {
            return Err(GraphError::SnippetOwnerNotFound {
                snippet_id: snippet.snippet_id,
                node_id: snippet.node_id,
            });
        }
        if let Some(bound) = self.snippet_by_node.get(&snippet.node_id) {
            if *bound != snippet.snippet_id {
                return Err(GraphError::Conflict(format!(
                    "node {} already owns snippet {bound}",
                    snippet.node_id
                )));
            }
        }
        if let Some(previous) = self.snippets.get(&snippet.snippet_id) {
            if previous.node_id != snippet.node_id {
                self.snippet_by_node.remove(&previous.node_id);
            }
        }
        self.snippet_by_node
            .insert(snippet.node_id.clone(), snippet.snippet_id.clone());
        self.snippets.insert(snippet.snippet_id.clone(), snippet);
        Ok(())
    }

    fn drop_snippet(&mut self, snippet_id: &str) -> Option<Snippet> {
        let snippet = self.snippets.remove(snippet_id)?;
        self.dirty_snippets.remove(snippet_id);
        self.removed_snippets.insert(snippet_id.to_string());
        self.retire_snippet(snippet_id, snippet.version);
        Some(snippet)
    }

    /// Record that `snippet_id` once reached `version`
    pub fn retire_snippet(&mut self, snippet_id: &str, version: u64) {
        let retired = self
            .retired_versions
            .entry(snippet_id.to_string())
            .or_default();
        *retired = (*retired).max(version);
    }

    pub fn retired_version(&self, snippet_id: &str) -> Option<u64> {
        self.retired_versions.get(snippet_id).copied()
    }

    /// Whether anything changed since the last [`Graph::mark_clean`]
    pub fn is_dirty(&self) -> bool {
        !self.removed_nodes.is_empty()
            || !self.removed_snippets.is_empty()
            || !self.dirty_snippets.is_empty()
            || self.nodes.values().any(|node| node.dirty)
    }

    pub fn dirty_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|node| node.dirty)
    }

    pub fn dirty_snippets(&self) -> impl Iterator<Item = &Snippet> {
        self.dirty_snippets
            .iter()
            .filter_map(|snippet_id| self.snippets.get(snippet_id))
    }

    /// Pending removals, left in place until [`Graph::mark_clean`]
    pub fn removed(&self) -> Removed {
        Removed {
            nodes: self.removed_nodes.iter().cloned().collect(),
            snippets: self
                .removed_snippets
                .iter()
                .map(|snippet_id| {
                    let version = self.retired_version(snippet_id).unwrap_or(0);
                    (snippet_id.clone(), version)
                })
                .collect(),
        }
    }

    /// Forget all change tracking after a successful checkpoint
    pub fn mark_clean(&mut self) {
        for node in self.nodes.values_mut() {
            node.dirty = false;
        }
        self.removed_nodes.clear();
        self.removed_snippets.clear();
        self.dirty_snippets.clear();
    }
}

fn check_key(key: &str) -> Result<(), GraphError> {
    if key.is_empty() || key.contains(PATH_SEPARATOR) {
        return Err(GraphError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Split a dotted path into validated keys
pub fn split_path(path: &str) -> Result<Vec<&str>, GraphError> {
    let keys: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if keys.iter().any(|key| key.is_empty()) {
        return Err(GraphError::InvalidPath(path.to_string()));
    }
    Ok(keys)
}

// Structural equality: content and hierarchy, not change tracking.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.snippets == other.snippets
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
