// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node id allocation

use crate::node::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Allocates ids for nodes created without an explicit one
pub trait IdGen: Send + Sync {
    fn next_id(&self) -> NodeId;
}

/// Random v4 UUIDs
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next_id(&self) -> NodeId {
        NodeId(uuid::Uuid::new_v4().to_string())
    }
}

/// `prefix-1`, `prefix-2`, ... shared between clones
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("node")
    }
}

impl IdGen for SequentialIdGen {
    fn next_id(&self) -> NodeId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        NodeId(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
