// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fxd-core: the I/O-free half of an fxd store
//!
//! This crate provides:
//! - Typed node values and the self-describing binary codec
//! - xxh3 checksums for nodes, snippets, signals and log records
//! - The in-memory node graph with path addressing and change tracking
//! - Clock and id abstractions for deterministic tests

pub mod checksum;
pub mod clock;
pub mod codec;
pub mod graph;
pub mod id;
pub mod node;
pub mod signal;
pub mod snippet;
pub mod value;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::{CodecError, Decode, Encode};
pub use graph::{Graph, GraphError, NewNode, Removed};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use node::{Node, NodeId, NodeKind};
pub use signal::Signal;
pub use snippet::{NewSnippet, Snippet};
pub use value::{Metadata, Scalar, Value};
