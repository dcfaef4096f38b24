// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fxd-storage: durable fxd stores
//!
//! A store is a SQLite snapshot plus a write-ahead log of everything applied
//! since. This crate provides:
//! - The binary WAL with checksummed records and torn-tail recovery
//! - The snapshot store and the path reconstructor used at load
//! - The `Store` engine with its mutation API and checkpoints
//! - Signal streams replayable from any sequence
//! - A tokio checkpoint scheduler, configuration and logging setup

pub mod config;
mod error;
mod lock;
pub mod logging;
pub mod reconstruct;
mod recovery;
pub mod scheduler;
mod signals;
pub mod snapshot;
mod store;
pub mod wal;

pub use config::{ConfigError, LogConfig, StoreConfig};
pub use error::StoreError;
pub use lock::StoreLock;
pub use recovery::RecoveryNote;
pub use scheduler::{CheckpointScheduler, SchedulerError, SchedulerReport};
pub use signals::{SignalReceiver, SignalSender, Subscription};
pub use snapshot::{CheckpointSummary, SnapshotError};
pub use store::{
    CheckpointReport, CompactionResult, MutationEvent, Store, StoreOptions, StorePaths, StoreStats,
};
pub use wal::{Opcode, WalValidation};
