// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-Ahead Log (WAL) module
//!
//! Durable, append-only log of graph mutations and signals.
//!
//! ## Architecture
//!
//! ```text
//! Operation → WalRecord → WalWriter → disk (<store>.wal)
//!                                        ↓
//!                              WalReader → replay → Graph / signals
//! ```
//!
//! ## Durability Guarantees
//!
//! - With `sync_writes` every append is followed by `fsync` before returning
//! - Checksums detect bit flips and torn records
//! - Sequences are contiguous; a gap ends the log
//! - Recovery truncates the WAL at the last valid record

pub mod operation;
pub mod reader;
pub mod record;
pub mod writer;

pub use operation::Operation;
pub use reader::{WalCorruption, WalEntry, WalEntryIter, WalReadError, WalReader, WalValidation};
pub use record::{Opcode, WalRecord, MAGIC};
pub use writer::WalWriter;
