// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable stream events

use crate::checksum;
use crate::codec;
use crate::value::Value;

/// An immutable event on a named stream
///
/// `sequence` is the WAL sequence the signal was appended under, so it is
/// globally monotonic across streams and usable as a resume point.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub stream_id: String,
    pub sequence: u64,
    pub payload: Value,
    pub timestamp_micros: u64,
}

impl Signal {
    pub fn checksum(&self) -> u64 {
        checksum::signal_checksum(
            &self.stream_id,
            &codec::encode(&self.payload),
            self.timestamp_micros,
        )
    }
}
