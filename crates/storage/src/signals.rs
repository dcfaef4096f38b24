// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal fan-out and subscriptions
//!
//! A subscription first pages through history (the snapshot's signal table,
//! then the WAL tail) and then switches to live delivery from the bus. The
//! switch point is the WAL sequence captured when the subscription
//! registered, so a signal is never delivered twice or skipped.

use crate::error::StoreError;
use crate::store::Store;
use fxd_core::Signal;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Sender for live signal delivery
pub type SignalSender = mpsc::UnboundedSender<Signal>;
/// Receiver for live signal delivery
pub type SignalReceiver = mpsc::UnboundedReceiver<Signal>;

/// Routes emitted signals to the live subscribers of their stream
#[derive(Default)]
pub(crate) struct SignalBus {
    subscribers: Mutex<Vec<(String, SignalSender)>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stream_id: &str) -> SignalReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.push((stream_id.to_string(), tx));
        rx
    }

    /// Deliver to every live subscriber of the signal's stream, dropping
    /// subscribers whose receiver has gone away
    pub fn publish(&self, signal: &Signal) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|(stream_id, tx)| {
            if tx.is_closed() {
                return false;
            }
            if *stream_id == signal.stream_id {
                return tx.send(signal.clone()).is_ok();
            }
            true
        });
    }

    /// Disconnect every subscriber; their live phase ends
    pub fn close(&self) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.iter().filter(|(_, tx)| !tx.is_closed()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    History,
    Live,
    Done,
}

/// Ordered signals of one stream, from a starting sequence onwards
///
/// Dropping a subscription detaches it; the log and other subscribers are
/// unaffected.
pub struct Subscription {
    store: Store,
    stream_id: String,
    /// Next sequence this subscription may yield
    cursor: u64,
    /// First sequence delivered by the bus rather than from history
    live_from: u64,
    buffer: VecDeque<Signal>,
    phase: Phase,
    live: SignalReceiver,
}

impl Subscription {
    pub(crate) fn new(
        store: Store,
        stream_id: String,
        from_sequence: u64,
        live_from: u64,
        live: SignalReceiver,
    ) -> Self {
        Self {
            store,
            stream_id,
            cursor: from_sequence,
            live_from,
            buffer: VecDeque::new(),
            phase: Phase::History,
            live,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Sequence to resume from in a fresh subscription
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Whether the subscription has ended (store closed or history failed)
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done && self.buffer.is_empty()
    }

    /// Next signal without blocking; `None` when nothing is available yet
    /// or the subscription has ended
    pub fn try_next(&mut self) -> Option<Result<Signal, StoreError>> {
        loop {
            if let Some(next) = self.next_historical() {
                return Some(next);
            }
            if self.phase != Phase::Live {
                return None;
            }
            match self.live.try_recv() {
                Ok(signal) => {
                    if let Some(signal) = self.accept(signal) {
                        return Some(Ok(signal));
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return None,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.phase = Phase::Done;
                    return None;
                }
            }
        }
    }

    /// Next signal, awaiting live delivery; `None` once the store closes
    pub async fn recv(&mut self) -> Option<Result<Signal, StoreError>> {
        loop {
            if let Some(next) = self.next_historical() {
                return Some(next);
            }
            if self.phase != Phase::Live {
                return None;
            }
            match self.live.recv().await {
                Some(signal) => {
                    if let Some(signal) = self.accept(signal) {
                        return Some(Ok(signal));
                    }
                }
                None => {
                    self.phase = Phase::Done;
                    return None;
                }
            }
        }
    }

    /// Buffered or historical signal; `None` once history is exhausted
    fn next_historical(&mut self) -> Option<Result<Signal, StoreError>> {
        loop {
            if let Some(signal) = self.buffer.pop_front() {
                self.cursor = signal.sequence + 1;
                return Some(Ok(signal));
            }
            if self.phase != Phase::History {
                return None;
            }
            if self.cursor >= self.live_from {
                self.phase = Phase::Live;
                return None;
            }
            match self
                .store
                .history_page(&self.stream_id, self.cursor, self.live_from)
            {
                Ok(page) if page.is_empty() => {
                    self.phase = Phase::Live;
                    return None;
                }
                Ok(page) => self.buffer.extend(page),
                Err(e) => {
                    self.phase = Phase::Done;
                    return Some(Err(e));
                }
            }
        }
    }

    fn accept(&mut self, signal: Signal) -> Option<Signal> {
        if signal.sequence < self.cursor {
            return None;
        }
        self.cursor = signal.sequence + 1;
        Some(signal)
    }
}

impl Iterator for Subscription {
    type Item = Result<Signal, StoreError>;

    /// Blocks on live delivery; must not be called from inside an async
    /// runtime, use [`Subscription::recv`] there
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(next) = self.next_historical() {
                return Some(next);
            }
            if self.phase != Phase::Live {
                return None;
            }
            match self.live.blocking_recv() {
                Some(signal) => {
                    if let Some(signal) = self.accept(signal) {
                        return Some(Ok(signal));
                    }
                }
                None => {
                    self.phase = Phase::Done;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
