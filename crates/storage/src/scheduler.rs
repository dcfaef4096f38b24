// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background checkpoint scheduler
//!
//! Consumes the store's mutation events on a tokio task. Each event may
//! trigger an interval checkpoint; a periodic tick saves whatever is still
//! pending; shutdown performs a final save. Checkpoints run on the blocking
//! pool since they do file and SQLite I/O.

use crate::error::StoreError;
use crate::store::{CheckpointReport, MutationEvent, Store};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("checkpoint scheduler needs a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("checkpoint scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Totals reported when the scheduler stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub checkpoints: u64,
    pub failures: u64,
    /// Marker sequence of the most recent checkpoint
    pub last_sequence: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Only if the operation interval has been reached
    Interval,
    /// Whatever is pending
    Full,
}

pub struct CheckpointScheduler {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<SchedulerReport>,
}

impl CheckpointScheduler {
    /// Start consuming `store`'s mutation events on the current runtime
    ///
    /// Dropping the scheduler without [`CheckpointScheduler::shutdown`]
    /// still stops the task after a final save.
    pub fn spawn(store: Store) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let events = store.mutation_events()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run(store, events, shutdown_rx));
        Ok(Self {
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Stop the task, waiting for its final checkpoint
    pub async fn shutdown(mut self) -> Result<SchedulerReport, SchedulerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        Ok(self.task.await?)
    }
}

async fn run(
    store: Store,
    mut events: mpsc::UnboundedReceiver<MutationEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> SchedulerReport {
    let mut report = SchedulerReport::default();
    let mut tick = tokio::time::interval(store.config().checkpoint_period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    tick.tick().await;
    let mut pending = false;

    tracing::debug!(
        interval = store.config().checkpoint_interval,
        period = ?store.config().checkpoint_period,
        "checkpoint scheduler started"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!("store closed, checkpoint scheduler stopping");
                    return report;
                };
                tracing::trace!(sequence = event.sequence, kind = event.kind.name(), "mutation");
                pending = !checkpoint(&store, Trigger::Interval, &mut report).await;
            }

            _ = tick.tick() => {
                if pending {
                    pending = !checkpoint(&store, Trigger::Full, &mut report).await;
                }
            }
        }
    }

    if !store.is_closed() {
        checkpoint(&store, Trigger::Full, &mut report).await;
    }
    tracing::debug!(
        checkpoints = report.checkpoints,
        failures = report.failures,
        "checkpoint scheduler stopped"
    );
    report
}

/// Run a checkpoint on the blocking pool; true when nothing is left pending
async fn checkpoint(store: &Store, trigger: Trigger, report: &mut SchedulerReport) -> bool {
    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<Option<CheckpointReport>, StoreError> {
        match trigger {
            Trigger::Interval => store.maybe_checkpoint(),
            Trigger::Full => store.save(),
        }
    })
    .await;

    match result {
        Ok(Ok(Some(done))) => {
            report.checkpoints += 1;
            report.last_sequence = Some(done.sequence);
            true
        }
        Ok(Ok(None)) => trigger == Trigger::Full,
        Ok(Err(StoreError::Closed)) => true,
        Ok(Err(e)) => {
            tracing::error!(?e, ?trigger, "checkpoint failed");
            report.failures += 1;
            false
        }
        Err(e) => {
            tracing::error!(?e, ?trigger, "checkpoint task failed");
            report.failures += 1;
            false
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
