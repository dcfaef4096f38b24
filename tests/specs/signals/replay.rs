//! Signal replay specs
//!
//! Verify a subscription replays exactly its own stream, in emission order,
//! no matter where the history lives.

use crate::prelude::*;
use fxd_core::Signal;

/// Emit 100 signals on `s1` with 50 on `s2` woven between them,
/// checkpointing after `checkpoint_at` signals on `s1` when given
fn emit_interleaved(store: &Store, checkpoint_at: Option<usize>) -> Vec<u64> {
    let mut sequences = Vec::new();
    for i in 0..100 {
        if checkpoint_at == Some(i) {
            store.save().unwrap();
        }
        sequences.push(store.emit("s1", i as f64).unwrap());
        if i % 2 == 0 {
            store.emit("s2", format!("other {i}")).unwrap();
        }
    }
    sequences
}

fn drain(store: &Store, stream: &str, from: u64) -> Vec<Signal> {
    let mut subscription = store.subscribe(stream, from).unwrap();
    std::iter::from_fn(|| subscription.try_next())
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn assert_s1(signals: &[Signal], sequences: &[u64]) {
    assert_eq!(signals.len(), 100);
    for (i, signal) in signals.iter().enumerate() {
        assert_eq!(signal.stream_id, "s1");
        assert_eq!(signal.payload, Value::Number(i as f64));
        assert_eq!(signal.sequence, sequences[i]);
    }
}

#[test]
fn replay_yields_own_stream_in_order() {
    let temp = TempStore::new();
    let store = temp.create();
    let sequences = emit_interleaved(&store, None);

    assert_s1(&drain(&store, "s1", 0), &sequences);
    assert_eq!(drain(&store, "s2", 0).len(), 50);
}

#[test]
fn replay_spans_a_checkpoint() {
    let temp = TempStore::new();
    let store = temp.create();
    let sequences = emit_interleaved(&store, Some(40));

    assert_s1(&drain(&store, "s1", 0), &sequences);
}

#[test]
fn replay_survives_reopen() {
    let temp = TempStore::new();
    let store = temp.create();
    let sequences = emit_interleaved(&store, Some(70));
    store.close().unwrap();

    let reopened = temp.open();
    assert_s1(&drain(&reopened, "s1", 0), &sequences);
    assert_eq!(reopened.stats().unwrap().signal_count, 150);
}

#[test]
fn replay_is_repeatable() {
    let temp = TempStore::new();
    let store = temp.create();
    emit_interleaved(&store, Some(25));

    let first = drain(&store, "s1", 0);
    store.save().unwrap();
    similar_asserts::assert_eq!(drain(&store, "s1", 0), first);
}

#[test]
fn resume_from_position_skips_seen_signals() {
    let temp = TempStore::new();
    let store = temp.create();
    let sequences = emit_interleaved(&store, Some(50));

    let mut subscription = store.subscribe("s1", 0).unwrap();
    for _ in 0..30 {
        subscription.try_next().unwrap().unwrap();
    }
    let resume = subscription.position();
    drop(subscription);
    store.close().unwrap();

    let reopened = temp.open();
    let rest = drain(&reopened, "s1", resume);
    assert_eq!(rest.len(), 70);
    assert_eq!(rest[0].payload, Value::Number(30.0));
    assert_eq!(rest[0].sequence, sequences[30]);
}

#[test]
fn unknown_stream_is_empty() {
    let temp = TempStore::new();
    let store = temp.create();
    emit_interleaved(&store, None);
    assert!(drain(&store, "s3", 0).is_empty());
}
