//! Tests for loop thread lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::*;

#[test]
fn test_thread_carries_its_name() {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let thread = LoopThread::spawn("srtnet-test", move || {
        let _ = tx.send(thread::current().name().map(str::to_string));
    })
    .unwrap();

    assert_eq!(thread.name(), "srtnet-test");
    assert_eq!(rx.recv().unwrap().as_deref(), Some("srtnet-test"));
    assert!(thread.join_within(STOP_TIMEOUT));
}

#[test]
fn test_join_waits_for_finishing_thread() {
    let done = Arc::new(AtomicBool::new(false));
    let thread = LoopThread::spawn("srtnet-test", {
        let done = Arc::clone(&done);
        move || {
            thread::sleep(Duration::from_millis(50));
            done.store(true, Ordering::SeqCst);
        }
    })
    .unwrap();

    assert!(thread.join_within(Duration::from_secs(5)));
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn test_join_gives_up_after_timeout() {
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let thread = LoopThread::spawn("srtnet-stuck", move || {
        let _ = release_rx.recv();
    })
    .unwrap();

    let started = Instant::now();
    assert!(!thread.join_within(Duration::from_millis(100)));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_secs(2));

    // Let the detached thread finish.
    drop(release_tx);
}

#[test]
fn test_panicking_thread_still_counts_as_exited() {
    let thread = LoopThread::spawn("srtnet-panics", || panic!("loop failure")).unwrap();
    assert!(thread.join_within(Duration::from_secs(5)));
}

#[test]
fn test_join_from_own_thread_returns_immediately() {
    let (handoff_tx, handoff_rx) = crossbeam_channel::bounded::<LoopThread>(1);
    let (result_tx, result_rx) = crossbeam_channel::bounded::<(bool, Duration)>(1);

    let thread = LoopThread::spawn("srtnet-self", move || {
        let Ok(me) = handoff_rx.recv() else {
            return;
        };
        let started = Instant::now();
        let joined = me.join_within(Duration::from_secs(5));
        let _ = result_tx.send((joined, started.elapsed()));
    })
    .unwrap();
    handoff_tx.send(thread).unwrap();

    let (joined, elapsed) = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(joined);
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn test_loop_constants() {
    assert_eq!(MAX_POLL_EVENTS, 20);
    assert_eq!(POLL_TIMEOUT, Duration::from_millis(1000));
    assert_eq!(STOP_TIMEOUT, Duration::from_secs(1));
    assert!(POLL_RETRY_DELAY < POLL_TIMEOUT);
    assert!(RECV_BUFFER_SIZE >= srtnet_x::LIVE_MAX_PAYLOAD);
}
