//! Event-driven metrics collection.
//!
//! Hot paths call [`record_metric`], which pushes onto an unbounded channel
//! and never blocks. A dedicated aggregator thread folds events into atomic
//! counters and logs a summary every `report_interval_secs`.

use anyhow::Result;
use crossbeam_channel::{self, select, Receiver, Sender};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::config::TelemetryConfig;

/// Global metrics event sender
static METRICS_SENDER: OnceCell<Sender<MetricsEvent>> = OnceCell::new();

/// Metrics events for fire-and-forget recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsEvent {
    // ========== Connection lifecycle ==========
    /// Admission callback accepted a peer
    ClientAccepted,

    /// Admission callback rejected a peer
    ClientRejected,

    /// A server-side connection was torn down
    ClientDisconnected,

    // ========== Data plane ==========
    MessageReceived { bytes: usize },

    MessageSent { bytes: usize },

    /// Send returned an error or a short count
    SendFailed,

    /// Receive error that ended a connection
    ReceiveFailed,

    // ========== Loop threads ==========
    LoopStarted,

    LoopStopped,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub clients_accepted: u64,
    pub clients_rejected: u64,
    pub clients_disconnected: u64,
    pub clients_active: i64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub receive_failures: u64,
    pub loops_active: i64,
}

/// Counters updated by the aggregator thread.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    clients_accepted: AtomicU64,
    clients_rejected: AtomicU64,
    clients_disconnected: AtomicU64,
    clients_active: AtomicI64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    receive_failures: AtomicU64,
    loops_active: AtomicI64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters.
    pub fn process_event(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::ClientAccepted => {
                self.clients_accepted.fetch_add(1, Ordering::Relaxed);
                self.clients_active.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::ClientRejected => {
                self.clients_rejected.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::ClientDisconnected => {
                self.clients_disconnected.fetch_add(1, Ordering::Relaxed);
                self.clients_active.fetch_sub(1, Ordering::Relaxed);
            }
            MetricsEvent::MessageReceived { bytes } => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                self.bytes_received
                    .fetch_add(bytes as u64, Ordering::Relaxed);
            }
            MetricsEvent::MessageSent { bytes } => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            MetricsEvent::SendFailed => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::ReceiveFailed => {
                self.receive_failures.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::LoopStarted => {
                self.loops_active.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::LoopStopped => {
                self.loops_active.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            clients_rejected: self.clients_rejected.load(Ordering::Relaxed),
            clients_disconnected: self.clients_disconnected.load(Ordering::Relaxed),
            clients_active: self.clients_active.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
            loops_active: self.loops_active.load(Ordering::Relaxed),
        }
    }
}

fn log_snapshot(service: &str, snapshot: &MetricsSnapshot) {
    tracing::info!(
        service = %service,
        clients_active = snapshot.clients_active,
        clients_accepted = snapshot.clients_accepted,
        clients_rejected = snapshot.clients_rejected,
        messages_received = snapshot.messages_received,
        bytes_received = snapshot.bytes_received,
        messages_sent = snapshot.messages_sent,
        bytes_sent = snapshot.bytes_sent,
        send_failures = snapshot.send_failures,
        receive_failures = snapshot.receive_failures,
        "Metrics summary"
    );
}

/// Handle to the metrics thread for graceful shutdown
pub struct MetricsHandle {
    thread: Option<JoinHandle<()>>,
    shutdown_tx: Option<Sender<()>>,
    collector: Arc<MetricsCollector>,
}

impl MetricsHandle {
    /// Create a disabled handle (when metrics are disabled)
    pub fn disabled() -> Self {
        Self {
            thread: None,
            shutdown_tx: None,
            collector: Arc::new(MetricsCollector::new()),
        }
    }

    /// Counters as of the last processed event.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }

    /// Stop the aggregator after it drains pending events.
    pub fn shutdown(mut self) -> MetricsSnapshot {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                tracing::error!(error = ?e, "Metrics thread panicked during shutdown");
            }
        }
        self.collector.snapshot()
    }
}

/// Record a metrics event (fire-and-forget)
///
/// A no-op until [`start_metrics_task`] has run.
#[inline]
pub fn record_metric(event: MetricsEvent) {
    if let Some(sender) = METRICS_SENDER.get() {
        let _ = sender.send(event);
    }
}

/// Start the metrics aggregator thread.
///
/// Can be started once per process.
pub fn start_metrics_task(config: &TelemetryConfig) -> Result<MetricsHandle> {
    let (tx, rx) = crossbeam_channel::unbounded::<MetricsEvent>();

    METRICS_SENDER
        .set(tx)
        .map_err(|_| anyhow::anyhow!("Metrics sender already initialized"))?;

    let collector = Arc::new(MetricsCollector::new());
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let interval = (config.report_interval_secs > 0)
        .then(|| Duration::from_secs(config.report_interval_secs));
    let service = config.service_name.clone();

    let thread = thread::Builder::new().name("srtnet-metrics".to_string()).spawn({
        let collector = Arc::clone(&collector);
        move || run_aggregator(&service, &collector, &rx, &shutdown_rx, interval)
    })?;

    Ok(MetricsHandle {
        thread: Some(thread),
        shutdown_tx: Some(shutdown_tx),
        collector,
    })
}

fn run_aggregator(
    service: &str,
    collector: &MetricsCollector,
    events: &Receiver<MetricsEvent>,
    shutdown: &Receiver<()>,
    interval: Option<Duration>,
) {
    tracing::info!("Metrics collection thread started");
    let ticker = match interval {
        Some(every) => crossbeam_channel::tick(every),
        None => crossbeam_channel::never(),
    };

    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(events) -> event => match event {
                Ok(event) => collector.process_event(event),
                Err(_) => break,
            },
            recv(ticker) -> _ => log_snapshot(service, &collector.snapshot()),
        }
    }

    while let Ok(event) = events.try_recv() {
        collector.process_event(event);
    }
    log_snapshot(service, &collector.snapshot());
    tracing::info!("Metrics thread stopped");
}
