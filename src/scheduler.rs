//! Periodic batching of log records.
//!
//! Producers push records into an unbounded FIFO channel. A single worker task
//! owns the receiving end and is the only place a flush ever runs, so at most
//! one batch is in flight and every record is drained exactly once.
//!
//! ```text
//!  emit() ──try_send──► queue ──► worker ──► build_card ──► WebhookPoster
//!     │                             ▲
//!     └── len >= limit ── notify ───┘   (or period elapsed since last flush)
//! ```
//!
//! The period is re-armed after each flush completes. On shutdown the worker
//! stops waiting, drains everything left in chunks of the batch size limit and
//! then releases the transport if the sink owns it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace};

use crate::card::{CardOptions, build_card};
use crate::error::{BatchFailure, RecordFailure, SendError};
use crate::format::{FormatProvider, render_message};
use crate::transport::WebhookPoster;
use crate::types::LogRecord;

/// Host hook receiving every aggregate batch failure.
pub type FailureHook = Arc<dyn Fn(&BatchFailure) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Nothing queued.
    Idle = 0,
    /// Records queued, below the size threshold.
    Accumulating = 1,
    /// A batch is being posted.
    Flushing = 2,
    /// Shut down; no more records are accepted.
    Stopped = 3,
}

impl SchedulerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Accumulating,
            2 => Self::Flushing,
            _ => Self::Stopped,
        }
    }
}

/// Outcome of one flushed batch.
#[derive(Debug)]
pub struct FlushReport {
    pub attempted: usize,
    pub failure: Option<BatchFailure>,
}

impl FlushReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failure.as_ref().map_or(0, BatchFailure::failed)
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub batch_size_limit: usize,
    pub period: Duration,
    pub card: CardOptions,
}

struct Shared {
    state: AtomicU8,
    size_reached: Notify,
    batch_size_limit: usize,
}

impl Shared {
    fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn mark_accumulating(&self) {
        let _ = self.state.compare_exchange(
            SchedulerState::Idle as u8,
            SchedulerState::Accumulating as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Producer-side half of the scheduler.
pub(crate) struct Scheduler {
    tx: Sender<LogRecord>,
    /// Second consumer, only read once the worker has been aborted.
    leftovers: Receiver<LogRecord>,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    format_provider: Arc<dyn FormatProvider>,
    on_failure: Option<FailureHook>,
}

impl Scheduler {
    /// Creates the scheduler and the worker that must be spawned to drive it.
    pub(crate) fn new(
        config: SchedulerConfig,
        poster: WebhookPoster,
        on_failure: Option<FailureHook>,
    ) -> (Self, Worker) {
        let (tx, rx) = async_channel::unbounded();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(SchedulerState::Idle as u8),
            size_reached: Notify::new(),
            batch_size_limit: config.batch_size_limit.max(1),
        });
        let scheduler = Self {
            tx,
            leftovers: rx.clone(),
            shared: Arc::clone(&shared),
            shutdown,
            format_provider: Arc::clone(&config.card.format_provider),
            on_failure: on_failure.clone(),
        };
        let worker = Worker {
            rx,
            shared,
            shutdown: shutdown_rx,
            period: config.period,
            card: config.card,
            poster,
            on_failure,
        };
        (scheduler, worker)
    }

    /// Queues a record without blocking. Returns `false` once the scheduler is stopped.
    pub(crate) fn enqueue(&self, record: LogRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Closed(_) | TrySendError::Full(_)) => return false,
        }
        self.shared.mark_accumulating();
        if self.tx.len() >= self.shared.batch_size_limit {
            self.shared.size_reached.notify_one();
        }
        true
    }

    pub(crate) fn pending(&self) -> usize {
        self.tx.len()
    }

    pub(crate) fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Stops intake and asks the worker to drain what is left.
    pub(crate) fn shutdown(&self) {
        self.tx.close();
        let _ = self.shutdown.send(true);
    }

    /// Reports every record still queued after the worker was stopped before
    /// finishing its drain. Returns how many were abandoned.
    pub(crate) fn abandon_pending(&self, timeout: Duration) -> usize {
        self.shared.set_state(SchedulerState::Stopped);
        let mut failures = Vec::new();
        while let Ok(record) = self.leftovers.try_recv() {
            failures.push(RecordFailure {
                position: failures.len(),
                level: record.level,
                message: render_message(&record, self.format_provider.as_ref()),
                error: SendError::ShutdownTimeout { timeout },
            });
        }
        let abandoned = failures.len();
        if abandoned > 0 {
            report_failure(
                &BatchFailure {
                    attempted: abandoned,
                    failures,
                },
                self.on_failure.as_ref(),
            );
        }
        abandoned
    }
}

pub(crate) struct Worker {
    rx: Receiver<LogRecord>,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    period: Duration,
    card: CardOptions,
    poster: WebhookPoster,
    on_failure: Option<FailureHook>,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        debug!(
            batch_size_limit = self.shared.batch_size_limit,
            period_ms = self.period.as_millis(),
            "flush worker started"
        );

        'cycle: loop {
            let deadline = Instant::now() + self.period;
            let trigger = loop {
                tokio::select! {
                    biased;
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            break 'cycle;
                        }
                    }
                    () = self.shared.size_reached.notified() => {
                        // a permit stored while a flush was running may be stale
                        if self.rx.len() >= self.shared.batch_size_limit {
                            break "size";
                        }
                        trace!(pending = self.rx.len(), "size notification below limit");
                    }
                    () = sleep_until(deadline) => break "timer",
                }
            };

            if self.rx.is_empty() {
                trace!(trigger, "nothing to flush");
                self.settle();
                continue;
            }
            self.flush_next(trigger).await;
        }

        self.drain().await;
        self.poster.handle().release();
        self.shared.set_state(SchedulerState::Stopped);
        debug!("flush worker stopped");
    }

    /// Flushes one batch of at most `batch_size_limit` records.
    async fn flush_next(&self, trigger: &'static str) -> FlushReport {
        self.shared.set_state(SchedulerState::Flushing);
        let batch = self.take_batch();
        debug!(trigger, batch_size = batch.len(), "flushing batch");
        let report = self.send_batch(batch).await;
        self.report(&report);
        self.settle();
        if self.rx.len() >= self.shared.batch_size_limit {
            self.shared.size_reached.notify_one();
        }
        report
    }

    /// Final synchronous drain, chunked by the batch size limit.
    async fn drain(&self) {
        let remaining = self.rx.len();
        if remaining == 0 {
            return;
        }
        info!(remaining, "draining queued records before shutdown");
        let (mut sent, mut failed) = (0, 0);
        while !self.rx.is_empty() {
            let report = self.flush_next("shutdown").await;
            sent += report.succeeded();
            failed += report.attempted - report.succeeded();
        }
        info!(sent, failed, "shutdown drain finished");
    }

    fn take_batch(&self) -> Vec<LogRecord> {
        let mut batch = Vec::with_capacity(self.shared.batch_size_limit.min(self.rx.len()));
        while batch.len() < self.shared.batch_size_limit {
            match self.rx.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }
        batch
    }

    /// Posts every record in order; a failed post never stops the rest.
    async fn send_batch(&self, batch: Vec<LogRecord>) -> FlushReport {
        let attempted = batch.len();
        let mut failures = Vec::new();
        for (position, record) in batch.into_iter().enumerate() {
            let card = build_card(&record, &self.card);
            if let Err(error) = self.poster.send(&card).await {
                failures.push(RecordFailure {
                    position,
                    level: record.level,
                    message: render_message(&record, self.card.format_provider.as_ref()),
                    error,
                });
            }
        }

        FlushReport {
            attempted,
            failure: (!failures.is_empty()).then_some(BatchFailure {
                attempted,
                failures,
            }),
        }
    }

    fn report(&self, report: &FlushReport) {
        match report.failure.as_ref() {
            None => debug!(sent = report.attempted, "batch flushed"),
            Some(failure) => report_failure(failure, self.on_failure.as_ref()),
        }
    }

    fn settle(&self) {
        self.shared.set_state(SchedulerState::Idle);
        if !self.rx.is_empty() {
            self.shared.mark_accumulating();
        }
    }
}

/// Self-log of an aggregate failure, then the host hook.
fn report_failure(failure: &BatchFailure, hook: Option<&FailureHook>) {
    error!(
        attempted = failure.attempted,
        failed = failure.failed(),
        error = %failure,
        "failed to post log records to webhook"
    );
    if let Some(hook) = hook {
        hook(failure);
    }
}
