//! The public entry point: accepts records from producers and owns the flush worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::Result;
use crate::config::SinkOptions;
use crate::error::Error;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerState};
use crate::transport::{HttpTransport, TransportHandle, WebhookPoster};
use crate::types::{Level, LogRecord};

/// Batching Microsoft Teams sink.
///
/// Cheap to clone; every clone feeds the same queue. The worker keeps running
/// until [`TeamsSink::close`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct TeamsSink {
    inner: Arc<Inner>,
}

struct Inner {
    scheduler: Scheduler,
    minimum_level: Level,
    worker: Mutex<Option<JoinHandle<()>>>,
    transport: TransportHandle,
    shutdown_timeout: Duration,
}

impl TeamsSink {
    /// Validates `options` and spawns the flush worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid options, [`Error::Send`] when the
    /// default HTTP transport cannot be built, and [`Error::Runtime`] when
    /// called outside a tokio runtime.
    pub fn start(options: SinkOptions) -> Result<Self> {
        let target = options.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::Runtime)?;

        let transport = match options.transport.clone() {
            Some(supplied) => TransportHandle::borrowed(supplied),
            None => TransportHandle::owned(Arc::new(
                HttpTransport::new(options.http_request_timeout, options.http_connect_timeout)
                    .map_err(|err| Error::Send(err.into()))?,
            )),
        };

        let poster = WebhookPoster::new(target, transport.clone());
        let (scheduler, worker) = Scheduler::new(
            SchedulerConfig {
                batch_size_limit: options.batch_size_limit,
                period: options.period,
                card: options.card_options(),
            },
            poster,
            options.on_batch_failure.clone(),
        );
        let worker = runtime.spawn(worker.run());

        info!(
            batch_size_limit = options.batch_size_limit,
            period_ms = options.period.as_millis(),
            minimum_level = %options.minimum_level,
            ownership = ?transport.ownership(),
            "teams sink started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                minimum_level: options.minimum_level,
                worker: Mutex::new(Some(worker)),
                transport,
                shutdown_timeout: options.shutdown_timeout,
            }),
        })
    }

    /// Queues a record for delivery. Never blocks and never fails.
    ///
    /// Records below the minimum level, and records emitted after
    /// [`close`](Self::close), are dropped.
    pub fn emit(&self, record: LogRecord) {
        if record.level < self.inner.minimum_level {
            return;
        }
        if !self.inner.scheduler.enqueue(record) {
            debug!("sink closed; record dropped");
        }
    }

    #[must_use]
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.inner.minimum_level
    }

    /// Stops intake, waits for the final drain, then releases an owned transport.
    ///
    /// Waits at most the configured shutdown timeout. Calling it again, from
    /// this or any clone, returns once the first call has finished.
    pub async fn close(&self) {
        let mut worker = self.inner.worker.lock().await;
        let Some(mut handle) = worker.take() else {
            return;
        };

        self.inner.scheduler.shutdown();
        match tokio::time::timeout(self.inner.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => debug!("teams sink closed"),
            Ok(Err(err)) => error!(error = %err, "flush worker ended abnormally"),
            Err(_) => {
                handle.abort();
                let abandoned = self
                    .inner
                    .scheduler
                    .abandon_pending(self.inner.shutdown_timeout);
                error!(
                    timeout_ms = self.inner.shutdown_timeout.as_millis(),
                    abandoned,
                    "final drain timed out; remaining records dropped"
                );
            }
        }
        self.inner.transport.release();
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    /// Records queued and not yet taken by a flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.scheduler.pending()
    }
}

impl std::fmt::Debug for TeamsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamsSink")
            .field("minimum_level", &self.inner.minimum_level)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::TeamsSink;
    use crate::config::SinkOptions;
    use crate::error::{ConfigError, Error, SendError, TransportError};
    use crate::scheduler::SchedulerState;
    use crate::scheduler::tests::Recorder;
    use crate::transport::{BoxFuture, Transport, WebhookResponse};
    use crate::types::{Level, LogRecord};
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const HOOK: &str = "https://example.webhook.office.com/webhookb2/abc";

    fn options(recorder: &Arc<Recorder>) -> SinkOptions {
        SinkOptions::new(HOOK)
            .with_batch_size_limit(2)
            .with_period(Duration::from_secs(5))
            .with_transport(recorder.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn second_record_triggers_size_flush() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(options(&recorder)).unwrap();

        sink.emit(LogRecord::new(Level::Information, "first"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(recorder.texts().is_empty());
        assert_eq!(sink.pending(), 1);

        sink.emit(LogRecord::new(Level::Information, "second"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recorder.texts(), vec!["first", "second"]);
        assert_eq!(sink.pending(), 0);
        sink.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_twice_sends_nothing_extra() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(options(&recorder)).unwrap();
        sink.emit(LogRecord::new(Level::Warning, "pending"));

        sink.close().await;
        assert_eq!(recorder.texts(), vec!["pending"]);
        sink.close().await;
        assert_eq!(recorder.texts().len(), 1);
        assert_eq!(sink.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn supplied_transport_is_never_closed() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(options(&recorder)).unwrap();
        sink.close().await;
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emit_after_close_is_ignored() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(options(&recorder)).unwrap();
        sink.close().await;

        sink.emit(LogRecord::new(Level::Error, "late"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(recorder.texts().is_empty());
        assert_eq!(sink.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn records_below_minimum_level_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(
            options(&recorder)
                .with_batch_size_limit(10)
                .with_minimum_level(Level::Warning),
        )
        .unwrap();

        sink.emit(LogRecord::new(Level::Debug, "noise"));
        sink.emit(LogRecord::new(Level::Information, "chatter"));
        sink.emit(LogRecord::new(Level::Error, "signal"));
        assert!(!sink.is_enabled(Level::Information));
        assert_eq!(sink.pending(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(recorder.texts(), vec!["signal"]);
        sink.close().await;
    }

    /// Transport whose posts never complete.
    struct Stalled;

    impl Transport for Stalled {
        fn post_json<'a>(
            &'a self,
            _url: &'a url::Url,
            _body: Vec<u8>,
        ) -> BoxFuture<'a, Result<WebhookResponse, TransportError>> {
            Box::pin(std::future::pending::<Result<WebhookResponse, TransportError>>())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_reports_abandoned_records() {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&failures);
        let sink = TeamsSink::start(
            SinkOptions::new(HOOK)
                .with_batch_size_limit(1)
                .with_shutdown_timeout(Duration::from_secs(1))
                .with_transport(Arc::new(Stalled))
                .on_batch_failure(move |failure| {
                    let errors_match = failure
                        .failures
                        .iter()
                        .all(|f| matches!(f.error, SendError::ShutdownTimeout { .. }));
                    seen.lock()
                        .unwrap()
                        .push((failure.positions(), errors_match));
                }),
        )
        .unwrap();

        sink.emit(LogRecord::new(Level::Error, "stuck"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.emit(LogRecord::new(Level::Error, "queued {N}").with_property("N", 1));
        sink.emit(LogRecord::new(Level::Error, "queued {N}").with_property("N", 2));

        sink.close().await;

        assert_eq!(*failures.lock().unwrap(), vec![(vec![0, 1], true)]);
        assert_eq!(sink.state(), SchedulerState::Stopped);
        assert_eq!(sink.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_title_is_left_out() {
        let recorder = Arc::new(Recorder::default());
        let sink = TeamsSink::start(options(&recorder).with_title("   ")).unwrap();
        sink.emit(LogRecord::new(Level::Information, "untitled"));
        sink.close().await;

        let cards = recorder.cards();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].get("title").is_none());
    }

    #[tokio::test]
    async fn invalid_options_fail_fast() {
        let err = TeamsSink::start(SinkOptions::new("")).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField {
                field: "webhook.url"
            })
        ));
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let recorder = Arc::new(Recorder::default());
        let err = TeamsSink::start(options(&recorder)).unwrap_err();
        assert!(matches!(err, Error::Runtime));
    }
}
