//! The poll loop that drives fetch, encode and send once per tick.
//!
//! Each tick runs a short-lived pipeline: the fetch runs as its own task and
//! hands its result over a oneshot channel; the send task waits on a second
//! oneshot for the encoded payload. A failure at any stage is logged and ends
//! the tick; the loop itself never stops on a pipeline error.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::encoder::LineEncoder;
use crate::error::{FetchError, SendError, Severity};
use crate::fetcher::HealthSource;
use crate::sink::MetricWriter;

/// What happened during one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The payload was written to the collector.
    Sent { lines: usize },
    /// The document encoded to nothing, so nothing was sent.
    Empty,
    /// The fetch failed; encode and send were skipped.
    FetchFailed(FetchError),
    /// The payload could not be delivered.
    SendFailed(SendError),
    /// A stage task ended without handing over its result.
    Aborted(&'static str),
}

impl TickOutcome {
    /// Whether the tick delivered metrics.
    pub fn is_sent(&self) -> bool {
        matches!(self, TickOutcome::Sent { .. })
    }
}

/// Repeating fetch → encode → send pipeline.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use esmetrics::{HealthFetcher, LineEncoder, MetricSink, PollLoop};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = HealthFetcher::builder()
///         .url("http://localhost:9200/_cluster/health")
///         .build()?;
///     let sink = MetricSink::new("localhost:2003", Duration::from_secs(5));
///
///     let poller = PollLoop::new(
///         Arc::new(fetcher),
///         Arc::new(sink),
///         LineEncoder::new("elasticsearch.cluster"),
///         Duration::from_secs(20),
///     );
///
///     let handle = poller.start();
///     tokio::signal::ctrl_c().await?;
///     handle.stop();
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct PollLoop<S, W> {
    source: Arc<S>,
    writer: Arc<W>,
    encoder: LineEncoder,
    interval: Duration,
}

impl<S, W> PollLoop<S, W>
where
    S: HealthSource + 'static,
    W: MetricWriter + 'static,
{
    /// Create a loop that polls `source` and forwards to `writer` every `interval`.
    pub fn new(source: Arc<S>, writer: Arc<W>, encoder: LineEncoder, interval: Duration) -> Self {
        Self {
            source,
            writer,
            encoder,
            interval,
        }
    }

    /// The sleep between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one complete pipeline and report how it ended.
    pub async fn tick(&self) -> TickOutcome {
        let (doc_tx, doc_rx) = oneshot::channel();
        let source = self.source.clone();
        tokio::spawn(async move {
            let _ = doc_tx.send(source.fetch().await);
        });

        let doc = match doc_rx.await {
            Ok(Ok(doc)) => doc,
            Ok(Err(e)) => {
                match e.severity() {
                    Severity::Error => error!(url = self.source.endpoint(), "{}", e),
                    Severity::Warning => warn!(url = self.source.endpoint(), "{}", e),
                }
                return TickOutcome::FetchFailed(e);
            }
            Err(_) => {
                error!("Fetch task ended without a result");
                return TickOutcome::Aborted("fetch");
            }
        };

        let (payload_tx, payload_rx) = oneshot::channel::<String>();
        let writer = self.writer.clone();
        let send_task = tokio::spawn(async move {
            match payload_rx.await {
                Ok(payload) => Some(writer.send(&payload).await),
                Err(_) => None,
            }
        });

        let payload = self.encoder.encode(&doc, SystemTime::now());
        if payload.is_empty() {
            debug!("Health document produced no metrics");
            return TickOutcome::Empty;
        }

        let lines = payload.lines().count();
        if payload_tx.send(payload).is_err() {
            return TickOutcome::Aborted("send");
        }

        match send_task.await {
            Ok(Some(Ok(()))) => {
                debug!("Sent {} metrics to {}", lines, self.writer.target());
                TickOutcome::Sent { lines }
            }
            Ok(Some(Err(e))) => {
                warn!("{}", e);
                TickOutcome::SendFailed(e)
            }
            Ok(None) | Err(_) => {
                error!("Send task ended without a result");
                TickOutcome::Aborted("send")
            }
        }
    }

    /// Tick, sleep, repeat. Never returns.
    pub async fn run(self) {
        info!(
            "Polling {} every {:?}, forwarding to {}",
            self.source.endpoint(),
            self.interval,
            self.writer.target()
        );

        loop {
            let outcome = self.tick().await;
            debug!("Tick finished: {:?}", outcome);
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Start [`run`](Self::run) on a background task.
    ///
    /// Returns a handle that stops the loop when `stop()` is called or the
    /// handle is dropped. A tick in flight at that moment is abandoned.
    pub fn start(self) -> PollHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = self.run() => {}
                _ = stop_rx.changed() => {}
            }
            debug!("Poll loop stopped");
        });

        PollHandle { stop_tx, task }
    }
}

/// Handle for a running poll loop.
///
/// Drop this handle to stop polling, or call `stop()` explicitly.
#[derive(Debug)]
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signal the loop to stop, abandoning any tick in flight.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.stop_tx.send(true);
        self.task
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::HealthDocument;

    #[derive(Debug)]
    struct StubSource {
        doc: Option<Value>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn returning(doc: Value) -> Arc<Self> {
            Arc::new(Self {
                doc: Some(doc),
                calls: AtomicUsize::new(0),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                doc: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthSource for StubSource {
        async fn fetch(&self) -> Result<HealthDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.doc.clone().ok_or_else(|| FetchError::ConnectFailed {
                detail: "connection refused".to_string(),
            })
        }

        fn endpoint(&self) -> &str {
            "stub://health"
        }
    }

    #[derive(Debug, Default)]
    struct RecordingWriter {
        fail: bool,
        attempts: AtomicUsize,
        payloads: Mutex<Vec<String>>,
    }

    impl RecordingWriter {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Default::default()
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn payloads(&self) -> Vec<String> {
            self.payloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricWriter for RecordingWriter {
        async fn send(&self, payload: &str) -> Result<(), SendError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SendError::ConnectFailed {
                    addr: "stub:2003".to_string(),
                    detail: "unreachable".to_string(),
                });
            }
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn target(&self) -> &str {
            "stub:2003"
        }
    }

    fn poller<S, W>(source: Arc<S>, writer: Arc<W>) -> PollLoop<S, W>
    where
        S: HealthSource + 'static,
        W: MetricWriter + 'static,
    {
        PollLoop::new(
            source,
            writer,
            LineEncoder::new("ns"),
            Duration::from_secs(20),
        )
    }

    #[tokio::test]
    async fn test_tick_sends_encoded_document() {
        let source = StubSource::returning(json!({"status": "yellow", "number_of_nodes": 3}));
        let writer = Arc::new(RecordingWriter::default());
        let poller = poller(source.clone(), writer.clone());

        let outcome = poller.tick().await;
        assert!(matches!(outcome, TickOutcome::Sent { lines: 2 }));

        let payloads = writer.payloads();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].contains("ns.number_of_nodes 3 "));
        assert!(payloads[0].contains("ns.status 1 "));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_send() {
        let source = StubSource::refusing();
        let writer = Arc::new(RecordingWriter::default());
        let poller = poller(source.clone(), writer.clone());

        let outcome = poller.tick().await;
        assert!(matches!(
            outcome,
            TickOutcome::FetchFailed(FetchError::ConnectFailed { .. })
        ));
        assert_eq!(source.calls(), 1);
        assert_eq!(writer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_non_object_document_sends_nothing() {
        let source = StubSource::returning(json!([1, 2, 3]));
        let writer = Arc::new(RecordingWriter::default());
        let poller = poller(source, writer.clone());

        assert!(matches!(poller.tick().await, TickOutcome::Empty));
        assert_eq!(writer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_later_ticks() {
        let source = StubSource::returning(json!({"status": "green"}));
        let writer = RecordingWriter::failing();
        let poller = poller(source.clone(), writer.clone());

        for _ in 0..3 {
            let outcome = poller.tick().await;
            assert!(matches!(outcome, TickOutcome::SendFailed(_)));
        }
        assert_eq!(source.calls(), 3);
        assert_eq!(writer.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_on_interval() {
        let source = StubSource::returning(json!({"status": "green"}));
        let writer = Arc::new(RecordingWriter::default());
        let handle = poller(source.clone(), writer.clone()).start();

        // Ticks at 0s, 20s and 40s.
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(writer.payloads().len(), 3);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_never_returns() {
        let source = StubSource::returning(json!({"status": "green"}));
        let writer = RecordingWriter::failing();
        let poller = poller(source.clone(), writer.clone());

        let result = tokio::time::timeout(Duration::from_secs(50), poller.run()).await;
        assert!(result.is_err());
        assert_eq!(source.calls(), 3);
        assert_eq!(writer.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_fetch_failures() {
        let source = StubSource::refusing();
        let writer = Arc::new(RecordingWriter::default());
        let handle = poller(source.clone(), writer.clone()).start();

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(writer.attempts(), 0);
        assert!(!handle.is_finished());

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_loop() {
        let source = StubSource::returning(json!({"status": "green"}));
        let writer = Arc::new(RecordingWriter::default());
        let handle = poller(source.clone(), writer).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        drop(handle);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_outcome_is_sent() {
        assert!(TickOutcome::Sent { lines: 1 }.is_sent());
        assert!(!TickOutcome::Empty.is_sent());
        assert!(!TickOutcome::Aborted("fetch").is_sent());
    }
}
