use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::EmitError;
use crate::logging::{LogBuffer, LogEvent};

const SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget destination for log events.
///
/// `emit` must return promptly and must not fail: delivery problems are
/// the emitter's to absorb.
#[async_trait]
pub trait LogEmitter: Send + Sync {
    fn emit(&self, event: LogEvent);

    /// Settle every event emitted so far, waiting at most `timeout`.
    /// Events still undelivered afterwards are kept locally.
    async fn flush(&self, _timeout: Duration) {}
}

/// Emitter that only keeps events in the local buffer
pub struct BufferedEmitter {
    buffer: Arc<LogBuffer>,
}

impl BufferedEmitter {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl LogEmitter for BufferedEmitter {
    fn emit(&self, event: LogEvent) {
        self.buffer.push(event);
    }
}

/// POSTs each event as JSON to a collector. Events that cannot be
/// delivered land in the fallback buffer instead, including those whose
/// delivery task is cancelled before the collector answers.
pub struct HttpLogEmitter {
    client: reqwest::Client,
    endpoint: Arc<str>,
    token: Option<Arc<str>>,
    fallback: Arc<LogBuffer>,
    in_flight: Mutex<JoinSet<()>>,
}

impl HttpLogEmitter {
    pub fn new(
        endpoint: &str,
        token: Option<&str>,
        fallback: Arc<LogBuffer>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(SINK_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: Arc::from(endpoint),
            token: token.map(Arc::from),
            fallback,
            in_flight: Mutex::new(JoinSet::new()),
        })
    }

    /// Number of deliveries not yet settled
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }
}

#[async_trait]
impl LogEmitter for HttpLogEmitter {
    fn emit(&self, event: LogEvent) {
        // Without a runtime there is nothing to send on; keep the event locally
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.fallback.push(event);
            return;
        };

        let client = self.client.clone();
        let endpoint = Arc::clone(&self.endpoint);
        let token = self.token.clone();
        let mut pending = PendingEvent::new(event, Arc::clone(&self.fallback));

        let mut tasks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished deliveries so a long-lived emitter does not accumulate them
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                let Some(event) = pending.event.as_ref() else {
                    return;
                };
                let result = deliver(&client, &endpoint, token.as_deref(), event).await;
                match result {
                    Ok(()) => pending.delivered(),
                    Err(e) => debug!(error = %e, "log sink unavailable, buffering event"),
                }
            },
            &runtime,
        );
    }

    async fn flush(&self, timeout: Duration) {
        let mut tasks = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                pending = tasks.len(),
                "log sink too slow at shutdown, buffering undelivered events"
            );
            // Cancelled deliveries hand their events to the fallback buffer
            tasks.shutdown().await;
        }
    }
}

/// An event whose delivery has not been confirmed. Dropping it before
/// [`PendingEvent::delivered`] moves the event into the fallback buffer,
/// whether the send failed or its task was cancelled.
struct PendingEvent {
    event: Option<LogEvent>,
    fallback: Arc<LogBuffer>,
}

impl PendingEvent {
    fn new(event: LogEvent, fallback: Arc<LogBuffer>) -> Self {
        Self {
            event: Some(event),
            fallback,
        }
    }

    fn delivered(&mut self) {
        self.event = None;
    }
}

impl Drop for PendingEvent {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            self.fallback.push(event);
        }
    }
}

async fn deliver(
    client: &reqwest::Client,
    endpoint: &str,
    token: Option<&str>,
    event: &LogEvent,
) -> Result<(), EmitError> {
    let mut request = client.post(endpoint).json(event);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(EmitError::Status(response.status()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, Stack};

    fn event() -> LogEvent {
        LogEvent::new(Stack::Frontend, Level::Info, "api", "hello")
    }

    #[test]
    fn test_buffered_emitter_keeps_events() {
        let buffer = Arc::new(LogBuffer::new(10));
        BufferedEmitter::new(buffer.clone()).emit(event());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_http_emitter_without_runtime_buffers() {
        let buffer = Arc::new(LogBuffer::new(10));
        let emitter = HttpLogEmitter::new("http://127.0.0.1:9/logs", None, buffer.clone()).unwrap();

        emitter.emit(event());
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_http_emitter_buffers_on_transport_failure() {
        let buffer = Arc::new(LogBuffer::new(10));
        let emitter = HttpLogEmitter::new("http://127.0.0.1:9/logs", None, buffer.clone()).unwrap();

        emitter.emit(event());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while buffer.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(buffer.entries()[0].message, "hello");
    }

    /// Endpoint whose connections are accepted by the kernel but never answered
    fn silent_endpoint() -> (std::net::TcpListener, String) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/logs", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    #[test]
    fn test_runtime_exit_buffers_unsettled_event() {
        let (_listener, endpoint) = silent_endpoint();
        let buffer = Arc::new(LogBuffer::new(10));
        let emitter = HttpLogEmitter::new(&endpoint, None, buffer.clone()).unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            emitter.emit(event());
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(buffer.is_empty());
        });
        drop(runtime);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.entries()[0].message, "hello");
    }

    #[tokio::test]
    async fn test_flush_buffers_slow_deliveries() {
        let (_listener, endpoint) = silent_endpoint();
        let buffer = Arc::new(LogBuffer::new(10));
        let emitter = HttpLogEmitter::new(&endpoint, None, buffer.clone()).unwrap();

        emitter.emit(event());
        emitter.emit(event());
        assert_eq!(emitter.in_flight(), 2);

        tokio::time::timeout(
            Duration::from_secs(2),
            emitter.flush(Duration::from_millis(200)),
        )
        .await
        .expect("flush exceeded its timeout");

        assert_eq!(buffer.len(), 2);
        assert_eq!(emitter.in_flight(), 0);
    }
}
