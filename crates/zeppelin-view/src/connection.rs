use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;
use zeppelin_core::sse::{DecodeReport, SseDecoder};

pub const EVENTS_PATH: &str = "/api/events";
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);
const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "◌ connecting...",
            ConnectionStatus::Connected => "● connected",
            ConnectionStatus::Disconnected => "○ disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("stream read failed: {0}")]
    Read(String),
}

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Opens one push stream. Each call is a fresh connection.
pub trait Transport: Send + Sync + 'static {
    fn open(&self) -> BoxFuture<'static, Result<ByteStream, TransportError>>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
}

impl HttpTransport {
    pub fn new(base: &Url) -> Result<Self, TransportError> {
        let url = base
            .join(EVENTS_PATH)
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn open(&self) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
        let request = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream");
        async move {
            let response = request
                .send()
                .await
                .map_err(|err| TransportError::Request(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|err| TransportError::Read(err.to_string())));
            Ok(stream.boxed())
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The server sent its `connected` event.
    Connected { generation: u64 },
    /// Raw payload of an unnamed event.
    Message { generation: u64, data: String },
    /// Transport error or end of stream. The reader task has finished.
    Closed { generation: u64, reason: String },
}

impl ConnectionEvent {
    fn generation(&self) -> u64 {
        match self {
            ConnectionEvent::Connected { generation }
            | ConnectionEvent::Message { generation, .. }
            | ConnectionEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// Owns the push connection lifecycle. Reader tasks only decode frames and forward them;
/// every status change happens here, on the caller's task.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    status: watch::Sender<ConnectionStatus>,
    generation: u64,
    task: Option<JoinHandle<()>>,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let manager = Self {
            transport,
            events_tx,
            status,
            generation: 0,
            task: None,
            reconnect_at: None,
            reconnect_delay: RECONNECT_DELAY,
        };
        (manager, events_rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Opens a new connection, closing any prior one first.
    pub fn connect(&mut self) {
        self.close_task();
        self.reconnect_at = None;
        self.generation += 1;
        self.set_status(ConnectionStatus::Connecting);

        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();
        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            read_stream(transport, generation, tx).await;
        }));
        debug!(event = "connection_open", generation);
    }

    /// Fires the scheduled reconnect.
    pub fn reconnect(&mut self) {
        if self.reconnect_at.take().is_some() {
            self.connect();
        }
    }

    /// Applies a reader event. Returns the payload of a current-generation message.
    pub fn handle(&mut self, event: ConnectionEvent) -> Option<String> {
        if event.generation() != self.generation {
            debug!(
                event = "connection_stale_event",
                generation = event.generation(),
                current = self.generation
            );
            return None;
        }
        match event {
            ConnectionEvent::Connected { generation } => {
                self.reconnect_at = None;
                self.set_status(ConnectionStatus::Connected);
                info!(event = "connection_established", generation);
                None
            }
            ConnectionEvent::Message { data, .. } => Some(data),
            ConnectionEvent::Closed { generation, reason } => {
                warn!(event = "connection_lost", generation, reason = %reason);
                self.task = None;
                self.set_status(ConnectionStatus::Disconnected);
                if self.reconnect_at.is_none() {
                    self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
                }
                None
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.close_task();
        self.reconnect_at = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn close_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_task();
    }
}

async fn read_stream(
    transport: Arc<dyn Transport>,
    generation: u64,
    tx: mpsc::Sender<ConnectionEvent>,
) {
    let reason = match pump_events(transport.as_ref(), generation, &tx).await {
        Ok(()) => "stream ended".to_string(),
        Err(err) => err.to_string(),
    };
    let _ = tx.send(ConnectionEvent::Closed { generation, reason }).await;
}

async fn pump_events(
    transport: &dyn Transport,
    generation: u64,
    tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<(), TransportError> {
    let mut stream = transport.open().await?;
    let mut decoder = SseDecoder::default();
    while let Some(chunk) = stream.next().await {
        let report = decoder.push_chunk(&chunk?);
        if !forward(report, generation, tx).await {
            return Ok(());
        }
    }
    Ok(())
}

/// Returns `false` once the receiving side is gone.
async fn forward(report: DecodeReport, generation: u64, tx: &mpsc::Sender<ConnectionEvent>) -> bool {
    for err in report.errors {
        warn!(event = "sse_frame_error", generation, error = %err);
    }
    for event in report.events {
        let forwarded = if event.is_connected() {
            ConnectionEvent::Connected { generation }
        } else if event.is_message() {
            ConnectionEvent::Message {
                generation,
                data: event.data,
            }
        } else {
            debug!(event = "sse_event_ignored", name = ?event.event);
            continue;
        };
        if tx.send(forwarded).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = Result<Vec<Result<Bytes, TransportError>>, TransportError>;

    /// Replays one scripted outcome per `open`. Once exhausted, streams stay open forever.
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                opens: AtomicUsize::new(0),
            })
        }
    }

    impl Transport for ScriptedTransport {
        fn open(&self) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.scripts.lock().expect("script lock").pop_front();
            async move {
                match next {
                    Some(Ok(chunks)) => Ok(stream::iter(chunks).boxed()),
                    Some(Err(err)) => Err(err),
                    None => Ok(stream::pending::<Result<Bytes, TransportError>>().boxed()),
                }
            }
            .boxed()
        }
    }

    fn chunk(text: &str) -> Result<Bytes, TransportError> {
        Ok(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[tokio::test(start_paused = true)]
    async fn connected_event_then_messages_then_close() {
        let transport = ScriptedTransport::new(vec![Ok(vec![
            chunk("event: connected\ndata: {}\n\n"),
            chunk("data: {\"type\":\"snap"),
            chunk("shot\"}\n\n"),
        ])]);
        let (mut manager, mut events) = ConnectionManager::new(transport.clone());
        let status = manager.subscribe();

        manager.connect();
        assert_eq!(*status.borrow(), ConnectionStatus::Connecting);

        let event = events.recv().await.expect("connected");
        assert_eq!(manager.handle(event), None);
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);

        let event = events.recv().await.expect("message");
        assert_eq!(
            manager.handle(event).as_deref(),
            Some("{\"type\":\"snapshot\"}")
        );

        let event = events.recv().await.expect("closed");
        let closed_at = Instant::now();
        assert!(matches!(event, ConnectionEvent::Closed { generation: 1, .. }));
        manager.handle(event);
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
        assert_eq!(
            manager.reconnect_deadline(),
            Some(closed_at + RECONNECT_DELAY)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_schedules_exactly_one_reconnect_after_fixed_delay() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Request("connection refused".to_string())),
            Ok(vec![chunk("event: connected\ndata: {}\n\n")]),
        ]);
        let (mut manager, mut events) = ConnectionManager::new(transport.clone());
        let status = manager.subscribe();

        manager.connect();
        let event = events.recv().await.expect("closed");
        let failed_at = Instant::now();
        manager.handle(event.clone());
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);

        // A duplicate close for the same connection must not push the timer out.
        tokio::time::advance(Duration::from_millis(1000)).await;
        manager.handle(event);
        let deadline = manager.reconnect_deadline().expect("reconnect scheduled");
        assert_eq!(deadline, failed_at + RECONNECT_DELAY);

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(Instant::now() < deadline);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);

        tokio::time::sleep_until(deadline).await;
        manager.reconnect();
        assert_eq!(manager.generation(), 2);
        assert_eq!(*status.borrow(), ConnectionStatus::Connecting);
        assert_eq!(manager.reconnect_deadline(), None);

        let event = events.recv().await.expect("connected");
        assert_eq!(event, ConnectionEvent::Connected { generation: 2 });
        manager.handle(event);
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_a_replaced_connection_are_ignored() {
        let transport = ScriptedTransport::new(Vec::new());
        let (mut manager, _events) = ConnectionManager::new(transport);
        let status = manager.subscribe();

        manager.connect();
        manager.connect();
        assert_eq!(manager.generation(), 2);

        let stale = manager.handle(ConnectionEvent::Message {
            generation: 1,
            data: "{}".to_string(),
        });
        assert_eq!(stale, None);
        manager.handle(ConnectionEvent::Closed {
            generation: 1,
            reason: "aborted".to_string(),
        });
        assert_eq!(*status.borrow(), ConnectionStatus::Connecting);
        assert_eq!(manager.reconnect_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_clears_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Status(502))]);
        let (mut manager, mut events) = ConnectionManager::new(transport);
        let status = manager.subscribe();

        manager.connect();
        let event = events.recv().await.expect("closed");
        manager.handle(event);
        assert!(manager.reconnect_deadline().is_some());

        manager.connect();
        assert_eq!(manager.reconnect_deadline(), None);

        // Firing with nothing scheduled is a no-op.
        manager.reconnect();
        assert_eq!(manager.generation(), 2);
    }

    #[tokio::test]
    async fn named_events_other_than_connected_are_not_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut decoder = SseDecoder::default();
        let report = decoder.push_chunk(b"event: ping\ndata: 1\n\nevent: message\ndata: 2\n\n");
        assert!(forward(report, 4, &tx).await);
        drop(tx);

        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::Message {
                generation: 4,
                data: "2".to_string()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let base = Url::parse("http://127.0.0.1:7331/dashboard/").expect("url");
        let transport = HttpTransport::new(&base).expect("transport");
        assert_eq!(transport.url().as_str(), "http://127.0.0.1:7331/api/events");
    }

    #[test]
    fn status_labels_match_indicator_text() {
        assert_eq!(ConnectionStatus::Connected.label(), "● connected");
        assert_eq!(ConnectionStatus::Disconnected.label(), "○ disconnected");
        assert_eq!(ConnectionStatus::Connecting.label(), "◌ connecting...");
    }
}
