//! Connection actor
//!
//! Owns one WebSocket connection and supervises its two I/O tasks:
//!
//! - the **reader** decodes inbound frames into [`Event`]s and dispatches them
//!   to the handler table, in arrival order
//! - the **writer** drains the bounded outbound queue in FIFO order and
//!   performs the close handshake
//!
//! Shutdown is coordinated through cancellation tokens rather than direct
//! messages between the tasks. `closing` is the one-shot close signal: it is
//! triggered by [`Connection::close`] or by the reader's exit path, and makes
//! the writer drain its queue and send a single close frame. `shutdown` stops
//! both tasks immediately. A write failure ends only the writer; the reader
//! notices the dead stream on its next read (or read timeout).

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConnectionConfig, UpgradeConfig};
use crate::error::{SendError, StreamError, UpgradeError};
use crate::event::{self, Event};
use crate::handlers::{DispatchOutcome, HandlerTable};
use crate::outbox::{Outbox, WeakOutbox};
use crate::stats::{ConnectionStats, StatsSnapshot};
use crate::types::ConnectionId;
use crate::upgrade;

/// Handle to a running connection
///
/// Cloning is cheap; all clones refer to the same connection. The connection
/// closes gracefully once every handle and [`Outbox`] has been dropped.
/// Handlers that reply should capture a [`WeakOutbox`] so they do not keep
/// the queue open.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    handlers: Arc<HandlerTable>,
    outbox: Outbox,
    shutdown: CancellationToken,
    terminated: CancellationToken,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Upgrade a raw stream and start the connection
    ///
    /// Must be called from within a tokio runtime.
    pub async fn accept<S>(
        stream: S,
        upgrade_config: &UpgradeConfig,
        config: ConnectionConfig,
    ) -> Result<Self, UpgradeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws_stream = upgrade::accept(stream, upgrade_config).await?;
        Ok(Self::start(ws_stream, config))
    }

    /// Start the reader and writer tasks on an upgraded stream
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn start<S>(ws_stream: WebSocketStream<S>, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::new();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity());
        let closing = CancellationToken::new();
        let shutdown = CancellationToken::new();
        let terminated = CancellationToken::new();
        let handlers = Arc::new(HandlerTable::new());
        let stats = Arc::new(ConnectionStats::default());
        let outbox = Outbox::new(queue_tx, closing.clone());

        let (sink, source) = ws_stream.split();

        let reader = Reader {
            id,
            handlers: Arc::clone(&handlers),
            stats: Arc::clone(&stats),
            acks: config.ack_decode_errors.then(|| outbox.downgrade()),
            read_timeout: config.read_timeout,
            shutdown: shutdown.clone(),
        };
        let reader_closing = closing.clone();
        let reader_task = tokio::spawn(async move {
            let exit = reader.run(source).await;
            exit.log(id);
            reader_closing.cancel();
        });

        let writer = Writer {
            stats: Arc::clone(&stats),
            write_timeout: config.write_timeout,
            closing: closing.clone(),
            shutdown: shutdown.clone(),
        };
        let writer_task = tokio::spawn(async move {
            let exit = writer.run(sink, queue_rx).await;
            exit.log(id);
        });

        tokio::spawn(supervise(
            id,
            reader_task,
            writer_task,
            closing,
            Arc::clone(&handlers),
            terminated.clone(),
        ));

        info!("Connection {} started", id);

        Self {
            id,
            handlers,
            outbox,
            shutdown,
            terminated,
            stats,
        }
    }

    /// Unique identifier of this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Register `handler` for events named `name`, replacing any previous one
    ///
    /// Events dispatched before registration are not replayed.
    pub fn on<F>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.register(name, Arc::new(handler));
        self
    }

    /// Remove the handler for `name`
    pub fn off(&self, name: &str) -> bool {
        self.handlers.unregister(name)
    }

    /// Observe events that had no registered handler
    pub fn on_miss<F>(&self, hook: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.handlers.set_miss_hook(Arc::new(hook));
        self
    }

    /// Queue a raw payload, waiting while the outbound queue is full
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.outbox.send(payload).await
    }

    /// Queue a raw payload without waiting
    pub fn try_send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.outbox.try_send(payload)
    }

    /// Queue an encoded event envelope
    pub async fn emit<T: Serialize>(&self, name: &str, payload: &T) -> Result<(), SendError> {
        self.outbox.emit(name, payload).await
    }

    /// Producer handle for the outbound queue
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Close gracefully: flush queued frames, then send a close frame
    pub fn close(&self) {
        self.outbox.close();
    }

    /// Stop both tasks immediately, without a close handshake
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Check if the connection is closing or closed
    pub fn is_closing(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Check if both tasks have exited
    pub fn is_closed(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Wait until both tasks have exited
    pub async fn closed(&self) {
        self.terminated.cancelled().await;
    }

    /// Snapshot of the connection counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Wait for both tasks, then mark the connection terminated
async fn supervise(
    id: ConnectionId,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    closing: CancellationToken,
    handlers: Arc<HandlerTable>,
    terminated: CancellationToken,
) {
    // A panicking handler takes the reader down before its own cleanup runs.
    let reader = async {
        let result = reader.await;
        closing.cancel();
        result
    };
    let (reader_result, writer_result) = tokio::join!(reader, writer);

    if let Err(e) = reader_result {
        error!("Reader task for {} failed: {}", id, e);
    }
    if let Err(e) = writer_result {
        error!("Writer task for {} failed: {}", id, e);
    }

    handlers.clear();
    terminated.cancel();
    info!("Connection {} terminated", id);
}

/// Why the reader task stopped
#[derive(Debug)]
enum ReaderExit {
    /// Peer sent a close frame
    PeerClosed(Option<CloseCode>),
    /// Stream ended without a close frame
    EndOfStream,
    /// Read failed or timed out
    Failed(StreamError),
    /// `shutdown()` was called
    Shutdown,
}

impl ReaderExit {
    fn log(&self, id: ConnectionId) {
        match self {
            ReaderExit::PeerClosed(None)
            | ReaderExit::PeerClosed(Some(
                CloseCode::Normal | CloseCode::Away | CloseCode::Abnormal,
            )) => {
                debug!("Connection {} closed by peer", id);
            }
            ReaderExit::PeerClosed(Some(code)) => {
                info!("Connection {} closed by peer with code {:?}", id, code);
            }
            ReaderExit::EndOfStream => {
                debug!("Connection {} stream ended", id);
            }
            ReaderExit::Failed(e) if e.is_expected_close() => {
                debug!("Connection {} dropped: {}", id, e);
            }
            ReaderExit::Failed(e) => {
                warn!("Connection {} {}", id, e);
            }
            ReaderExit::Shutdown => {
                debug!("Reader for {} shut down", id);
            }
        }
        debug!("Read task ended for {}", id);
    }
}

/// Inbound half: frame -> event -> handler
struct Reader {
    id: ConnectionId,
    handlers: Arc<HandlerTable>,
    stats: Arc<ConnectionStats>,
    /// Present when decode errors are acknowledged to the peer
    acks: Option<WeakOutbox>,
    read_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl Reader {
    async fn run<S>(&self, mut source: SplitStream<WebSocketStream<S>>) -> ReaderExit
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return ReaderExit::Shutdown,
                next = next_frame(&mut source, self.read_timeout) => next,
            };

            match next {
                Ok(Some(Message::Text(text))) => self.handle_frame(text.as_bytes()),
                Ok(Some(Message::Binary(data))) => self.handle_frame(&data),
                Ok(Some(Message::Close(frame))) => {
                    return ReaderExit::PeerClosed(frame.map(|f| f.code));
                }
                Ok(Some(Message::Ping(_))) => {
                    // Pong is handled automatically by tungstenite
                    trace!("Ping from {}", self.id);
                }
                Ok(Some(Message::Pong(_))) => {
                    trace!("Pong from {}", self.id);
                }
                Ok(Some(Message::Frame(_))) => {}
                Ok(None) => return ReaderExit::EndOfStream,
                Err(e) => return ReaderExit::Failed(e),
            }
        }
    }

    fn handle_frame(&self, raw: &[u8]) {
        self.stats.frame_received();

        let event = match event::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_failed();
                warn!("Invalid frame from {}: {}", self.id, e);
                if let Some(acks) = self.acks.as_ref().and_then(WeakOutbox::upgrade) {
                    let reply = json!({ "message": e.to_string() });
                    if let Err(e) = acks.try_emit("error", &reply) {
                        debug!("Dropped decode error ack for {}: {}", self.id, e);
                    }
                }
                return;
            }
        };

        debug!("Event '{}' from {}", event.name, self.id);
        match self.handlers.dispatch(&event) {
            DispatchOutcome::Handled => self.stats.event_dispatched(),
            DispatchOutcome::Missed => self.stats.dispatch_missed(),
        }
    }
}

async fn next_frame<S>(
    source: &mut SplitStream<WebSocketStream<S>>,
    read_timeout: Option<Duration>,
) -> Result<Option<Message>, StreamError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let next = match read_timeout {
        Some(limit) => tokio::time::timeout(limit, source.next())
            .await
            .map_err(|_| StreamError::ReadTimeout(limit))?,
        None => source.next().await,
    };
    next.transpose().map_err(StreamError::Read)
}

/// Why the writer task stopped
#[derive(Debug)]
enum WriterExit {
    /// Queue drained and close frame written
    Closed,
    /// A write failed; nothing further was written
    Failed(StreamError),
    /// `shutdown()` was called
    Shutdown,
}

impl WriterExit {
    fn log(&self, id: ConnectionId) {
        match self {
            WriterExit::Closed => debug!("Sent close frame to {}", id),
            WriterExit::Failed(e) if e.is_expected_close() => {
                debug!("Connection {} dropped: {}", id, e);
            }
            WriterExit::Failed(e) => warn!("Connection {} {}", id, e),
            WriterExit::Shutdown => debug!("Writer for {} shut down", id),
        }
        debug!("Write task ended for {}", id);
    }
}

/// Outbound half: queue -> frames -> close handshake
struct Writer {
    stats: Arc<ConnectionStats>,
    write_timeout: Option<Duration>,
    closing: CancellationToken,
    shutdown: CancellationToken,
}

type Sink<S> = SplitSink<WebSocketStream<S>, Message>;

impl Writer {
    async fn run<S>(&self, mut sink: Sink<S>, mut queue: mpsc::Receiver<Vec<u8>>) -> WriterExit
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return WriterExit::Shutdown,
                _ = self.closing.cancelled() => break,
                next = queue.recv() => match next {
                    Some(payload) => {
                        if let Err(exit) = self.write_payload(&mut sink, payload).await {
                            return exit;
                        }
                    }
                    // Every producer is gone
                    None => break,
                },
            }
        }

        // Draining: refuse new payloads, flush what is already queued
        queue.close();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return WriterExit::Shutdown,
                next = queue.recv() => match next {
                    Some(payload) => {
                        if let Err(exit) = self.write_payload(&mut sink, payload).await {
                            return exit;
                        }
                    }
                    None => break,
                },
            }
        }

        match self.write(&mut sink, Message::Close(None)).await {
            // After a peer close, tungstenite flushes its automatic close reply
            // here and then reports the finished handshake as `ConnectionClosed`.
            Ok(()) | Err(WriterExit::Failed(StreamError::Write(WsError::ConnectionClosed))) => {
                self.stats.close_frame_sent();
                WriterExit::Closed
            }
            Err(exit) => exit,
        }
    }

    async fn write_payload<S>(&self, sink: &mut Sink<S>, payload: Vec<u8>) -> Result<(), WriterExit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.write(sink, into_frame(payload)).await?;
        self.stats.frame_sent();
        Ok(())
    }

    /// Write one frame; a stalled peer never outlives `shutdown()`
    async fn write<S>(&self, sink: &mut Sink<S>, message: Message) -> Result<(), WriterExit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let send = async {
            match self.write_timeout {
                Some(limit) => tokio::time::timeout(limit, sink.send(message))
                    .await
                    .map_err(|_| StreamError::WriteTimeout(limit))?
                    .map_err(StreamError::Write),
                None => sink.send(message).await.map_err(StreamError::Write),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(WriterExit::Shutdown),
            result = send => result.map_err(WriterExit::Failed),
        }
    }
}

/// UTF-8 payloads go out as text frames, anything else as binary
fn into_frame(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;
    use tokio_tungstenite::client_async;

    const WAIT: Duration = Duration::from_secs(2);

    type Client = WebSocketStream<DuplexStream>;

    async fn connect(config: ConnectionConfig) -> (Connection, Client) {
        connect_with_buffer(config, 64 * 1024).await
    }

    async fn connect_with_buffer(config: ConnectionConfig, buffer: usize) -> (Connection, Client) {
        let (client_io, server_io) = tokio::io::duplex(buffer);
        let upgrade_config = UpgradeConfig::default();
        let (server, client) = tokio::join!(
            Connection::accept(server_io, &upgrade_config, config),
            client_async("ws://localhost/", client_io)
        );
        (server.unwrap(), client.unwrap().0)
    }

    fn collect(conn: &Connection, name: &str) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        conn.on(name, move |event: &Event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn send_text(client: &mut Client, text: &str) {
        client.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    /// Read client frames until the stream ends or stalls
    async fn drain_client(client: &mut Client) -> Vec<Message> {
        let mut frames = Vec::new();
        while let Ok(Some(Ok(msg))) = timeout(WAIT, client.next()).await {
            frames.push(msg);
        }
        frames
    }

    fn texts(frames: &[Message]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    fn close_frames(frames: &[Message]) -> usize {
        frames.iter().filter(|m| matches!(m, Message::Close(_))).count()
    }

    #[tokio::test]
    async fn test_dispatch_move_exactly_once() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let mut moves = collect(&conn, "move");
        let mut syncs = collect(&conn, "sync");

        send_text(&mut client, r#"{"name":"move","payload":{"dx":1}}"#).await;
        send_text(&mut client, r#"{"name":"sync"}"#).await;

        let event = next_event(&mut moves).await;
        assert_eq!(event.payload, json!({"dx": 1}));

        // Dispatch is in order, so once "sync" arrived every "move" has too
        next_event(&mut syncs).await;
        assert!(moves.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_event_is_dropped() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let mut moves = collect(&conn, "move");
        let (miss_tx, mut miss_rx) = mpsc::unbounded_channel();
        conn.on_miss(move |name: &str| {
            let _ = miss_tx.send(name.to_string());
        });

        send_text(&mut client, r#"{"name":"split","payload":{}}"#).await;
        send_text(&mut client, r#"{"name":"move","payload":{"dx":2}}"#).await;

        assert_eq!(next_event(&mut moves).await.payload, json!({"dx": 2}));
        assert_eq!(miss_rx.recv().await.unwrap(), "split");
        assert_eq!(conn.stats().dispatch_misses, 1);
        assert!(!conn.is_closing());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let mut moves = collect(&conn, "move");

        send_text(&mut client, r#"{"name":"move","payload":1}"#).await;
        send_text(&mut client, r#"{"payload":{"dx":1}}"#).await;
        send_text(&mut client, "not json").await;
        send_text(&mut client, r#"{"name":"move","payload":2}"#).await;

        assert_eq!(next_event(&mut moves).await.payload, json!(1));
        assert_eq!(next_event(&mut moves).await.payload, json!(2));

        let stats = conn.stats();
        assert_eq!(stats.decode_errors, 2);
        assert_eq!(stats.frames_received, 4);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_binary_frames_are_decoded() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let mut moves = collect(&conn, "move");

        client
            .send(Message::Binary(br#"{"name":"move","data":[1]}"#.to_vec().into()))
            .await
            .unwrap();

        assert_eq!(next_event(&mut moves).await.payload, json!([1]));
    }

    #[tokio::test]
    async fn test_decode_error_ack() {
        let config = ConnectionConfig::default().with_decode_error_acks(true);
        let (_conn, mut client) = connect(config).await;

        send_text(&mut client, "garbage").await;

        let reply = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        let event = event::decode(&reply.into_data()).unwrap();
        assert_eq!(event.name, "error");
        assert!(event.payload["message"].is_string());
    }

    #[tokio::test]
    async fn test_handler_replies_through_outbox() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let outbox = conn.outbox().downgrade();
        conn.on("ping", move |_event: &Event| {
            if let Some(outbox) = outbox.upgrade() {
                let _ = outbox.try_emit("pong", &json!(null));
            }
        });

        send_text(&mut client, r#"{"name":"ping"}"#).await;

        let reply = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply, Message::Text(r#"{"name":"pong","payload":null}"#.to_string().into()));
    }

    #[tokio::test]
    async fn test_outbound_fifo_order() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        conn.send("A").await.unwrap();
        conn.send("B").await.unwrap();
        conn.send("C").await.unwrap();

        for expected in ["A", "B", "C"] {
            let msg = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(msg, Message::Text(expected.to_string().into()));
        }
    }

    #[tokio::test]
    async fn test_non_utf8_payload_is_binary() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        conn.send(vec![0xff, 0x00]).await.unwrap();

        let msg = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(msg, Message::Binary(vec![0xff, 0x00].into()));
    }

    #[tokio::test]
    async fn test_close_drains_then_sends_one_close_frame() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        conn.send("a").await.unwrap();
        conn.send("b").await.unwrap();
        conn.close();
        conn.close();

        assert!(matches!(conn.send("late").await, Err(SendError::ChannelClosed)));

        let frames = drain_client(&mut client).await;
        assert_eq!(texts(&frames), vec!["a", "b"]);
        assert_eq!(close_frames(&frames), 1);
        assert!(matches!(frames.last(), Some(Message::Close(_))));

        timeout(WAIT, conn.closed()).await.unwrap();
        let stats = conn.stats();
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.close_frames_sent, 1);
    }

    #[tokio::test]
    async fn test_peer_close_terminates() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        client.close(None).await.unwrap();
        drain_client(&mut client).await;

        timeout(WAIT, conn.closed()).await.unwrap();
        assert!(conn.is_closed());
        assert!(conn.is_closing());
        // The automatic close reply counts as the connection's close frame
        assert_eq!(conn.stats().close_frames_sent, 1);
    }

    #[tokio::test]
    async fn test_read_error_with_concurrent_close() {
        let (conn, client) = connect(ConnectionConfig::default()).await;

        // The reader sees the broken stream; the writer only learns about it
        // through the close signal and then fails its close frame write.
        let closer = conn.clone();
        let racer = tokio::spawn(async move {
            for _ in 0..10 {
                closer.close();
                tokio::task::yield_now().await;
            }
        });
        drop(client);

        timeout(WAIT, conn.closed()).await.unwrap();
        racer.await.unwrap();
        assert!(conn.stats().close_frames_sent <= 1);
    }

    #[tokio::test]
    async fn test_read_timeout_closes_connection() {
        let config = ConnectionConfig::default().with_read_timeout(Duration::from_millis(100));
        let (conn, mut client) = connect(config).await;

        let frames = drain_client(&mut client).await;

        assert_eq!(close_frames(&frames), 1);
        timeout(WAIT, conn.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_skips_close_handshake() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        conn.shutdown();
        timeout(WAIT, conn.closed()).await.unwrap();

        let frames = drain_client(&mut client).await;
        assert_eq!(close_frames(&frames), 0);
        assert_eq!(conn.stats().close_frames_sent, 0);
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_writer_on_stalled_peer() {
        // The client never reads, so the writer blocks once the pipe is full
        let (conn, _client) = connect_with_buffer(ConnectionConfig::default(), 1024).await;

        for _ in 0..4 {
            conn.send(vec![b'x'; 64 * 1024]).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!conn.is_closed());

        conn.shutdown();

        timeout(WAIT, conn.closed()).await.unwrap();
        assert_eq!(conn.stats().frames_sent, 0);
        assert_eq!(conn.stats().close_frames_sent, 0);
    }

    #[tokio::test]
    async fn test_weak_handles_do_not_keep_connection_open() {
        let config = ConnectionConfig::default().with_decode_error_acks(true);
        let (conn, mut client) = connect(config).await;
        let outbox = conn.outbox().downgrade();
        conn.on("ping", move |_event: &Event| {
            if let Some(outbox) = outbox.upgrade() {
                let _ = outbox.try_emit("pong", &json!(null));
            }
        });

        drop(conn);

        let frames = drain_client(&mut client).await;
        assert_eq!(close_frames(&frames), 1);
    }

    #[tokio::test]
    async fn test_dropping_handles_closes_gracefully() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;

        drop(conn);

        let frames = drain_client(&mut client).await;
        assert_eq!(close_frames(&frames), 1);
    }

    #[tokio::test]
    async fn test_late_registration_has_no_replay() {
        let (conn, mut client) = connect(ConnectionConfig::default()).await;
        let mut syncs = collect(&conn, "sync");

        send_text(&mut client, r#"{"name":"spawn"}"#).await;
        send_text(&mut client, r#"{"name":"sync"}"#).await;
        next_event(&mut syncs).await;

        let mut spawns = collect(&conn, "spawn");
        send_text(&mut client, r#"{"name":"sync"}"#).await;
        next_event(&mut syncs).await;

        assert!(spawns.try_recv().is_err());
        assert_eq!(conn.stats().dispatch_misses, 1);
    }
}
