//! Long-lived WebSocket JSON-RPC client for the Music Assistant dialect.
//!
//! The dialect carries request/response pairs correlated by `message_id`,
//! chunked partial-result frames, and server-pushed events. The client is a
//! state machine `{disconnected, connecting, connected}`:
//!
//! - `connect` is re-entrant: concurrent callers serialize on one in-flight
//!   handshake and observe the same outcome.
//! - A heartbeat ping goes out every 10 s; with no inbound traffic for 30 s
//!   the connection is force-terminated and redialed with randomized 2-4 s
//!   backoff.
//! - Pending requests reject with "connection closed" on teardown.
//! - Requests hitting the "not connected" error class retry up to 3 times
//!   with 300-1000 ms between attempts; other errors propagate immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, timeout, Instant};
use tokio_tungstenite::tungstenite::{Bytes, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Heartbeat ping interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Inbound-traffic liveness window; exceeded means force-terminate.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(30);
/// Per-request response deadline.
const RPC_TIMEOUT: Duration = Duration::from_secs(15);
/// Retries for the "not connected" error class.
const NOT_CONNECTED_RETRIES: u32 = 3;

fn reconnect_backoff() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(2000..=4000))
}

fn retry_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(300..=1000))
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// No live connection and the dial failed. Retried by `request`.
    #[error("not connected")]
    NotConnected,
    /// The connection dropped while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,
    #[error("rpc timeout")]
    Timeout,
    /// The server answered with an error payload.
    #[error("server error: {0}")]
    Server(String),
    #[error("transport error: {0}")]
    Transport(String),
}

struct Pending {
    reply: oneshot::Sender<Result<Value, RpcError>>,
    /// Accumulated partial-result frames, merged into the final response.
    partials: Vec<Value>,
}

struct RpcInner {
    url: String,
    /// Serializes handshakes; concurrent connect callers share one dial.
    connect_gate: tokio::sync::Mutex<()>,
    /// Writer inbox for the live connection, None while disconnected.
    writer: Mutex<Option<mpsc::Sender<WsMessage>>>,
    pending: Mutex<HashMap<u64, Pending>>,
    next_id: AtomicU64,
    events: broadcast::Sender<Value>,
    last_inbound: Mutex<Instant>,
    /// Client lifetime token; cancelled by `close`.
    shutdown: CancellationToken,
    /// Per-connection token, cancelled on teardown.
    conn_token: Mutex<CancellationToken>,
    /// Whether the client redials on its own after a drop.
    auto_reconnect: bool,
}

/// Shared handle to one RPC connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<RpcInner>,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(url, true)
    }

    pub fn with_options(url: impl Into<String>, auto_reconnect: bool) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RpcInner {
                url: url.into(),
                connect_gate: tokio::sync::Mutex::new(()),
                writer: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                events,
                last_inbound: Mutex::new(Instant::now()),
                shutdown: CancellationToken::new(),
                conn_token: Mutex::new(CancellationToken::new()),
                auto_reconnect,
            }),
        }
    }

    /// Subscribe to server-pushed event frames.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Value> {
        self.inner.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        #[allow(clippy::unwrap_used)] // lock poisoning is unrecoverable here
        let writer = self.inner.writer.lock().unwrap();
        writer.is_some()
    }

    /// Cheap reachability check used by config validation.
    pub async fn probe(url: &str, deadline: Duration) -> anyhow::Result<()> {
        match timeout(deadline, connect_async(url)).await {
            Ok(Ok((mut ws, _))) => {
                let _ = ws.close(None).await;
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow::anyhow!("{url}: {e}")),
            Err(_) => Err(anyhow::anyhow!("{url}: no answer within {deadline:?}")),
        }
    }

    /// Establish the connection if needed. Re-entrant: callers arriving while
    /// a handshake is in flight wait on it instead of dialing again.
    pub async fn connect(&self) -> Result<(), RpcError> {
        if self.is_connected() {
            return Ok(());
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(RpcError::ConnectionClosed);
        }

        let _gate = self.inner.connect_gate.lock().await;
        // A concurrent caller may have finished the dial while we waited.
        if self.is_connected() {
            return Ok(());
        }

        let (ws, _) = timeout(Duration::from_secs(4), connect_async(&self.inner.url))
            .await
            .map_err(|_| RpcError::NotConnected)?
            .map_err(|e| {
                debug!("dial {} failed: {e}", self.inner.url);
                RpcError::NotConnected
            })?;

        self.install_connection(ws);
        info!("rpc connected: {}", self.inner.url);
        Ok(())
    }

    fn install_connection(&self, ws: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (sink, stream) = ws.split();
        let (writer_tx, writer_rx) = mpsc::channel::<WsMessage>(32);

        let conn_token = self.inner.shutdown.child_token();
        {
            #[allow(clippy::unwrap_used)]
            let mut slot = self.inner.conn_token.lock().unwrap();
            *slot = conn_token.clone();
        }
        {
            #[allow(clippy::unwrap_used)]
            let mut writer = self.inner.writer.lock().unwrap();
            *writer = Some(writer_tx);
        }
        self.touch();

        let client = self.clone();
        tokio::spawn(async move {
            client.writer_loop(sink, writer_rx, conn_token.clone()).await;
        });

        let client = self.clone();
        let token = self.current_conn_token();
        tokio::spawn(async move {
            client.reader_loop(stream, token).await;
        });

        let client = self.clone();
        let token = self.current_conn_token();
        tokio::spawn(async move {
            client.heartbeat_loop(token).await;
        });
    }

    fn current_conn_token(&self) -> CancellationToken {
        #[allow(clippy::unwrap_used)]
        let token = self.inner.conn_token.lock().unwrap();
        token.clone()
    }

    fn touch(&self) {
        #[allow(clippy::unwrap_used)]
        let mut t = self.inner.last_inbound.lock().unwrap();
        *t = Instant::now();
    }

    fn since_last_inbound(&self) -> Duration {
        #[allow(clippy::unwrap_used)]
        let t = self.inner.last_inbound.lock().unwrap();
        t.elapsed()
    }

    async fn writer_loop(
        &self,
        mut sink: futures::stream::SplitSink<
            WebSocketStream<MaybeTlsStream<TcpStream>>,
            WsMessage,
        >,
        mut rx: mpsc::Receiver<WsMessage>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = sink.send(msg).await {
                        debug!("rpc write failed: {e}");
                        self.teardown("write failed");
                        break;
                    }
                }
            }
        }
    }

    async fn reader_loop(
        &self,
        mut stream: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        token: CancellationToken,
    ) {
        loop {
            let msg = tokio::select! {
                _ = token.cancelled() => break,
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    self.touch();
                    match serde_json::from_str::<Value>(&text) {
                        Ok(frame) => self.dispatch_frame(frame),
                        Err(e) => {
                            warn!("rpc: malformed frame dropped: {e}");
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    self.touch();
                    self.try_send(WsMessage::Pong(payload));
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    self.touch();
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.teardown("connection closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    self.teardown(&format!("read error: {e}"));
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    async fn heartbeat_loop(&self, token: CancellationToken) {
        let mut ticker = interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if self.since_last_inbound() > LIVENESS_WINDOW {
                        warn!("rpc: no traffic for {:?}, terminating", LIVENESS_WINDOW);
                        self.teardown("liveness window exceeded");
                        break;
                    }
                    self.try_send(WsMessage::Ping(Bytes::new()));
                }
            }
        }
    }

    fn try_send(&self, msg: WsMessage) {
        #[allow(clippy::unwrap_used)]
        let writer = self.inner.writer.lock().unwrap().clone();
        if let Some(tx) = writer {
            let _ = tx.try_send(msg);
        }
    }

    /// Route one inbound frame: a correlated response, a partial-result
    /// chunk, or a pushed event.
    fn dispatch_frame(&self, frame: Value) {
        if let Some(id) = frame.get("message_id").and_then(Value::as_u64) {
            let is_partial = frame
                .get("partial")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            #[allow(clippy::unwrap_used)]
            let mut pending = self.inner.pending.lock().unwrap();
            if is_partial {
                if let Some(entry) = pending.get_mut(&id) {
                    if let Some(result) = frame.get("result") {
                        entry.partials.push(result.clone());
                    }
                }
                return;
            }

            let Some(mut entry) = pending.remove(&id) else {
                debug!("rpc: response for unknown message_id {id}");
                return;
            };
            drop(pending);

            let outcome = if let Some(err) = frame.get("error_code").or(frame.get("error")) {
                Err(RpcError::Server(err.to_string()))
            } else {
                let final_result = frame.get("result").cloned().unwrap_or(Value::Null);
                if entry.partials.is_empty() {
                    Ok(final_result)
                } else {
                    entry.partials.push(final_result);
                    Ok(merge_partials(std::mem::take(&mut entry.partials)))
                }
            };
            let _ = entry.reply.send(outcome);
        } else if frame.get("event").is_some() {
            let _ = self.inner.events.send(frame);
        } else {
            debug!("rpc: uncorrelated frame ignored");
        }
    }

    /// Reject all pending requests and drop the connection state. Idempotent
    /// and safe from any lifecycle phase; schedules a redial when
    /// auto-reconnect is on and the client is not shut down.
    pub fn teardown(&self, reason: &str) {
        let had_writer = {
            #[allow(clippy::unwrap_used)]
            let mut writer = self.inner.writer.lock().unwrap();
            writer.take().is_some()
        };
        {
            #[allow(clippy::unwrap_used)]
            let token = self.inner.conn_token.lock().unwrap();
            token.cancel();
        }
        let drained: Vec<Pending> = {
            #[allow(clippy::unwrap_used)]
            let mut pending = self.inner.pending.lock().unwrap();
            pending.drain().map(|(_, p)| p).collect()
        };
        for entry in drained {
            let _ = entry.reply.send(Err(RpcError::ConnectionClosed));
        }

        if !had_writer {
            return;
        }
        debug!("rpc teardown: {reason}");

        if self.inner.auto_reconnect && !self.inner.shutdown.is_cancelled() {
            let client = self.clone();
            tokio::spawn(async move {
                loop {
                    let backoff = reconnect_backoff();
                    tokio::select! {
                        _ = client.inner.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    match client.connect().await {
                        Ok(()) => break,
                        Err(RpcError::ConnectionClosed) => break,
                        Err(e) => debug!("rpc redial failed: {e}"),
                    }
                }
            });
        }
    }

    /// Permanently close the client. Idempotent.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        self.teardown("client closed");
    }

    /// Issue one request and await the correlated (merged) response.
    pub async fn request(&self, command: &str, args: Value) -> Result<Value, RpcError> {
        let mut attempt = 0;
        loop {
            match self.request_once(command, args.clone()).await {
                Err(RpcError::NotConnected) if attempt < NOT_CONNECTED_RETRIES => {
                    attempt += 1;
                    debug!("rpc '{command}': not connected, retry {attempt}");
                    tokio::time::sleep(retry_delay()).await;
                }
                other => return other,
            }
        }
    }

    async fn request_once(&self, command: &str, args: Value) -> Result<Value, RpcError> {
        self.connect().await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            #[allow(clippy::unwrap_used)]
            let mut pending = self.inner.pending.lock().unwrap();
            pending.insert(
                id,
                Pending {
                    reply: reply_tx,
                    partials: Vec::new(),
                },
            );
        }

        let mut body = json!({
            "message_id": id,
            "command": command,
        });
        if !args.is_null() {
            body["args"] = args;
        }
        let text = body.to_string();

        let writer = {
            #[allow(clippy::unwrap_used)]
            let slot = self.inner.writer.lock().unwrap();
            slot.clone()
        };
        let Some(writer) = writer else {
            self.forget(id);
            return Err(RpcError::NotConnected);
        };
        if writer.send(WsMessage::Text(text.into())).await.is_err() {
            self.forget(id);
            return Err(RpcError::NotConnected);
        }

        match timeout(RPC_TIMEOUT, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                self.forget(id);
                Err(RpcError::Timeout)
            }
        }
    }

    fn forget(&self, id: u64) {
        #[allow(clippy::unwrap_used)]
        let mut pending = self.inner.pending.lock().unwrap();
        pending.remove(&id);
    }
}

/// Merge accumulated partial-result frames into one response. Array chunks
/// concatenate; anything else resolves to the last frame.
fn merge_partials(chunks: Vec<Value>) -> Value {
    if chunks.iter().all(Value::is_array) {
        let mut merged = Vec::new();
        for chunk in chunks {
            if let Value::Array(items) = chunk {
                merged.extend(items);
            }
        }
        return Value::Array(merged);
    }
    chunks.into_iter().last().unwrap_or(Value::Null)
}
