//! Websocket event client.
//!
//! # Responsibilities
//! - Multiplex many tendermint subscriptions over one socket
//! - Route each event to the channel registered for its query
//! - Survive disconnects: redial with backoff, then resubscribe every query
//!
//! # Data Flow
//! ```text
//! subscribe(query) ──▶ map[query] = sender ──▶ outgoing queue ──▶ writer task ──▶ node
//! node ──▶ reader task ──▶ result.query ──▶ map[query].try_send(event) ──▶ Subscription
//!
//! reader/writer failure
//!     → both tasks exit → supervisor redials (backoff + jitter, bounded attempts)
//!     → writer replays: failed request (once), then subscribe for every registered query
//! ```
//!
//! # Design Decisions
//! - The map of query → sender has its own `RwLock`; the reader only takes it for reading
//! - Delivery never blocks the reader: a full channel drops the event
//! - Pong latency is a metric only, never a liveness decision
//! - The supervisor waits for both tasks before redialing, so at most one
//!   connection is live
//! - A subscription whose receiver was dropped is unsubscribed on its next
//!   event and never replayed
//! - A subscribe still queued when the preamble resubscribed its query is
//!   skipped by the writer, so each query is requested once per connection

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::WebSocketConfig;
use crate::error::{SdkError, SdkResult};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::rpc::types::RpcErrorBody;
use crate::ws::types::{Event, EventData};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle of one registered query. Absent from the map = unsubscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Request queued or in flight, no confirmation yet.
    Subscribing,
    /// Node confirmed the subscription.
    Subscribed,
    /// Connection lost, waiting for a redial.
    Disconnected,
    /// Subscribe replayed on a new connection, no confirmation yet.
    Resubscribing,
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Client-generated subscriber name.
    pub id: String,
    pub query: String,
    receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Next event. `None` once the query is unsubscribed or the client closes.
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn into_receiver(self) -> mpsc::Receiver<Event> {
        self.receiver
    }
}

struct SubscriptionEntry {
    id: String,
    sender: mpsc::Sender<Event>,
    state: SubscriptionState,
}

/// A request waiting for the writer.
#[derive(Debug, Clone)]
struct Outgoing {
    id: u64,
    method: &'static str,
    query: Option<String>,
    payload: String,
}

/// State shared by the handle and the connection tasks.
struct Shared {
    url: url::Url,
    config: WebSocketConfig,
    subscriptions: RwLock<HashMap<String, SubscriptionEntry>>,
    /// Request id → query, for subscribe confirmations.
    pending: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    last_ping: Mutex<Option<Instant>>,
    /// Weak, so the writer still stops once every handle is gone.
    outgoing: mpsc::WeakUnboundedSender<Outgoing>,
}

impl Shared {
    fn request(&self, method: &'static str, query: Option<&str>) -> Outgoing {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = match query {
            Some(q) => serde_json::json!({ "query": q }),
            None => serde_json::json!({}),
        };
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();
        Outgoing {
            id,
            method,
            query: query.map(str::to_string),
            payload,
        }
    }

    fn track(&self, id: u64, query: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, query.to_string());
        }
    }

    fn take_pending(&self, id: u64) -> Option<String> {
        self.pending.lock().ok().and_then(|mut p| p.remove(&id))
    }

    /// A queued subscribe whose id the preamble purged has been replaced by a
    /// fresh request on the new connection.
    fn superseded(&self, request: &Outgoing) -> bool {
        request.method == "subscribe"
            && self
                .pending
                .lock()
                .map(|pending| !pending.contains_key(&request.id))
                .unwrap_or(false)
    }

    /// Forget `query` if its receiver is gone and ask the node to stop sending it.
    async fn release_abandoned(&self, query: &str) {
        {
            let mut subs = self.subscriptions.write().await;
            if !subs.get(query).is_some_and(|entry| entry.sender.is_closed()) {
                return;
            }
            subs.remove(query);
            metrics::record_subscriptions(subs.len());
        }

        let request = self.request("unsubscribe", Some(query));
        if let Some(outgoing) = self.outgoing.upgrade() {
            let _ = outgoing.send(request);
        }
        tracing::info!(query = %query, "Subscription receiver dropped, unsubscribing");
    }
}

/// Handle to the event client. Cheap to clone; the connection closes when the
/// last handle is dropped or `close` is called.
#[derive(Clone)]
pub struct WsClient {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl WsClient {
    /// Dial `url` and start the connection tasks.
    pub async fn connect(url: url::Url, config: WebSocketConfig) -> SdkResult<Self> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SdkError::WebSocket(format!("connect {}: {}", url, e)))?;
        tracing::info!(url = %url, "Websocket connected");

        let (outgoing, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            url,
            config,
            subscriptions: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            last_ping: Mutex::new(None),
            outgoing: outgoing.downgrade(),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(supervise(shared.clone(), stream, rx, shutdown_rx));

        Ok(Self {
            shared,
            outgoing,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Register `query` and request it from the node. Returns immediately; the
    /// node's confirmation is reflected in `subscription_state`.
    pub async fn subscribe(&self, query: &str) -> SdkResult<Subscription> {
        if self.is_closed() {
            return Err(SdkError::WebSocket("client is closed".into()));
        }

        let (sender, receiver) = mpsc::channel(self.shared.config.channel_capacity.max(1));
        let id = uuid::Uuid::new_v4().to_string();

        // Tracked under the map lock so a concurrent preamble sees both or neither.
        let request = {
            let mut subs = self.shared.subscriptions.write().await;
            if subs.contains_key(query) {
                return Err(SdkError::Subscription(format!("already subscribed to \"{}\"", query)));
            }
            subs.insert(
                query.to_string(),
                SubscriptionEntry {
                    id: id.clone(),
                    sender,
                    state: SubscriptionState::Subscribing,
                },
            );
            metrics::record_subscriptions(subs.len());

            let request = self.shared.request("subscribe", Some(query));
            self.shared.track(request.id, query);
            request
        };

        if self.outgoing.send(request).is_err() {
            self.shared.subscriptions.write().await.remove(query);
            return Err(SdkError::WebSocket("connection task has stopped".into()));
        }

        tracing::info!(query = %query, subscriber = %id, "Subscribed");
        Ok(Subscription {
            id,
            query: query.to_string(),
            receiver,
        })
    }

    /// Drop the local mapping for `query`, then ask the node to stop sending it.
    pub async fn unsubscribe(&self, query: &str) -> SdkResult<()> {
        let removed = {
            let mut subs = self.shared.subscriptions.write().await;
            let removed = subs.remove(query);
            metrics::record_subscriptions(subs.len());
            removed
        };
        if removed.is_none() {
            return Err(SdkError::Subscription(format!("not subscribed to \"{}\"", query)));
        }

        let request = self.shared.request("unsubscribe", Some(query));
        self.outgoing
            .send(request)
            .map_err(|_| SdkError::WebSocket("connection task has stopped".into()))?;
        tracing::info!(query = %query, "Unsubscribed");
        Ok(())
    }

    /// Drop every local mapping, then ask the node to drop all subscriptions.
    pub async fn unsubscribe_all(&self) -> SdkResult<()> {
        {
            let mut subs = self.shared.subscriptions.write().await;
            subs.clear();
            metrics::record_subscriptions(0);
        }

        let request = self.shared.request("unsubscribe_all", None);
        self.outgoing
            .send(request)
            .map_err(|_| SdkError::WebSocket("connection task has stopped".into()))?;
        tracing::info!("Unsubscribed from all queries");
        Ok(())
    }

    pub async fn subscription_state(&self, query: &str) -> Option<SubscriptionState> {
        self.shared.subscriptions.read().await.get(query).map(|e| e.state)
    }

    /// Registered queries.
    pub async fn queries(&self) -> Vec<String> {
        self.shared.subscriptions.read().await.keys().cloned().collect()
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop the connection tasks. Subscription channels end.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
    }
}

/// Why a connection ended.
enum WriterExit {
    /// Socket failed; carries the request that could not be written, if any.
    ConnectionLost(Option<Outgoing>),
    /// All handles dropped or `close` called.
    Stopped,
}

async fn supervise(
    shared: Arc<Shared>,
    first: WsStream,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stream = Some(first);
    let mut backlog: Option<Outgoing> = None;

    loop {
        let ws = match stream.take() {
            Some(ws) => ws,
            None => match redial(&shared, &mut shutdown).await {
                Some(ws) => ws,
                None => break,
            },
        };

        let preamble = resubscribe_preamble(&shared, backlog.take()).await;
        let (sink, source) = ws.split();
        let (lost_tx, lost_rx) = watch::channel(false);
        let lost_tx = Arc::new(lost_tx);

        let writer = tokio::spawn(write_loop(
            shared.clone(),
            sink,
            rx,
            preamble,
            lost_tx.clone(),
            lost_rx.clone(),
            shutdown.clone(),
        ));
        let reader = tokio::spawn(read_loop(shared.clone(), source, lost_tx, lost_rx, shutdown.clone()));

        let (writer_result, reader_result) = tokio::join!(writer, reader);
        if let Err(e) = reader_result {
            tracing::error!(error = %e, "Websocket reader task failed");
        }

        match writer_result {
            Ok((returned_rx, WriterExit::ConnectionLost(failed))) => {
                rx = returned_rx;
                backlog = failed;
            }
            Ok((_, WriterExit::Stopped)) => break,
            Err(e) => {
                tracing::error!(error = %e, "Websocket writer task failed");
                break;
            }
        }

        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let mut subs = shared.subscriptions.write().await;
        for entry in subs.values_mut() {
            entry.state = SubscriptionState::Disconnected;
        }
        tracing::warn!(subscriptions = subs.len(), "Websocket connection lost");
    }

    shared.closed.store(true, Ordering::SeqCst);
    let mut subs = shared.subscriptions.write().await;
    subs.clear();
    metrics::record_subscriptions(0);
    tracing::info!(url = %shared.url, "Websocket client stopped");
}

async fn redial(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> Option<WsStream> {
    let cfg = &shared.config;
    let backoff = Backoff::new(cfg.reconnect_base_delay_ms, cfg.reconnect_max_delay_ms, cfg.max_reconnect_attempts);

    let mut attempt = 1;
    while let Some(delay) = backoff.delay(attempt) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return None,
        }
        if shared.closed.load(Ordering::SeqCst) {
            return None;
        }

        match connect_async(shared.url.as_str()).await {
            Ok((ws, _)) => {
                metrics::record_ws_reconnect(true);
                tracing::info!(url = %shared.url, attempt = attempt, "Websocket reconnected");
                return Some(ws);
            }
            Err(e) => {
                metrics::record_ws_reconnect(false);
                tracing::warn!(
                    url = %shared.url,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Websocket reconnect failed"
                );
            }
        }
        attempt += 1;
    }

    tracing::error!(
        url = %shared.url,
        attempts = backoff.max_attempts(),
        "Websocket reconnect attempts exhausted, closing client"
    );
    None
}

/// Requests to write before anything else on a new connection: the request
/// that failed on the previous one, then a subscribe for every registered
/// query that the failed request does not already cover.
async fn resubscribe_preamble(shared: &Shared, backlog: Option<Outgoing>) -> VecDeque<Outgoing> {
    let mut preamble = VecDeque::new();
    let mut subs = shared.subscriptions.write().await;

    let before = subs.len();
    subs.retain(|_, entry| !entry.sender.is_closed());
    if subs.len() != before {
        metrics::record_subscriptions(subs.len());
        tracing::info!(dropped = before - subs.len(), "Not resubscribing abandoned subscriptions");
    }

    // Confirmations from the old connection will never arrive.
    if let Ok(mut pending) = shared.pending.lock() {
        pending.retain(|id, _| backlog.as_ref().is_some_and(|b| b.id == *id));
    }

    let covered = backlog
        .as_ref()
        .filter(|b| b.method == "subscribe")
        .and_then(|b| b.query.clone());

    if let Some(failed) = backlog {
        let still_wanted = match (failed.method, &failed.query) {
            ("subscribe", Some(q)) => subs.contains_key(q),
            _ => true,
        };
        if still_wanted {
            tracing::debug!(id = failed.id, method = failed.method, "Replaying failed request");
            preamble.push_back(failed);
        }
    }

    for (query, entry) in subs.iter_mut() {
        if covered.as_deref() == Some(query.as_str()) {
            entry.state = SubscriptionState::Resubscribing;
            continue;
        }
        let request = shared.request("subscribe", Some(query));
        shared.track(request.id, query);
        entry.state = SubscriptionState::Resubscribing;
        preamble.push_back(request);
    }

    if !preamble.is_empty() {
        tracing::info!(requests = preamble.len(), "Resubscribing after reconnect");
    }
    preamble
}

async fn write_loop(
    shared: Arc<Shared>,
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    mut preamble: VecDeque<Outgoing>,
    lost_tx: Arc<watch::Sender<bool>>,
    mut lost_rx: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> (mpsc::UnboundedReceiver<Outgoing>, WriterExit) {
    // Replayed requests get exactly one more try.
    while let Some(request) = preamble.pop_front() {
        if let Err(e) = sink.send(Message::Text(request.payload.clone().into())).await {
            tracing::warn!(id = request.id, error = %e, "Replay write failed, dropping request");
            let _ = lost_tx.send(true);
            return (rx, WriterExit::ConnectionLost(None));
        }
    }

    let mut ping = shared.config.ping_period().map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = lost_rx.changed() => {
                return (rx, WriterExit::ConnectionLost(None));
            }
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = lost_tx.send(true);
                return (rx, WriterExit::Stopped);
            }
            next = rx.recv() => {
                let Some(request) = next else {
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = lost_tx.send(true);
                    return (rx, WriterExit::Stopped);
                };
                if shared.superseded(&request) {
                    tracing::debug!(id = request.id, query = ?request.query, "Skipping subscribe already replayed");
                    continue;
                }
                if let Err(e) = sink.send(Message::Text(request.payload.clone().into())).await {
                    tracing::warn!(id = request.id, method = request.method, error = %e, "Websocket write failed");
                    let _ = lost_tx.send(true);
                    return (rx, WriterExit::ConnectionLost(Some(request)));
                }
                tracing::trace!(id = request.id, method = request.method, "Request written");
            }
            _ = tick(&mut ping) => {
                if let Ok(mut last) = shared.last_ping.lock() {
                    *last = Some(Instant::now());
                }
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    tracing::warn!(error = %e, "Websocket ping failed");
                    let _ = lost_tx.send(true);
                    return (rx, WriterExit::ConnectionLost(None));
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut source: WsSource,
    lost_tx: Arc<watch::Sender<bool>>,
    mut lost_rx: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = lost_rx.changed() => break,
            _ = shutdown.changed() => break,
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text(&shared, text.as_str()).await,
                Some(Ok(Message::Pong(_))) => {
                    let sent = shared.last_ping.lock().ok().and_then(|mut last| last.take());
                    if let Some(sent) = sent {
                        metrics::record_pong_latency(sent.elapsed());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(frame = ?frame, "Websocket closed by node");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Websocket read failed");
                    break;
                }
                None => break,
            }
        }
    }
    let _ = lost_tx.send(true);
}

async fn handle_text(shared: &Shared, text: &str) {
    let message: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable websocket message");
            return;
        }
    };

    let request_id = message.get("id").and_then(serde_json::Value::as_u64);

    if let Some(error) = message.get("error") {
        let error: Option<RpcErrorBody> = serde_json::from_value(error.clone()).ok();
        let query = request_id.and_then(|id| shared.take_pending(id));
        match (query, error) {
            (Some(query), error) => {
                tracing::error!(query = %query, error = ?error, "Subscribe rejected by node");
                let mut subs = shared.subscriptions.write().await;
                subs.remove(&query);
                metrics::record_subscriptions(subs.len());
            }
            (None, error) => tracing::debug!(id = ?request_id, error = ?error, "Request failed"),
        }
        return;
    }

    let Some(result) = message.get("result") else {
        return;
    };

    let Some(query) = result.get("query").and_then(serde_json::Value::as_str) else {
        // confirmation of subscribe / unsubscribe
        if let Some(query) = request_id.and_then(|id| shared.take_pending(id)) {
            if let Some(entry) = shared.subscriptions.write().await.get_mut(&query) {
                entry.state = SubscriptionState::Subscribed;
                tracing::debug!(query = %query, subscriber = %entry.id, "Subscription confirmed");
            }
        }
        return;
    };

    let data = match result.get("data").cloned().map(EventData::decode) {
        Some(Ok(data)) => data,
        Some(Err(e)) => {
            tracing::warn!(query = %query, error = %e, "Dropping undecodable event");
            return;
        }
        None => return,
    };
    let events: HashMap<String, Vec<String>> = result
        .get("events")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let subs = shared.subscriptions.read().await;
    let Some(entry) = subs.get(query) else {
        tracing::debug!(query = %query, "Event for unknown query");
        return;
    };

    let event = Event {
        query: query.to_string(),
        data,
        events,
    };
    let sent = entry.sender.try_send(event);
    drop(subs);

    match sent {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            metrics::record_dropped_event();
            tracing::warn!(query = %query, kind = event.data.kind(), "Subscription channel full, dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => shared.release_abandoned(query).await,
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("url", &self.shared.url.as_str())
            .field("closed", &self.is_closed())
            .finish()
    }
}
