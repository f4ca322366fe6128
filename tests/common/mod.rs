//! Shared utilities for integration tests: an in-process mock Tendermint node.
//!
//! The node serves JSON-RPC over HTTP on `/` and event subscriptions on
//! `/websocket`, tracks one account's sequence the way the ante handler does,
//! and records everything it receives so tests can assert on it.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use cosmrs::proto::cosmos::auth::v1beta1::{BaseAccount, QueryAccountResponse};
use cosmrs::proto::cosmos::base::abci::v1beta1::GasInfo;
use cosmrs::proto::cosmos::tx::v1beta1::{AuthInfo, SimulateResponse, TxBody, TxRaw};
use prost::Message as _;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use tm_client::config::ClientConfig;
use tm_client::ws::tx_hash;

pub const CHAIN_ID: &str = "mock-1";
pub const ACCOUNT_NUMBER: u64 = 7;

/// Anvil's first dev key; any valid secp256k1 key works here.
pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// A transaction the node accepted.
#[derive(Debug, Clone)]
pub struct AcceptedTx {
    pub sequence: u64,
    /// `value` bytes of each message, in order.
    pub messages: Vec<Vec<u8>>,
}

/// A CheckTx failure returned by `broadcast_tx_commit`.
#[derive(Debug, Clone)]
pub struct CheckTxFailure {
    pub code: u32,
    pub codespace: String,
    pub log: String,
}

pub struct NodeState {
    /// CheckTx (mempool) sequence.
    sequence: Mutex<u64>,
    /// Sequence served by account queries.
    committed_sequence: Mutex<u64>,
    /// Keep accepted txs in the mempool instead of committing them at once.
    hold_blocks: AtomicBool,
    accepted: Mutex<Vec<AcceptedTx>>,
    broadcasts: AtomicUsize,
    account_queries: AtomicUsize,
    /// Reject any tx carrying more messages than this with `sdk` code 21.
    max_msgs_per_tx: Mutex<Option<usize>>,
    /// Reject every tx with `sdk` code 32.
    always_wrong_sequence: AtomicBool,
    check_tx_failure: Mutex<Option<CheckTxFailure>>,

    ws_connections: AtomicUsize,
    refuse_ws: AtomicBool,
    /// (connection number, query) for each subscribe received.
    subscribes: Mutex<Vec<(usize, String)>>,
    /// Queries named by each unsubscribe received.
    unsubscribes: Mutex<Vec<String>>,
    drop_ws: broadcast::Sender<()>,
    events: broadcast::Sender<(String, Value)>,
}

#[derive(Clone)]
pub struct MockNode {
    pub addr: SocketAddr,
    pub state: Arc<NodeState>,
}

impl MockNode {
    /// Start the node on an ephemeral port.
    pub async fn start() -> Self {
        let (drop_ws, _) = broadcast::channel(16);
        let (events, _) = broadcast::channel(256);
        let state = Arc::new(NodeState {
            sequence: Mutex::new(0),
            committed_sequence: Mutex::new(0),
            hold_blocks: AtomicBool::new(false),
            accepted: Mutex::new(Vec::new()),
            broadcasts: AtomicUsize::new(0),
            account_queries: AtomicUsize::new(0),
            max_msgs_per_tx: Mutex::new(None),
            always_wrong_sequence: AtomicBool::new(false),
            check_tx_failure: Mutex::new(None),
            ws_connections: AtomicUsize::new(0),
            refuse_ws: AtomicBool::new(false),
            subscribes: Mutex::new(Vec::new()),
            unsubscribes: Mutex::new(Vec::new()),
            drop_ws,
            events,
        });

        let app = Router::new()
            .route("/", post(rpc_handler))
            .route("/websocket", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}/websocket", self.addr)).unwrap()
    }

    /// Client config pointing at this node, with short websocket backoff.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.node.rpc_address = self.rpc_url();
        config.node.chain_id = CHAIN_ID.to_string();
        config.websocket.ping_period_secs = 0;
        config.websocket.reconnect_base_delay_ms = 20;
        config.websocket.reconnect_max_delay_ms = 100;
        config.websocket.max_reconnect_attempts = 20;
        config
    }

    /// Set both the committed and the mempool sequence.
    pub fn set_sequence(&self, sequence: u64) {
        *self.state.sequence.lock().unwrap() = sequence;
        *self.state.committed_sequence.lock().unwrap() = sequence;
    }

    /// While on, account queries lag behind txs accepted into the mempool.
    pub fn set_hold_blocks(&self, on: bool) {
        self.state.hold_blocks.store(on, Ordering::SeqCst);
    }

    pub fn sequence(&self) -> u64 {
        *self.state.sequence.lock().unwrap()
    }

    pub fn set_max_msgs_per_tx(&self, max: Option<usize>) {
        *self.state.max_msgs_per_tx.lock().unwrap() = max;
    }

    pub fn set_always_wrong_sequence(&self, on: bool) {
        self.state.always_wrong_sequence.store(on, Ordering::SeqCst);
    }

    pub fn set_check_tx_failure(&self, failure: Option<CheckTxFailure>) {
        *self.state.check_tx_failure.lock().unwrap() = failure;
    }

    pub fn accepted(&self) -> Vec<AcceptedTx> {
        self.state.accepted.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> usize {
        self.state.broadcasts.load(Ordering::SeqCst)
    }

    pub fn account_queries(&self) -> usize {
        self.state.account_queries.load(Ordering::SeqCst)
    }

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn set_refuse_ws(&self, on: bool) {
        self.state.refuse_ws.store(on, Ordering::SeqCst);
    }

    /// Queries subscribed on websocket connection `connection` (1-based).
    pub fn subscribes_on(&self, connection: usize) -> Vec<String> {
        self.state
            .subscribes
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == connection)
            .map(|(_, q)| q.clone())
            .collect()
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.state.unsubscribes.lock().unwrap().clone()
    }

    pub fn total_subscribes(&self) -> usize {
        self.state.subscribes.lock().unwrap().len()
    }

    /// Drop every open websocket without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.state.drop_ws.send(());
    }

    /// Deliver `data` to every connection subscribed to `query`.
    pub fn push_event(&self, query: &str, data: Value) {
        let _ = self.state.events.send((query.to_string(), data));
    }
}

/// Event payload for a `NewBlockHeader` at `height`.
pub fn header_event(height: i64) -> Value {
    json!({
        "type": "tendermint/event/NewBlockHeader",
        "value": {
            "header": {
                "chain_id": CHAIN_ID,
                "height": height.to_string(),
                "time": "2024-01-01T00:00:00Z"
            }
        }
    })
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn rpc_handler(State(node): State<Arc<NodeState>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let params = &request["params"];
    let result = match request["method"].as_str().unwrap_or_default() {
        "abci_query" => abci_query(&node, params),
        "broadcast_tx_sync" | "broadcast_tx_async" => {
            let outcome = deliver(&node, params);
            json!({
                "code": outcome.code,
                "codespace": outcome.codespace,
                "log": outcome.log,
                "data": "",
                "hash": outcome.hash,
            })
        }
        "broadcast_tx_commit" => broadcast_commit(&node, params),
        "status" => json!({
            "node_info": { "id": "mock", "network": CHAIN_ID, "version": "0.38.0", "moniker": "mock" },
            "sync_info": { "latest_block_height": "100", "catching_up": false },
            "validator_info": { "address": "", "voting_power": "0" }
        }),
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found", "data": other }
            }))
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn abci_query(node: &NodeState, params: &Value) -> Value {
    let path = params["path"].as_str().unwrap_or_default();
    let value = match path {
        "/cosmos.auth.v1beta1.Query/Account" => {
            node.account_queries.fetch_add(1, Ordering::SeqCst);
            let account = BaseAccount {
                address: String::new(),
                pub_key: None,
                account_number: ACCOUNT_NUMBER,
                sequence: *node.committed_sequence.lock().unwrap(),
            };
            QueryAccountResponse {
                account: Some(cosmrs::Any {
                    type_url: "/cosmos.auth.v1beta1.BaseAccount".into(),
                    value: account.encode_to_vec(),
                }),
            }
            .encode_to_vec()
        }
        "/cosmos.tx.v1beta1.Service/Simulate" => SimulateResponse {
            gas_info: Some(GasInfo {
                gas_wanted: 0,
                gas_used: 80_000,
            }),
            result: None,
        }
        .encode_to_vec(),
        _ => {
            return json!({ "response": { "code": 6, "codespace": "sdk", "log": "unknown query path" } });
        }
    };
    json!({
        "response": {
            "code": 0,
            "value": base64::engine::general_purpose::STANDARD.encode(value),
            "height": "100"
        }
    })
}

struct Outcome {
    code: u32,
    codespace: &'static str,
    log: String,
    hash: String,
}

/// Ante-handler checks: size, then sequence. Accepted txs advance the mempool
/// sequence, and the committed one unless blocks are held.
fn deliver(node: &NodeState, params: &Value) -> Outcome {
    node.broadcasts.fetch_add(1, Ordering::SeqCst);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(params["tx"].as_str().unwrap_or_default())
        .unwrap();
    let hash = tx_hash(&bytes);
    let raw = TxRaw::decode(bytes.as_slice()).unwrap();
    let body = TxBody::decode(raw.body_bytes.as_slice()).unwrap();
    let auth = AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap();
    let tx_sequence = auth.signer_infos.first().map(|s| s.sequence).unwrap_or_default();

    let reject = |code: u32, log: String| Outcome {
        code,
        codespace: "sdk",
        log,
        hash: hash.clone(),
    };

    if let Some(max) = *node.max_msgs_per_tx.lock().unwrap() {
        if body.messages.len() > max {
            return reject(21, format!("tx too large: {} messages", body.messages.len()));
        }
    }

    let mut sequence = node.sequence.lock().unwrap();
    if node.always_wrong_sequence.load(Ordering::SeqCst) || tx_sequence != *sequence {
        return reject(
            32,
            format!(
                "account sequence mismatch, expected {}, got {}: incorrect account sequence",
                *sequence, tx_sequence
            ),
        );
    }
    *sequence += 1;
    if !node.hold_blocks.load(Ordering::SeqCst) {
        *node.committed_sequence.lock().unwrap() = *sequence;
    }

    node.accepted.lock().unwrap().push(AcceptedTx {
        sequence: tx_sequence,
        messages: body.messages.into_iter().map(|m| m.value).collect(),
    });

    Outcome {
        code: 0,
        codespace: "",
        log: String::new(),
        hash,
    }
}

fn broadcast_commit(node: &NodeState, params: &Value) -> Value {
    if let Some(failure) = node.check_tx_failure.lock().unwrap().clone() {
        node.broadcasts.fetch_add(1, Ordering::SeqCst);
        return json!({
            "check_tx": { "code": failure.code, "codespace": failure.codespace, "log": failure.log },
            "tx_result": { "code": 99, "codespace": "mock", "log": "deliver result must not be consulted" },
            "hash": "",
            "height": "0"
        });
    }

    let outcome = deliver(node, params);
    json!({
        "check_tx": { "code": outcome.code, "codespace": outcome.codespace, "log": outcome.log },
        "tx_result": { "code": 0, "gas_wanted": "200000", "gas_used": "80000", "events": [] },
        "hash": outcome.hash,
        "height": "101"
    })
}

async fn ws_handler(State(node): State<Arc<NodeState>>, ws: WebSocketUpgrade) -> Response {
    if node.refuse_ws.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(node, socket))
}

async fn serve_socket(node: Arc<NodeState>, mut socket: WebSocket) {
    let connection = node.ws_connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut drop_rx = node.drop_ws.subscribe();
    let mut events_rx = node.events.subscribe();
    let mut subscribed: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = drop_rx.recv() => return,
            event = events_rx.recv() => {
                let Ok((query, data)) = event else { continue };
                if !subscribed.contains(&query) {
                    continue;
                }
                let message = json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "result": { "query": query, "data": data, "events": { "tm.event": ["NewBlockHeader"] } }
                });
                if socket.send(Message::Text(message.to_string().into())).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => return,
                };
                let request: Value = match serde_json::from_str(text.as_str()) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let query = request["params"]["query"].as_str().unwrap_or_default().to_string();
                match request["method"].as_str().unwrap_or_default() {
                    "subscribe" => {
                        node.subscribes.lock().unwrap().push((connection, query.clone()));
                        subscribed.insert(query);
                    }
                    "unsubscribe" => {
                        node.unsubscribes.lock().unwrap().push(query.clone());
                        subscribed.remove(&query);
                    }
                    "unsubscribe_all" => subscribed.clear(),
                    _ => {}
                }
                let reply = json!({ "jsonrpc": "2.0", "id": request["id"], "result": {} });
                if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
