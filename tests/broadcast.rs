//! Transaction pipeline against the mock node: sequencing, retries, batching.

use std::sync::Arc;
use std::time::Duration;

use tm_client::error::ErrorRegistry;
use tm_client::keys::KeyAlgo;
use tm_client::rpc::RpcClient;
use tm_client::{BaseTx, BroadcastMode, Client, MsgRef};

mod common;
use common::{CheckTxFailure, MockNode, ACCOUNT_NUMBER, CHAIN_ID, TEST_PRIVATE_KEY};

const KEY: &str = "alice";
const PASSWORD: &str = "correct horse";

fn noop(i: u32) -> MsgRef {
    Arc::new(cosmrs::Any {
        type_url: "/mock.v1.MsgNoop".into(),
        value: i.to_be_bytes().to_vec(),
    })
}

fn sized(tag: u8, len: usize) -> MsgRef {
    Arc::new(cosmrs::Any {
        type_url: "/mock.v1.MsgNoop".into(),
        value: vec![tag; len],
    })
}

fn client_for(node: &MockNode) -> Client {
    client_with(node.client_config())
}

fn client_with(config: tm_client::ClientConfig) -> Client {
    let client = Client::new(config).unwrap();
    client
        .keys()
        .import(KEY, PASSWORD, KeyAlgo::Secp256k1, TEST_PRIVATE_KEY)
        .unwrap();
    client
}

fn base_tx() -> BaseTx {
    BaseTx::new(KEY, PASSWORD)
}

#[tokio::test]
async fn test_concurrent_sends_use_distinct_increasing_sequences() {
    let node = MockNode::start().await;
    node.set_sequence(5);
    let client = Arc::new(client_for(&node));

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.build_and_send(&[noop(i)], &base_tx()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let sequences: Vec<u64> = node.accepted().iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, (5..13).collect::<Vec<_>>());
    assert_eq!(node.broadcasts(), 8, "no send should have needed a retry");
    assert_eq!(node.account_queries(), 1, "cache hits should supply every later sequence");
}

#[tokio::test]
async fn test_sequence_mismatch_retries_three_times() {
    let node = MockNode::start().await;
    node.set_always_wrong_sequence(true);
    let client = client_for(&node);

    let err = client.build_and_send(&[noop(1)], &base_tx()).await.unwrap_err();

    assert!(err.is_sequence_mismatch(), "unexpected error: {}", err);
    assert_eq!(node.broadcasts(), 3);
    assert_eq!(node.account_queries(), 3, "each retry must re-query the account");
}

#[tokio::test]
async fn test_stale_cache_recovers_after_one_retry() {
    let node = MockNode::start().await;
    let client = client_for(&node);

    client.build_and_send(&[noop(1)], &base_tx()).await.unwrap();
    // Another process moved the account forward.
    node.set_sequence(10);

    client.build_and_send(&[noop(2)], &base_tx()).await.unwrap();

    let sequences: Vec<u64> = node.accepted().iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, vec![0, 10]);
    assert_eq!(node.broadcasts(), 3);
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let node = MockNode::start().await;
    let mut config = node.client_config();
    config.accounts.cache_ttl_ms = 100;
    let client = client_with(config);

    client.build_and_send(&[noop(1)], &base_tx()).await.unwrap();
    client.build_and_send(&[noop(2)], &base_tx()).await.unwrap();
    assert_eq!(node.account_queries(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    client.build_and_send(&[noop(3)], &base_tx()).await.unwrap();
    assert_eq!(node.account_queries(), 2);
}

#[tokio::test]
async fn test_batch_halves_until_accepted_and_sends_each_message_once() {
    let node = MockNode::start().await;
    node.set_max_msgs_per_tx(Some(30));
    node.set_hold_blocks(true);
    let client = client_for(&node);

    let msgs: Vec<MsgRef> = (0..250).map(noop).collect();
    let results = client.send_batch(&msgs, &base_tx()).await.unwrap();
    assert_eq!(node.account_queries(), 1, "rejected sizes must not drop the cached sequence");

    let accepted = node.accepted();
    assert_eq!(results.len(), accepted.len());
    assert!(accepted.iter().all(|tx| tx.messages.len() <= 30));

    let sent: Vec<Vec<u8>> = accepted.into_iter().flat_map(|tx| tx.messages).collect();
    let expected: Vec<Vec<u8>> = (0..250u32).map(|i| i.to_be_bytes().to_vec()).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_batch_shrink_on_local_size_limit_keeps_mempool_sequence() {
    let node = MockNode::start().await;
    node.set_hold_blocks(true);
    let mut config = node.client_config();
    config.node.max_tx_bytes = 800;
    config.accounts.max_batch = 2;
    let client = client_with(config);

    let msgs = vec![sized(1, 10), sized(2, 10), sized(3, 400), sized(4, 400)];
    let results = client.send_batch(&msgs, &base_tx()).await.unwrap();

    assert_eq!(results.len(), 3);
    let accepted = node.accepted();
    let sequences: Vec<u64> = accepted.iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    let groups: Vec<Vec<u8>> = accepted
        .iter()
        .map(|tx| tx.messages.iter().map(|m| m[0]).collect())
        .collect();
    assert_eq!(groups, vec![vec![1, 2], vec![3], vec![4]]);
    assert_eq!(node.broadcasts(), 3, "oversized txs never reach the node");
    assert_eq!(node.account_queries(), 1);
}

#[tokio::test]
async fn test_oversized_send_does_not_lose_pending_sequence() {
    let node = MockNode::start().await;
    node.set_hold_blocks(true);
    let mut config = node.client_config();
    config.node.max_tx_bytes = 800;
    let client = client_with(config);

    client.build_and_send(&[sized(1, 10)], &base_tx()).await.unwrap();
    let err = client
        .build_and_send(&[sized(2, 400), sized(3, 400)], &base_tx())
        .await
        .unwrap_err();
    assert!(err.is_tx_too_large());
    client.build_and_send(&[sized(4, 10)], &base_tx()).await.unwrap();

    let sequences: Vec<u64> = node.accepted().iter().map(|tx| tx.sequence).collect();
    assert_eq!(sequences, vec![0, 1]);
    assert_eq!(node.broadcasts(), 2);
}

#[tokio::test]
async fn test_batch_validates_every_message_before_sending() {
    let node = MockNode::start().await;
    let client = client_for(&node);

    let mut msgs: Vec<MsgRef> = (0..5).map(noop).collect();
    msgs.push(Arc::new(cosmrs::Any {
        type_url: "missing-slash".into(),
        value: vec![],
    }));

    let err = client.send_batch(&msgs, &base_tx()).await.unwrap_err();
    assert_eq!(err.code(), tm_client::error::codes::INVALID_MESSAGE);
    assert_eq!(node.broadcasts(), 0);
}

#[tokio::test]
async fn test_oversized_single_message_is_fatal() {
    let node = MockNode::start().await;
    node.set_max_msgs_per_tx(Some(0));
    let client = client_for(&node);

    let err = client.build_and_send(&[noop(1)], &base_tx()).await.unwrap_err();
    assert!(err.is_tx_too_large());
    assert_eq!(node.broadcasts(), 1, "size errors are not retried");
}

#[tokio::test]
async fn test_commit_reports_check_tx_failure() {
    let node = MockNode::start().await;
    node.set_check_tx_failure(Some(CheckTxFailure {
        code: 5,
        codespace: "sdk".into(),
        log: "0uatom is smaller than 10uatom: insufficient funds".into(),
    }));
    let client = client_for(&node);

    let mut tx = base_tx();
    tx.mode = Some(BroadcastMode::Commit);
    let err = client.build_and_send(&[noop(1)], &tx).await.unwrap_err();

    assert_eq!(err.codespace(), "sdk");
    assert_eq!(err.code(), 5);
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(node.broadcasts(), 1);
}

#[tokio::test]
async fn test_rpc_commit_checks_check_tx_before_deliver_tx() {
    let node = MockNode::start().await;
    node.set_check_tx_failure(Some(CheckTxFailure {
        code: 13,
        codespace: "sdk".into(),
        log: "insufficient fee".into(),
    }));
    let registry = Arc::new(ErrorRegistry::with_defaults().unwrap());
    let rpc = RpcClient::new(&node.rpc_url(), Duration::from_secs(5), registry).unwrap();

    let err = rpc.broadcast_tx_commit(b"opaque").await.unwrap_err();

    assert_eq!(err.code(), 13);
    assert_eq!(err.to_string(), "[sdk:13] insufficient fee");
}

#[tokio::test]
async fn test_queries_through_client() {
    let node = MockNode::start().await;
    node.set_sequence(3);
    let client = client_for(&node);

    let status = client.status().await.unwrap();
    assert_eq!(status.node_info.network, CHAIN_ID);

    let address = client.keys().show(KEY).unwrap().address;
    let account = client.query_account(&address).await.unwrap();
    assert_eq!(account.account_number, ACCOUNT_NUMBER);
    assert_eq!(account.sequence, 3);

    let gas = client.estimate_gas(&[noop(1)], &base_tx()).await.unwrap();
    assert_eq!(gas, 80_000);
}
