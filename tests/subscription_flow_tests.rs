//! Live-subscription flows against a local WebSocket acceptor and a mocked
//! indexer REST surface.

use bitcoin::Network;
use futures_util::{SinkExt, StreamExt};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use utxo_hot_wallet::blockchain::ws::SubscriptionState;
use utxo_hot_wallet::storage::MemoryStore;
use utxo_hot_wallet::wallet::keys::{derive_address, WalletKeypair};
use utxo_hot_wallet::{WalletConfig, WalletSession};

const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn wallet_pk_hash_hex() -> String {
    let keypair = WalletKeypair::from_seed_phrase(TEST_PHRASE).unwrap();
    let (pk_hash, _) = derive_address(keypair.public_key(), Network::Bitcoin);
    hex::encode(pk_hash)
}

fn wallet_script_hex() -> String {
    format!("76a914{}88ac", wallet_pk_hash_hex())
}

fn session_for(base_url: &str, ws_url: &str) -> WalletSession {
    let mut config = WalletConfig::default();
    config.indexer.base_url = base_url.to_string();
    config.indexer.ws_url = ws_url.to_string();
    // Tests drive a single connection; no reconnect loops.
    config.indexer.keep_alive = false;
    WalletSession::new(config, Arc::new(MemoryStore::new()))
}

fn mount_utxos(server: &MockServer, sats: u64) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("/script/p2pkh/{}/utxos", wallet_pk_hash_hex()));
        then.status(200).json_body(json!({
            "utxos": [{
                "txid": "0000000000000000000000000000000000000000000000000000000000000001",
                "outIdx": 0,
                "sats": sats,
                "script": wallet_script_hex(),
            }]
        }));
    })
}

/// Accepts WebSocket connections one at a time. Each connection is expected
/// to open with the subscribe frames; the server then pushes the given frames
/// to the client and holds the socket open until the client closes it, so a
/// restarted subscription simply lands on the next accept.
async fn spawn_event_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Script subscription first, then the best-effort block one.
            let first = socket.next().await.unwrap().unwrap();
            let value: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert_eq!(value["method"], "subscribe_script");
            assert_eq!(value["payload"], wallet_pk_hash_hex());

            let second = socket.next().await.unwrap().unwrap();
            let value: Value = serde_json::from_str(second.to_text().unwrap()).unwrap();
            assert_eq!(value["method"], "subscribe_blocks");

            for frame in &frames {
                socket.send(Message::Text(frame.clone())).await.unwrap();
            }

            while let Some(Ok(_)) = socket.next().await {}
        }
    });

    ws_url
}

#[tokio::test]
async fn confirmed_tx_event_refreshes_then_notifies() {
    let server = MockServer::start();
    let utxos = mount_utxos(&server, 2_000);

    let ws_url = spawn_event_server(vec![json!({
        "type": "Tx",
        "msgType": "TX_CONFIRMED",
        "txid": "ab"
    })
    .to_string()])
    .await;

    let session = session_for(&server.base_url(), &ws_url);
    session.import_wallet(TEST_PHRASE).await.unwrap();

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .on_balance_update(move |sats| {
            let _ = notify_tx.send(sats);
        })
        .await;

    assert!(session.start_subscription().await);
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Subscribed
    );

    let sats = tokio::time::timeout(Duration::from_secs(5), notify_rx.recv())
        .await
        .expect("observer was not called")
        .unwrap();
    assert_eq!(sats, 2_000);

    // Exactly one refresh for the event, on top of the import-time one.
    utxos.assert_hits(2);

    session.stop_subscription().await;
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Closed
    );
}

#[tokio::test]
async fn malformed_and_irrelevant_frames_are_ignored() {
    let server = MockServer::start();
    let utxos = mount_utxos(&server, 1_500);

    let ws_url = spawn_event_server(vec![
        "this is not json".to_string(),
        json!({"msgType": "TX_REMOVED_FROM_MEMPOOL"}).to_string(),
        json!({"somethingElse": true}).to_string(),
        json!({"msgType": "BLK_CONNECTED", "blockHash": "00ff"}).to_string(),
    ])
    .await;

    let session = session_for(&server.base_url(), &ws_url);
    session.import_wallet(TEST_PHRASE).await.unwrap();

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .on_balance_update(move |sats| {
            let _ = notify_tx.send(sats);
        })
        .await;

    assert!(session.start_subscription().await);

    // Only the block event triggers a notification.
    let sats = tokio::time::timeout(Duration::from_secs(5), notify_rx.recv())
        .await
        .expect("observer was not called")
        .unwrap();
    assert_eq!(sats, 1_500);

    // No second notification is pending.
    assert!(notify_rx.try_recv().is_err());
    utxos.assert_hits(2);

    session.stop_subscription().await;
}

#[tokio::test]
async fn last_observer_registration_wins() {
    let server = MockServer::start();
    let _utxos = mount_utxos(&server, 900);

    let ws_url = spawn_event_server(vec![
        json!({"msgType": "TX_ADDED_TO_MEMPOOL", "txid": "ab"}).to_string()
    ])
    .await;

    let session = session_for(&server.base_url(), &ws_url);
    session.import_wallet(TEST_PHRASE).await.unwrap();

    let (stale_tx, mut stale_rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .on_balance_update(move |sats| {
            let _ = stale_tx.send(sats);
        })
        .await;

    let (live_tx, mut live_rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .on_balance_update(move |sats| {
            let _ = live_tx.send(sats);
        })
        .await;

    assert!(session.start_subscription().await);

    let sats = tokio::time::timeout(Duration::from_secs(5), live_rx.recv())
        .await
        .expect("replacement observer was not called")
        .unwrap();
    assert_eq!(sats, 900);
    assert!(stale_rx.try_recv().is_err());

    session.stop_subscription().await;
}

#[tokio::test]
async fn start_requires_initialized_wallet() {
    let server = MockServer::start();
    let session = session_for(&server.base_url(), "ws://127.0.0.1:9");
    assert!(!session.start_subscription().await);
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Closed
    );
}

#[tokio::test]
async fn unreachable_transport_reports_false_not_error() {
    let server = MockServer::start();
    let _utxos = mount_utxos(&server, 100);

    // Nothing listens on the discard port; start degrades to false.
    let session = session_for(&server.base_url(), "ws://127.0.0.1:9");
    session.import_wallet(TEST_PHRASE).await.unwrap();
    assert!(!session.start_subscription().await);
    assert!(session.is_initialized().await);
}

#[tokio::test]
async fn stop_without_active_subscription_is_a_noop() {
    let server = MockServer::start();
    let session = session_for(&server.base_url(), "ws://127.0.0.1:9");

    // Never started: both calls return quietly.
    session.stop_subscription().await;
    session.stop_subscription().await;
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Closed
    );
}

#[tokio::test]
async fn restart_replaces_the_previous_subscription() {
    let server = MockServer::start();
    let _utxos = mount_utxos(&server, 700);

    let first_url = spawn_event_server(vec![]).await;
    let session = session_for(&server.base_url(), &first_url);
    session.import_wallet(TEST_PHRASE).await.unwrap();

    assert!(session.start_subscription().await);
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Subscribed
    );

    // start() again: the old handle is stopped, a new connection is made.
    assert!(session.start_subscription().await);
    assert_eq!(
        session.get_subscription_status().await.state,
        SubscriptionState::Subscribed
    );

    session.stop_subscription().await;
}
