//! Chain-indexer subscription transport.
//!
//! tokio-tungstenite WebSocket client. One background task owns the socket:
//! it forwards classified events to the consumer, applies subscribe and
//! unsubscribe commands, and (when keep-alive is enabled) reconnects with
//! capped backoff on unexpected drops, replaying the active subscriptions.

use crate::core::errors::WalletError;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Subscription lifecycle. Terminal on explicit close; `Connecting` recurs
/// when keep-alive is re-establishing a dropped socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Closed,
    Connecting,
    Open,
    Subscribed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Closed => write!(f, "closed"),
            SubscriptionState::Connecting => write!(f, "connecting"),
            SubscriptionState::Open => write!(f, "open"),
            SubscriptionState::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Inbound event, classified by the `msgType` field of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerEvent {
    TxAddedToMempool { txid: Option<String> },
    TxConfirmed { txid: Option<String> },
    TxFinalized { txid: Option<String> },
    BlockConnected { block_hash: Option<String> },
    BlockFinalized { block_hash: Option<String> },
    /// Recognized frame of a kind this wallet does not react to.
    Other(String),
}

impl IndexerEvent {
    /// Only mempool/confirmation/finality and block events move the balance.
    pub fn triggers_refresh(&self) -> bool {
        !matches!(self, IndexerEvent::Other(_))
    }
}

/// Classifies one inbound frame. `None` means the frame is malformed (not
/// JSON, or no `msgType`) and should be logged and dropped.
pub fn parse_event(frame: &str) -> Option<IndexerEvent> {
    let value: Value = serde_json::from_str(frame).ok()?;
    let msg_type = value.get("msgType")?.as_str()?;

    let txid = value
        .get("txid")
        .and_then(|v| v.as_str())
        .map(String::from);
    let block_hash = value
        .get("blockHash")
        .and_then(|v| v.as_str())
        .map(String::from);

    let event = match msg_type {
        "TX_ADDED_TO_MEMPOOL" => IndexerEvent::TxAddedToMempool { txid },
        "TX_CONFIRMED" => IndexerEvent::TxConfirmed { txid },
        "TX_FINALIZED" => IndexerEvent::TxFinalized { txid },
        "BLK_CONNECTED" => IndexerEvent::BlockConnected { block_hash },
        "BLK_FINALIZED" => IndexerEvent::BlockFinalized { block_hash },
        other => IndexerEvent::Other(other.to_string()),
    };
    Some(event)
}

pub fn subscribe_script_frame(script_type: &str, payload_hex: &str) -> String {
    json!({
        "method": "subscribe_script",
        "scriptType": script_type,
        "payload": payload_hex,
    })
    .to_string()
}

pub fn unsubscribe_script_frame(script_type: &str, payload_hex: &str) -> String {
    json!({
        "method": "unsubscribe_script",
        "scriptType": script_type,
        "payload": payload_hex,
    })
    .to_string()
}

pub fn subscribe_blocks_frame() -> String {
    json!({ "method": "subscribe_blocks" }).to_string()
}

enum WsCommand {
    Subscribe { key: String, frame: String },
    Unsubscribe { key: String, frame: String },
    Close,
}

/// Handle to a live subscription transport. Owns zero or one socket (via the
/// background task); dropping the handle closes the task's command channel,
/// which shuts the connection down.
pub struct IndexerWs {
    cmd_tx: mpsc::Sender<WsCommand>,
    state: Arc<RwLock<SubscriptionState>>,
}

impl IndexerWs {
    /// Connects and spawns the socket task. Resolves once the transport
    /// reports open; events arrive on the returned receiver in delivery
    /// order.
    pub async fn open(
        ws_url: &str,
        keep_alive: bool,
    ) -> Result<(Self, mpsc::Receiver<IndexerEvent>), WalletError> {
        let state = Arc::new(RwLock::new(SubscriptionState::Connecting));
        debug!(url = %ws_url, "opening subscription transport");

        let (socket, _response) = connect_async(ws_url).await.map_err(|e| {
            WalletError::SubscriptionError(format!("connect to {} failed: {}", ws_url, e))
        })?;
        *state.write().await = SubscriptionState::Open;
        info!(url = %ws_url, "subscription transport open");

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(drive(
            socket,
            ws_url.to_string(),
            cmd_rx,
            event_tx,
            state.clone(),
            keep_alive,
        ));

        Ok((Self { cmd_tx, state }, event_rx))
    }

    pub async fn state(&self) -> SubscriptionState {
        *self.state.read().await
    }

    pub async fn subscribe(
        &self,
        key: impl Into<String>,
        frame: String,
    ) -> Result<(), WalletError> {
        self.cmd_tx
            .send(WsCommand::Subscribe {
                key: key.into(),
                frame,
            })
            .await
            .map_err(|_| WalletError::SubscriptionError("transport task is gone".to_string()))
    }

    pub async fn unsubscribe(
        &self,
        key: impl Into<String>,
        frame: String,
    ) -> Result<(), WalletError> {
        self.cmd_tx
            .send(WsCommand::Unsubscribe {
                key: key.into(),
                frame,
            })
            .await
            .map_err(|_| WalletError::SubscriptionError("transport task is gone".to_string()))
    }

    pub async fn close(&self) {
        let _ = self.cmd_tx.send(WsCommand::Close).await;
        *self.state.write().await = SubscriptionState::Closed;
    }

    pub(crate) async fn mark_subscribed(&self) {
        *self.state.write().await = SubscriptionState::Subscribed;
    }
}

/// Socket task. The inner loop runs one connection; a `true` break value
/// means the socket dropped unexpectedly and keep-alive may reconnect.
async fn drive(
    socket: WsStream,
    url: String,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
    event_tx: mpsc::Sender<IndexerEvent>,
    state: Arc<RwLock<SubscriptionState>>,
    keep_alive: bool,
) {
    let (mut write, mut read) = socket.split();
    let mut active: Vec<(String, String)> = Vec::new();

    'connected: loop {
        let dropped = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(WsCommand::Subscribe { key, frame }) => {
                        active.retain(|(k, _)| k != &key);
                        active.push((key, frame.clone()));
                        if write.send(Message::Text(frame)).await.is_err() {
                            break true;
                        }
                        *state.write().await = SubscriptionState::Subscribed;
                    }
                    Some(WsCommand::Unsubscribe { key, frame }) => {
                        active.retain(|(k, _)| k != &key);
                        let _ = write.send(Message::Text(frame)).await;
                        if active.is_empty() {
                            *state.write().await = SubscriptionState::Open;
                        }
                    }
                    Some(WsCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break false;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(frame))) => match parse_event(&frame) {
                        Some(event) => {
                            if event_tx.send(event).await.is_err() {
                                // Consumer went away; nothing left to feed.
                                break false;
                            }
                        }
                        None => debug!(frame = %frame, "dropping unrecognized subscription frame"),
                    },
                    Some(Ok(_)) => {} // ping/pong/binary
                    Some(Err(e)) => {
                        warn!(error = %e, "subscription socket error");
                        break true;
                    }
                    None => break true,
                },
            }
        };

        if !dropped || !keep_alive {
            *state.write().await = SubscriptionState::Closed;
            debug!("subscription transport closed");
            return;
        }

        // Unexpected drop with keep-alive on: reconnect with capped backoff,
        // then replay the active subscriptions.
        *state.write().await = SubscriptionState::Connecting;
        warn!("subscription transport dropped, reconnecting");
        let mut delay = RECONNECT_INITIAL_DELAY;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(WsCommand::Subscribe { key, frame }) => {
                        active.retain(|(k, _)| k != &key);
                        active.push((key, frame));
                    }
                    Some(WsCommand::Unsubscribe { key, .. }) => {
                        active.retain(|(k, _)| k != &key);
                    }
                    Some(WsCommand::Close) | None => {
                        *state.write().await = SubscriptionState::Closed;
                        return;
                    }
                },
                _ = tokio::time::sleep(delay) => {
                    match connect_async(url.as_str()).await {
                        Ok((socket, _)) => {
                            let (w, r) = socket.split();
                            write = w;
                            read = r;
                            for (_, frame) in &active {
                                let _ = write.send(Message::Text(frame.clone())).await;
                            }
                            *state.write().await = if active.is_empty() {
                                SubscriptionState::Open
                            } else {
                                SubscriptionState::Subscribed
                            };
                            info!("subscription transport reconnected");
                            continue 'connected;
                        }
                        Err(e) => {
                            warn!(error = %e, retry_in = ?delay, "subscription reconnect failed");
                            delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tx_confirmed() {
        let event = parse_event(r#"{"type": "Tx", "msgType": "TX_CONFIRMED", "txid": "ab"}"#);
        assert_eq!(
            event,
            Some(IndexerEvent::TxConfirmed {
                txid: Some("ab".to_string())
            })
        );
        assert!(event.unwrap().triggers_refresh());
    }

    #[test]
    fn test_parse_all_actionable_kinds() {
        for msg_type in [
            "TX_ADDED_TO_MEMPOOL",
            "TX_CONFIRMED",
            "TX_FINALIZED",
            "BLK_CONNECTED",
            "BLK_FINALIZED",
        ] {
            let frame = format!(r#"{{"msgType": "{}"}}"#, msg_type);
            let event = parse_event(&frame).unwrap();
            assert!(event.triggers_refresh(), "{} must trigger a refresh", msg_type);
        }
    }

    #[test]
    fn test_parse_block_event_carries_hash() {
        let event =
            parse_event(r#"{"msgType": "BLK_CONNECTED", "blockHash": "00ff"}"#).unwrap();
        assert_eq!(
            event,
            IndexerEvent::BlockConnected {
                block_hash: Some("00ff".to_string())
            }
        );
    }

    #[test]
    fn test_parse_unknown_kind_is_ignored_not_malformed() {
        let event = parse_event(r#"{"msgType": "TX_REMOVED_FROM_MEMPOOL"}"#).unwrap();
        assert_eq!(
            event,
            IndexerEvent::Other("TX_REMOVED_FROM_MEMPOOL".to_string())
        );
        assert!(!event.triggers_refresh());
    }

    #[test]
    fn test_parse_malformed_frames() {
        assert_eq!(parse_event("not json"), None);
        assert_eq!(parse_event("{}"), None);
        assert_eq!(parse_event(r#"{"msgType": 42}"#), None);
    }

    #[test]
    fn test_subscribe_frames() {
        let frame = subscribe_script_frame("p2pkh", "aabb");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "subscribe_script");
        assert_eq!(value["scriptType"], "p2pkh");
        assert_eq!(value["payload"], "aabb");

        let frame = unsubscribe_script_frame("p2pkh", "aabb");
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "unsubscribe_script");

        let frame = subscribe_blocks_frame();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "subscribe_blocks");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubscriptionState::Closed.to_string(), "closed");
        assert_eq!(SubscriptionState::Subscribed.to_string(), "subscribed");
    }

    #[tokio::test]
    async fn test_open_against_closed_port_fails() {
        let result = IndexerWs::open("ws://127.0.0.1:9", false).await;
        assert!(matches!(result, Err(WalletError::SubscriptionError(_))));
    }
}
