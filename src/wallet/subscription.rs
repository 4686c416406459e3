//! Live balance updates over the indexer subscription.
//!
//! Drives the transport in `blockchain::ws` and reacts to the event kinds
//! that can move the balance: mempool acceptance, confirmation, finality and
//! new blocks. Each relevant event triggers a balance refresh and then the
//! registered observer, strictly in delivery order.

use crate::blockchain::indexer::SCRIPT_TYPE_P2PKH;
use crate::blockchain::ws::{
    subscribe_blocks_frame, subscribe_script_frame, unsubscribe_script_frame, IndexerEvent,
    IndexerWs, SubscriptionState,
};
use crate::wallet::balance;
use crate::wallet::session::SessionInner;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Live subscription bound to one wallet session.
pub(crate) struct SubscriptionHandle {
    transport: IndexerWs,
    consumer: JoinHandle<()>,
    /// Key hash the script subscription was issued for.
    script_payload: String,
}

/// Point-in-time view of the subscription, for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    pub state: SubscriptionState,
    pub wallet_initialized: bool,
    pub address: Option<String>,
}

/// Opens the transport and subscribes. `true` on success; every failure path
/// logs its cause and reports `false`, because a wallet without live updates
/// still works.
pub(crate) async fn start(inner: &Arc<SessionInner>) -> bool {
    let pk_hash_hex = {
        let state = inner.state.read().await;
        match state.identity() {
            Some(identity) => identity.pk_hash_hex(),
            None => {
                error!("cannot start subscription: wallet not initialized");
                return false;
            }
        }
    };

    // Restart semantics: an existing subscription is torn down first.
    stop(inner).await;

    let ws_url = inner.config.indexer.ws_url.clone();
    let keep_alive = inner.config.indexer.keep_alive;
    let (transport, events) = match IndexerWs::open(&ws_url, keep_alive).await {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "subscription transport failed to open");
            return false;
        }
    };

    // The script subscription is what the wallet lives on; failing to issue
    // it fails the start.
    let script_frame = subscribe_script_frame(SCRIPT_TYPE_P2PKH, &pk_hash_hex);
    if let Err(e) = transport
        .subscribe(format!("script:{}", pk_hash_hex), script_frame)
        .await
    {
        error!(error = %e, "script subscription failed");
        transport.close().await;
        return false;
    }

    // Block notifications are best-effort; confirmations still arrive as tx
    // events without them.
    if let Err(e) = transport.subscribe("blocks", subscribe_blocks_frame()).await {
        warn!(error = %e, "block subscription failed, continuing without it");
    }
    transport.mark_subscribed().await;

    let consumer = tokio::spawn(consume_events(inner.clone(), events));

    *inner.subscription.lock().await = Some(SubscriptionHandle {
        transport,
        consumer,
        script_payload: pk_hash_hex,
    });
    info!("subscription active");
    true
}

/// Unsubscribes, closes the transport and clears the handle. Idempotent;
/// teardown problems are logged, never thrown.
pub(crate) async fn stop(inner: &Arc<SessionInner>) {
    let handle = inner.subscription.lock().await.take();
    match handle {
        Some(handle) => {
            let frame = unsubscribe_script_frame(SCRIPT_TYPE_P2PKH, &handle.script_payload);
            if let Err(e) = handle
                .transport
                .unsubscribe(format!("script:{}", handle.script_payload), frame)
                .await
            {
                warn!(error = %e, "unsubscribe failed during teardown");
            }
            handle.transport.close().await;
            handle.consumer.abort();
            info!("subscription stopped");
        }
        None => debug!("stop_subscription: nothing active"),
    }
}

pub(crate) async fn status(inner: &Arc<SessionInner>) -> SubscriptionStatus {
    let state = {
        let guard = inner.subscription.lock().await;
        match guard.as_ref() {
            Some(handle) => handle.transport.state().await,
            None => SubscriptionState::Closed,
        }
    };
    let (wallet_initialized, address) = {
        let wallet = inner.state.read().await;
        (
            wallet.is_initialized(),
            wallet.identity().map(|id| id.address.clone()),
        )
    };
    SubscriptionStatus {
        state,
        wallet_initialized,
        address,
    }
}

/// Single consumer: events are handled one at a time in the order the
/// transport delivered them, and the observer only runs after the refresh
/// that produced its value.
async fn consume_events(inner: Arc<SessionInner>, mut events: mpsc::Receiver<IndexerEvent>) {
    while let Some(event) = events.recv().await {
        if !event.triggers_refresh() {
            debug!(event = ?event, "ignoring subscription event");
            continue;
        }

        debug!(event = ?event, "chain event, refreshing balance");
        match balance::refresh(&inner).await {
            Ok(refresh) => {
                let sats = refresh.sats();
                if let Some(callback) = inner.observer.read().await.as_ref() {
                    callback(sats);
                }
            }
            Err(e) => warn!(error = %e, "event-driven balance refresh failed"),
        }
    }
}
