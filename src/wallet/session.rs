//! Wallet session: the owner of all mutable wallet state.
//!
//! One `WalletSession` is one wallet. The handle is cheap to clone and every
//! operation goes through it, so multiple sessions can coexist in a process
//! and tests never touch shared globals. Callers must not run
//! `send_transaction` concurrently against the same wallet: selection reads
//! an unlocked snapshot of the UTXO set, and two racing spends can pick
//! overlapping inputs (the indexer rejects the loser as a double spend).

use crate::blockchain::indexer::IndexerClient;
use crate::core::config::WalletConfig;
use crate::core::errors::WalletError;
use crate::storage::{KeyValueStore, SEED_PHRASE_KEY};
use crate::wallet::balance::{self, BalanceRefresh};
use crate::wallet::builder;
use crate::wallet::keys::{self, WalletKeypair};
use crate::wallet::state::{WalletIdentity, WalletSnapshot, WalletState};
use crate::wallet::subscription::{self, SubscriptionHandle, SubscriptionStatus};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Observer invoked with the new balance after each event-driven refresh.
pub type BalanceCallback = Box<dyn Fn(u64) + Send + Sync + 'static>;

pub(crate) struct SessionInner {
    pub(crate) config: WalletConfig,
    pub(crate) indexer: IndexerClient,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) state: RwLock<WalletState>,
    pub(crate) observer: RwLock<Option<BalanceCallback>>,
    pub(crate) subscription: Mutex<Option<SubscriptionHandle>>,
}

/// Handle to one wallet session.
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<SessionInner>,
}

impl WalletSession {
    pub fn new(config: WalletConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let indexer = IndexerClient::new(config.indexer.base_url.clone());
        Self {
            inner: Arc::new(SessionInner {
                config,
                indexer,
                store,
                state: RwLock::new(WalletState::new()),
                observer: RwLock::new(None),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Loads the persisted wallet, if one exists. Safe to call on a fresh
    /// store; the session simply stays uninitialized.
    pub async fn initialize_wallet(&self) -> Result<WalletSnapshot, WalletError> {
        if let Some(phrase) = self.inner.store.get(SEED_PHRASE_KEY).await? {
            self.load_from_phrase(&phrase).await?;
        }
        Ok(self.get_wallet_state().await)
    }

    /// Generates a fresh seed phrase, populates the session and persists the
    /// phrase under the fixed store key.
    pub async fn create_new_wallet(&self) -> Result<WalletSnapshot, WalletError> {
        let phrase = keys::generate_seed_phrase()?;
        self.load_from_phrase(&phrase).await?;
        self.inner.store.set(SEED_PHRASE_KEY, &phrase).await?;
        info!("new wallet created and persisted");
        Ok(self.get_wallet_state().await)
    }

    /// Imports a caller-supplied seed phrase. An invalid phrase fails with
    /// `InvalidMnemonic` and leaves any previously loaded wallet untouched.
    pub async fn import_wallet(&self, phrase: &str) -> Result<WalletSnapshot, WalletError> {
        let normalized = keys::normalize_seed_phrase(phrase);
        self.load_from_phrase(&normalized).await?;
        self.inner.store.set(SEED_PHRASE_KEY, &normalized).await?;
        info!("wallet imported");
        Ok(self.get_wallet_state().await)
    }

    /// Derives the identity, installs it atomically, then attempts an initial
    /// balance refresh. Derivation happens before any state is touched, so a
    /// failed import cannot leave the session half-populated.
    async fn load_from_phrase(&self, phrase: &str) -> Result<(), WalletError> {
        let keypair = WalletKeypair::from_seed_phrase(phrase)?;
        let (pk_hash, address) =
            keys::derive_address(keypair.public_key(), self.inner.config.network());

        {
            let mut state = self.inner.state.write().await;
            state.populate(WalletIdentity {
                seed_phrase: Zeroizing::new(phrase.to_string()),
                keypair,
                pk_hash,
                address: address.clone(),
            });
        }
        info!(address = %address, "wallet loaded");

        match balance::refresh(&self.inner).await {
            Ok(refresh) if refresh.is_degraded() => {
                warn!("initial balance refresh degraded; starting from zero")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "initial balance refresh failed"),
        }
        Ok(())
    }

    /// Recomputes the spendable balance from the indexer. Query failures
    /// come back as a degraded zero outcome rather than an error.
    pub async fn refresh_balance(&self) -> Result<BalanceRefresh, WalletError> {
        balance::refresh(&self.inner).await
    }

    /// Spends `amount` satoshis to `to_address` and returns the txid.
    pub async fn send_transaction(
        &self,
        to_address: &str,
        amount: u64,
    ) -> Result<String, WalletError> {
        builder::build_and_send(&self.inner, to_address, amount).await
    }

    pub async fn get_wallet_state(&self) -> WalletSnapshot {
        self.inner.state.read().await.snapshot()
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.state.read().await.is_initialized()
    }

    /// Whether a seed phrase is persisted, regardless of session state.
    pub async fn has_stored_wallet(&self) -> Result<bool, WalletError> {
        Ok(self.inner.store.get(SEED_PHRASE_KEY).await?.is_some())
    }

    /// Hands out the seed phrase for backup. The caller owns keeping it off
    /// screens and logs.
    pub async fn export_seed_phrase(&self) -> Result<Zeroizing<String>, WalletError> {
        let state = self.inner.state.read().await;
        let identity = state.identity().ok_or(WalletError::WalletNotInitialized)?;
        Ok(identity.seed_phrase.clone())
    }

    /// Registers the balance observer. One slot: a second registration
    /// replaces the first.
    pub async fn on_balance_update<F>(&self, callback: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        *self.inner.observer.write().await = Some(Box::new(callback));
    }

    /// Opens the live event subscription. Returns `false` (with the cause
    /// logged) instead of failing: a wallet without live updates is degraded
    /// but usable.
    pub async fn start_subscription(&self) -> bool {
        subscription::start(&self.inner).await
    }

    /// Tears down the live subscription; a no-op when none is active.
    pub async fn stop_subscription(&self) {
        subscription::stop(&self.inner).await
    }

    pub async fn get_subscription_status(&self) -> SubscriptionStatus {
        subscription::status(&self.inner).await
    }
}
