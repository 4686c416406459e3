//! In-memory wallet aggregate.

use crate::wallet::keys::WalletKeypair;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::{PubkeyHash, ScriptBuf};
use serde::Serialize;
use std::fmt;
use zeroize::Zeroizing;

/// Identity fields of a populated wallet. Constructed whole, so a session is
/// either empty or fully derived; there is no partially-valid state.
pub(crate) struct WalletIdentity {
    pub(crate) seed_phrase: Zeroizing<String>,
    pub(crate) keypair: WalletKeypair,
    pub(crate) pk_hash: [u8; 20],
    pub(crate) address: String,
}

impl WalletIdentity {
    pub(crate) fn pk_hash_hex(&self) -> String {
        hex::encode(self.pk_hash)
    }

    /// The wallet's own P2PKH locking script; change always pays back here.
    pub(crate) fn locking_script(&self) -> ScriptBuf {
        let hash = PubkeyHash::from_raw_hash(hash160::Hash::from_byte_array(self.pk_hash));
        ScriptBuf::new_p2pkh(&hash)
    }
}

/// Session-owned wallet state. The balance is a derived cache over the
/// indexer's UTXO set, never a source of truth.
#[derive(Default)]
pub struct WalletState {
    identity: Option<WalletIdentity>,
    balance: u64,
}

impl WalletState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some()
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub(crate) fn identity(&self) -> Option<&WalletIdentity> {
        self.identity.as_ref()
    }

    /// Installs a freshly derived identity. Re-import replaces every identity
    /// field and resets the cached balance until the next refresh.
    pub(crate) fn populate(&mut self, identity: WalletIdentity) {
        self.identity = Some(identity);
        self.balance = 0;
    }

    pub(crate) fn set_balance(&mut self, sats: u64) {
        self.balance = sats;
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            address: self.identity.as_ref().map(|id| id.address.clone()),
            balance: self.balance,
            initialized: self.identity.is_some(),
        }
    }
}

impl fmt::Debug for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets never land in logs; render the public view only.
        f.debug_struct("WalletState")
            .field("address", &self.identity.as_ref().map(|id| &id.address))
            .field("balance", &self.balance)
            .field("initialized", &self.identity.is_some())
            .finish()
    }
}

/// Public, serializable view of the wallet; carries no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSnapshot {
    pub address: Option<String>,
    pub balance: u64,
    pub initialized: bool,
}
