//! Spendable-balance tracking.
//!
//! The balance query is bounded by a timeout and degrades to zero on any
//! failure instead of propagating: the UI must never hang on the indexer.
//! The cost is that an indexer outage looks like an empty wallet, so the
//! outcome type keeps the degradation visible to callers who care.

use crate::blockchain::indexer::SCRIPT_TYPE_P2PKH;
use crate::blockchain::types::spendable_sum;
use crate::core::errors::WalletError;
use crate::wallet::session::SessionInner;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one balance refresh.
#[derive(Debug)]
pub enum BalanceRefresh {
    /// The indexer answered; this is the sum of token-free UTXO values.
    Queried(u64),
    /// Query failed or timed out; the balance was set to zero and the cause
    /// is carried here rather than thrown.
    DegradedZero(WalletError),
}

impl BalanceRefresh {
    pub fn sats(&self) -> u64 {
        match self {
            BalanceRefresh::Queried(sats) => *sats,
            BalanceRefresh::DegradedZero(_) => 0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, BalanceRefresh::DegradedZero(_))
    }
}

/// Recomputes the spendable balance from the indexer's UTXO set and writes it
/// into the wallet state. Requires a populated session.
pub(crate) async fn refresh(inner: &SessionInner) -> Result<BalanceRefresh, WalletError> {
    let pk_hash_hex = {
        let state = inner.state.read().await;
        state
            .identity()
            .ok_or(WalletError::WalletNotInitialized)?
            .pk_hash_hex()
    };

    let timeout = Duration::from_secs(inner.config.indexer.query_timeout_secs);
    let query = inner.indexer.script_utxos(SCRIPT_TYPE_P2PKH, &pk_hash_hex);

    let outcome = match tokio::time::timeout(timeout, query).await {
        Ok(Ok(utxos)) => match spendable_sum(&utxos) {
            Some(total) => {
                debug!(
                    utxos = utxos.len(),
                    spendable = utxos.iter().filter(|u| !u.is_token_bearing()).count(),
                    total,
                    "balance recomputed"
                );
                BalanceRefresh::Queried(total)
            }
            None => BalanceRefresh::DegradedZero(WalletError::InternalError(
                "utxo value sum overflow".to_string(),
            )),
        },
        Ok(Err(e)) => {
            warn!(error = %e, "utxo query failed, treating balance as zero");
            BalanceRefresh::DegradedZero(e)
        }
        Err(_) => {
            let cause = WalletError::NetworkError(format!(
                "utxo query timed out after {}s",
                inner.config.indexer.query_timeout_secs
            ));
            warn!(error = %cause, "treating balance as zero");
            BalanceRefresh::DegradedZero(cause)
        }
    };

    inner.state.write().await.set_balance(outcome.sats());
    Ok(outcome)
}
