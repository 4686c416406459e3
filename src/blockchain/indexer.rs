//! Chain-indexer REST client.
//!
//! Thin HTTP wrapper over the two endpoints this wallet consumes: the UTXO
//! set of a script and the broadcast endpoint.

use crate::blockchain::types::Utxo;
use crate::core::errors::WalletError;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::{debug, info};

/// Script type tag used for every query this wallet makes.
pub const SCRIPT_TYPE_P2PKH: &str = "p2pkh";

/// Chain-indexer HTTP client.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    base_url: String,
    http_client: HttpClient,
}

#[derive(Debug, Deserialize)]
struct UtxoPage {
    utxos: Vec<Utxo>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client: HttpClient::new(),
        }
    }

    /// Fetches the unspent outputs locked to `payload_hex` under the given
    /// script type. Returns the set in indexer order, token entries included.
    pub async fn script_utxos(
        &self,
        script_type: &str,
        payload_hex: &str,
    ) -> Result<Vec<Utxo>, WalletError> {
        let url = format!(
            "{}/script/{}/{}/utxos",
            self.base_url, script_type, payload_hex
        );
        debug!(url = %url, "querying utxo set");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("utxo query failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "utxo query returned {}",
                response.status()
            )));
        }

        let page: UtxoPage = response
            .json()
            .await
            .map_err(|e| WalletError::SerializationError(format!("utxo response: {}", e)))?;

        debug!(count = page.utxos.len(), "utxo set received");
        Ok(page.utxos)
    }

    /// Submits a serialized transaction. A client-error status is the indexer
    /// declining the transaction (fee too low, double spend); anything else
    /// that goes wrong on the wire is a network failure.
    pub async fn broadcast_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        let url = format!("{}/broadcast-tx", self.base_url);
        info!("broadcasting transaction");

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "rawTx": raw_tx_hex }))
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("broadcast failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: BroadcastResponse = response
                .json()
                .await
                .map_err(|e| WalletError::SerializationError(format!("broadcast response: {}", e)))?;
            info!(txid = %body.txid, "transaction accepted by indexer");
            return Ok(body.txid);
        }

        if status.is_client_error() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| format!("indexer rejected transaction ({})", status));
            return Err(WalletError::BroadcastRejected(message));
        }

        Err(WalletError::NetworkError(format!(
            "broadcast returned {}",
            status
        )))
    }
}
