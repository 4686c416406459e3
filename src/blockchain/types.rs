//! UTXO (Unspent Transaction Output) types and selection.

use crate::core::errors::WalletError;
use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Non-native asset attached to an output by the token protocol the indexer
/// tracks. Outputs carrying one are invisible to plain-coin arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub token_id: String,
    #[serde(default)]
    pub amount: u64,
}

/// Unspent transaction output as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    /// Funding transaction ID.
    pub txid: String,
    /// Output index within the funding transaction.
    pub out_idx: u32,
    /// Value in satoshis.
    pub sats: u64,
    /// Locking script, hex encoded.
    pub script: String,
    /// Token payload, when the output carries a non-native asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenPayload>,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, out_idx: u32, sats: u64, script: impl Into<String>) -> Self {
        Self {
            txid: txid.into(),
            out_idx,
            sats,
            script: script.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token_id: impl Into<String>, amount: u64) -> Self {
        self.token = Some(TokenPayload {
            token_id: token_id.into(),
            amount,
        });
        self
    }

    /// Token-bearing outputs are never spent or counted by this wallet.
    pub fn is_token_bearing(&self) -> bool {
        self.token.is_some()
    }

    pub fn outpoint(&self) -> Result<OutPoint, WalletError> {
        let txid = Txid::from_str(&self.txid)
            .map_err(|e| WalletError::SerializationError(format!("invalid txid: {}", e)))?;
        Ok(OutPoint {
            txid,
            vout: self.out_idx,
        })
    }
}

/// Sums the spendable (token-free) values, `None` on overflow.
pub fn spendable_sum(utxos: &[Utxo]) -> Option<u64> {
    utxos
        .iter()
        .filter(|u| !u.is_token_bearing())
        .try_fold(0u64, |acc, u| acc.checked_add(u.sats))
}

/// Greedy accumulation in the order the indexer returned the set, until the
/// running total covers `target`. No sorting: the first outputs the indexer
/// reports are the first spent.
pub fn select_in_order(utxos: &[Utxo], target: u64) -> Result<(Vec<Utxo>, u64), WalletError> {
    let mut selected = Vec::new();
    let mut total = 0u64;

    for utxo in utxos {
        selected.push(utxo.clone());
        total = total
            .checked_add(utxo.sats)
            .ok_or_else(|| WalletError::InternalError("utxo value sum overflow".to_string()))?;

        if total >= target {
            debug!(inputs = selected.len(), total, target, "utxo selection complete");
            return Ok((selected, total));
        }
    }

    Err(WalletError::InsufficientFunds(format!(
        "need {} sats but only {} sats are spendable ({} short)",
        target,
        total,
        target - total
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(txid: &str, sats: u64) -> Utxo {
        Utxo::new(txid, 0, sats, "76a914000000000000000000000000000000000000000088ac")
    }

    #[test]
    fn test_deserialize_plain_utxo() {
        let utxo: Utxo = serde_json::from_str(
            r#"{"txid": "ab", "outIdx": 3, "sats": 1200, "script": "76a914"}"#,
        )
        .unwrap();
        assert_eq!(utxo.out_idx, 3);
        assert_eq!(utxo.sats, 1200);
        assert!(!utxo.is_token_bearing());
    }

    #[test]
    fn test_deserialize_token_utxo() {
        let utxo: Utxo = serde_json::from_str(
            r#"{"txid": "ab", "outIdx": 0, "sats": 546, "script": "76a914",
                "token": {"tokenId": "deadbeef", "amount": 500}}"#,
        )
        .unwrap();
        assert!(utxo.is_token_bearing());
        assert_eq!(utxo.token.unwrap().amount, 500);
    }

    #[test]
    fn test_spendable_sum_skips_tokens() {
        let utxos = vec![
            plain("t1", 2_000),
            plain("t2", 5_000).with_token("deadbeef", 10),
            plain("t3", 300),
        ];
        assert_eq!(spendable_sum(&utxos), Some(2_300));
    }

    #[test]
    fn test_spendable_sum_overflow() {
        let utxos = vec![plain("t1", u64::MAX), plain("t2", 1)];
        assert_eq!(spendable_sum(&utxos), None);
    }

    #[test]
    fn test_select_preserves_indexer_order() {
        // Deliberately not sorted by value; selection must walk in order.
        let utxos = vec![plain("t1", 100), plain("t2", 900), plain("t3", 10_000)];
        let (selected, total) = select_in_order(&utxos, 1_000).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].txid, "t1");
        assert_eq!(selected[1].txid, "t2");
        assert_eq!(total, 1_000);
    }

    #[test]
    fn test_select_exact_target_boundary() {
        let utxos = vec![plain("t1", 1_999)];
        let result = select_in_order(&utxos, 2_000);
        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));

        let utxos = vec![plain("t1", 2_000)];
        let (selected, total) = select_in_order(&utxos, 2_000).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(total, 2_000);
    }

    #[test]
    fn test_select_reports_shortfall() {
        let utxos = vec![plain("t1", 500), plain("t2", 200)];
        let err = select_in_order(&utxos, 1_000).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("need 1000"));
        assert!(msg.contains("300 short"));
    }

    #[test]
    fn test_select_empty_set() {
        let result = select_in_order(&[], 1);
        assert!(matches!(result, Err(WalletError::InsufficientFunds(_))));
    }

    #[test]
    fn test_outpoint_parsing() {
        let utxo = plain(
            "0000000000000000000000000000000000000000000000000000000000000001",
            1_000,
        );
        let outpoint = utxo.outpoint().unwrap();
        assert_eq!(outpoint.vout, 0);

        let bad = plain("not-a-txid", 1_000);
        assert!(bad.outpoint().is_err());
    }
}
