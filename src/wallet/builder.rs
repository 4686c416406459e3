//! Transaction assembly, fee computation and signing.

use crate::blockchain::indexer::SCRIPT_TYPE_P2PKH;
use crate::blockchain::types::{select_in_order, Utxo};
use crate::core::errors::WalletError;
use crate::wallet::keys::TxSigner;
use crate::wallet::session::SessionInner;
use crate::wallet::sighash::{spend_digest, SIGHASH_ALL_FORKID};
use crate::wallet::balance;
use bitcoin::absolute::LockTime;
use bitcoin::address::Address;
use bitcoin::blockdata::script::Builder;
use bitcoin::consensus::encode::serialize;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::str::FromStr;
use tracing::{debug, info};

// Conservative vbyte sizes for a signed P2PKH input and a P2PKH output.
const TX_OVERHEAD_VBYTES: u64 = 10;
const INPUT_VBYTES: u64 = 148;
const OUTPUT_VBYTES: u64 = 34;

/// Estimated serialized size of a fully signed transaction.
pub fn estimate_vbytes(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES + INPUT_VBYTES * inputs as u64 + OUTPUT_VBYTES * outputs as u64
}

/// Size-based fee at `fee_per_kb`, rounded up.
pub fn fee_for(inputs: usize, outputs: usize, fee_per_kb: u64) -> u64 {
    (estimate_vbytes(inputs, outputs) * fee_per_kb + 999) / 1_000
}

/// A signed transaction plus the fee/change split that produced it.
pub(crate) struct TxPlan {
    pub(crate) tx: Transaction,
    pub(crate) fee: u64,
    pub(crate) change: u64,
}

/// Builds, signs and broadcasts a spend of `amount` satoshis, then refreshes
/// the balance. Preconditions are checked in a fixed order, each with its own
/// failure, before any network call is made.
pub(crate) async fn build_and_send(
    inner: &SessionInner,
    to_address: &str,
    amount: u64,
) -> Result<String, WalletError> {
    // 1. Wallet must be populated.
    let (signer, own_script, pk_hash_hex, cached_balance) = {
        let state = inner.state.read().await;
        let identity = state.identity().ok_or(WalletError::WalletNotInitialized)?;
        (
            identity.keypair.signer()?,
            identity.locking_script(),
            identity.pk_hash_hex(),
            state.balance(),
        )
    };

    // 2. Amount must be positive.
    if amount == 0 {
        return Err(WalletError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }

    // 3. Optimistic pre-check against the last-known balance. A concurrent
    // spend can still win the race; the indexer rejects the loser.
    if amount > cached_balance {
        return Err(WalletError::InsufficientFunds(format!(
            "amount {} sats exceeds last-known balance of {} sats",
            amount, cached_balance
        )));
    }

    let dest_script = parse_destination(inner, to_address)?;

    // Always work from a fresh UTXO set, never the cached balance.
    let all_utxos = inner
        .indexer
        .script_utxos(SCRIPT_TYPE_P2PKH, &pk_hash_hex)
        .await?;
    let spendable: Vec<Utxo> = all_utxos
        .iter()
        .filter(|u| !u.is_token_bearing())
        .cloned()
        .collect();
    debug!(
        total = all_utxos.len(),
        spendable = spendable.len(),
        "utxo set fetched for spend"
    );

    if spendable.is_empty() {
        return Err(WalletError::NoSpendableFunds(
            "every available utxo carries a token payload; receive plain coins to spend"
                .to_string(),
        ));
    }

    // Flat margin covers the yet-unknown fee during selection; the real fee
    // comes out of the assembled size below.
    let target = amount
        .checked_add(inner.config.fees.selection_margin)
        .ok_or_else(|| WalletError::InvalidAmount("amount overflows".to_string()))?;
    let (selected, total_in) = select_in_order(&spendable, target)?;

    let plan = assemble_and_sign(
        &signer,
        &selected,
        total_in,
        dest_script,
        own_script,
        amount,
        inner.config.fees.fee_per_kb,
        inner.config.fees.dust_limit,
    )?;

    let raw_tx_hex = hex::encode(serialize(&plan.tx));
    let txid = inner.indexer.broadcast_tx(&raw_tx_hex).await?;

    // The spend changed the UTXO set; refresh before handing back control.
    // A degraded refresh is not a send failure.
    let _ = balance::refresh(inner).await;

    info!(txid = %txid, amount, fee = plan.fee, change = plan.change, "transaction sent");
    Ok(txid)
}

fn parse_destination(inner: &SessionInner, to_address: &str) -> Result<ScriptBuf, WalletError> {
    let network = inner.config.network();
    let address = Address::from_str(to_address)
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", to_address, e)))?
        .require_network(network)
        .map_err(|e| WalletError::InvalidAddress(format!("wrong network: {}", e)))?;
    Ok(address.script_pubkey())
}

/// Assembles one destination output plus change back to the wallet, computes
/// the size-based fee, drops the change output when it would be dust, and
/// signs every input with a commitment to the spent value and script.
#[allow(clippy::too_many_arguments)]
pub(crate) fn assemble_and_sign(
    signer: &TxSigner,
    selected: &[Utxo],
    total_in: u64,
    dest_script: ScriptBuf,
    own_script: ScriptBuf,
    amount: u64,
    fee_per_kb: u64,
    dust_limit: u64,
) -> Result<TxPlan, WalletError> {
    let inputs = selected
        .iter()
        .map(|utxo| {
            Ok(TxIn {
                previous_output: utxo.outpoint()?,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>, WalletError>>()?;

    let fee_with_change = fee_for(selected.len(), 2, fee_per_kb);
    let fee_without_change = fee_for(selected.len(), 1, fee_per_kb);

    let destination = TxOut {
        value: Amount::from_sat(amount),
        script_pubkey: dest_script,
    };

    let change_after_fee = amount
        .checked_add(fee_with_change)
        .and_then(|spent| total_in.checked_sub(spent));

    let (outputs, fee, change) = match change_after_fee {
        Some(change) if change >= dust_limit => {
            let change_output = TxOut {
                value: Amount::from_sat(change),
                script_pubkey: own_script,
            };
            (vec![destination, change_output], fee_with_change, change)
        }
        _ => {
            // Change below the dust threshold is uneconomical to create; the
            // remainder is absorbed into the fee.
            let fee = total_in
                .checked_sub(amount)
                .filter(|fee| *fee >= fee_without_change)
                .ok_or_else(|| {
                    WalletError::InsufficientFunds(format!(
                        "{} sats in cannot cover {} sats out plus a {} sat fee",
                        total_in, amount, fee_without_change
                    ))
                })?;
            (vec![destination], fee, 0)
        }
    };

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let secp = Secp256k1::new();
    for (index, utxo) in selected.iter().enumerate() {
        let script_code = ScriptBuf::from_hex(&utxo.script)
            .map_err(|e| WalletError::SigningFailed(format!("invalid locking script: {}", e)))?;

        let digest = spend_digest(&tx, index, &script_code, utxo.sats);
        let signature = secp.sign_ecdsa(&Message::from_digest(digest), &signer.secret);

        let mut sig_bytes = signature.serialize_der().to_vec();
        sig_bytes.push(SIGHASH_ALL_FORKID as u8);

        let sig_push = PushBytesBuf::try_from(sig_bytes)
            .map_err(|e| WalletError::SigningFailed(format!("signature push: {:?}", e)))?;
        let pk_push = PushBytesBuf::try_from(signer.public.serialize().to_vec())
            .map_err(|e| WalletError::SigningFailed(format!("pubkey push: {:?}", e)))?;

        tx.input[index].script_sig = Builder::new()
            .push_slice(sig_push)
            .push_slice(pk_push)
            .into_script();
    }

    debug!(
        txid = %tx.txid(),
        inputs = tx.input.len(),
        outputs = tx.output.len(),
        fee,
        change,
        "transaction assembled and signed"
    );
    Ok(TxPlan { tx, fee, change })
}
