//! Spend-commitment signature digest.
//!
//! Per-input digest in the BIP143 shape with the fork-id flag: the preimage
//! commits to the whole transaction plus the exact value and locking script
//! of the output being spent, which closes off classic malleability and
//! fee-rewrite games against the signer.

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{ScriptBuf, Transaction};

/// SIGHASH_ALL with the fork-id bit; also appended to each signature.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(bytes).to_byte_array()
}

/// Digest signed for `tx.input[index]`, committing to `value` and
/// `script_code` of the spent output.
pub(crate) fn spend_digest(
    tx: &Transaction,
    index: usize,
    script_code: &ScriptBuf,
    value: u64,
) -> [u8; 32] {
    let mut prevouts = Vec::new();
    for input in &tx.input {
        prevouts.extend_from_slice(&serialize(&input.previous_output));
    }
    let hash_prevouts = double_sha256(&prevouts);

    let mut sequences = Vec::new();
    for input in &tx.input {
        sequences.extend_from_slice(&input.sequence.to_consensus_u32().to_le_bytes());
    }
    let hash_sequences = double_sha256(&sequences);

    let mut outputs = Vec::new();
    for output in &tx.output {
        outputs.extend_from_slice(&serialize(output));
    }
    let hash_outputs = double_sha256(&outputs);

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend_from_slice(&tx.version.0.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequences);
    preimage.extend_from_slice(&serialize(&tx.input[index].previous_output));
    preimage.extend_from_slice(&serialize(script_code));
    preimage.extend_from_slice(&value.to_le_bytes());
    preimage.extend_from_slice(&tx.input[index].sequence.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());

    double_sha256(&preimage)
}
