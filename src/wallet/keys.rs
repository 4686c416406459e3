//! Seed phrase handling and key derivation.
//!
//! A wallet is one secp256k1 keypair: the BIP39 phrase is stretched into a
//! seed and the first 32 bytes are taken as the private scalar directly.
//! This is a deliberate single-key design, not a BIP32/BIP44 account tree;
//! every wallet has exactly one receiving address.

use crate::core::errors::WalletError;
use bip39::{Language, Mnemonic};
use bitcoin::address::Address;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// 128 bits of entropy encode as 12 words.
const ENTROPY_BYTES: usize = 16;
pub const SEED_PHRASE_WORDS: usize = 12;

/// Generates a fresh checksum-valid 12-word seed phrase from OS randomness.
pub fn generate_seed_phrase() -> Result<Zeroizing<String>, WalletError> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::KeyDerivationError(format!("phrase generation failed: {}", e)))?;
    entropy.zeroize();

    debug!("generated new seed phrase");
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Trims, lowercases and collapses whitespace so pasted phrases survive
/// sloppy formatting.
pub fn normalize_seed_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word-list membership plus checksum, on the normalized phrase.
pub fn validate_seed_phrase(phrase: &str) -> bool {
    parse_phrase(phrase).is_ok()
}

fn parse_phrase(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = normalize_seed_phrase(phrase);
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Signing material handed to the transaction builder. `SecretKey` keeps the
/// scalar only for the duration of one send.
pub(crate) struct TxSigner {
    pub(crate) secret: SecretKey,
    pub(crate) public: PublicKey,
}

/// The wallet's single secp256k1 keypair.
pub struct WalletKeypair {
    secret_key: SecretVec<u8>,
    public_key: PublicKey,
}

impl WalletKeypair {
    /// Deterministic derivation: same phrase, same keys, every run.
    pub fn from_seed_phrase(phrase: &str) -> Result<Self, WalletError> {
        let mnemonic = parse_phrase(phrase)?;

        // PBKDF2 stretch, then the 32-byte prefix as the private scalar.
        let mut seed = mnemonic.to_seed("");
        let secret_key = SecretKey::from_slice(&seed[..32]).map_err(|e| {
            WalletError::KeyDerivationError(format!("seed prefix is not a valid scalar: {}", e))
        })?;

        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        let keypair = Self {
            secret_key: SecretVec::new(seed[..32].to_vec()),
            public_key,
        };
        seed.zeroize();

        Ok(keypair)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Compressed public key bytes.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    pub(crate) fn signer(&self) -> Result<TxSigner, WalletError> {
        let secret = SecretKey::from_slice(self.secret_key.expose_secret())
            .map_err(|e| WalletError::SigningFailed(format!("stored key invalid: {}", e)))?;
        Ok(TxSigner {
            secret,
            public: self.public_key,
        })
    }
}

impl fmt::Debug for WalletKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WalletKeypair {{ public_key: {}, secret_key: <redacted> }}",
            self.public_key
        )
    }
}

/// hash160 of the compressed public key, plus its P2PKH address text for the
/// given network.
pub fn derive_address(public_key: &PublicKey, network: Network) -> ([u8; 20], String) {
    let btc_pubkey = bitcoin::PublicKey::new(*public_key);
    let pk_hash = btc_pubkey.pubkey_hash();
    let address = Address::p2pkh(&btc_pubkey, network);
    (pk_hash.to_byte_array(), address.to_string())
}
