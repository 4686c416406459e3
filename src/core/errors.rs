use std::fmt;

/// Custom error type for wallet operations.
#[derive(Debug)]
pub enum WalletError {
    /// Seed phrase failed word-list or checksum validation.
    InvalidMnemonic(String),
    /// Operation requires a populated wallet session.
    WalletNotInitialized,
    /// Send amount is zero or otherwise unusable.
    InvalidAmount(String),
    /// Spendable inputs do not cover the requested amount.
    InsufficientFunds(String),
    /// Every available UTXO carries a token payload and cannot be spent here.
    NoSpendableFunds(String),
    /// The indexer declined the submitted transaction.
    BroadcastRejected(String),
    /// Indexer unreachable, transport failure, or query timeout.
    NetworkError(String),
    /// Subscription transport setup or teardown failure.
    SubscriptionError(String),
    /// Destination address could not be parsed for the configured network.
    InvalidAddress(String),
    /// Key material could not be derived from the seed phrase.
    KeyDerivationError(String),
    /// Transaction input could not be signed.
    SigningFailed(String),
    /// Key-value store errors.
    StorageError(String),
    /// Serialization/deserialization errors.
    SerializationError(String),
    /// Internal errors.
    InternalError(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletError::InvalidMnemonic(msg) => write!(f, "Invalid mnemonic: {}", msg),
            WalletError::WalletNotInitialized => write!(f, "Wallet not initialized"),
            WalletError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            WalletError::InsufficientFunds(msg) => write!(f, "Insufficient funds: {}", msg),
            WalletError::NoSpendableFunds(msg) => write!(f, "No spendable funds: {}", msg),
            WalletError::BroadcastRejected(msg) => write!(f, "Broadcast rejected: {}", msg),
            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::SubscriptionError(msg) => write!(f, "Subscription error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            WalletError::KeyDerivationError(msg) => write!(f, "Key derivation error: {}", msg),
            WalletError::SigningFailed(msg) => write!(f, "Signing failed: {}", msg),
            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            WalletError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

impl WalletError {
    /// True for transient transport failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::NetworkError(_) | WalletError::SubscriptionError(_)
        )
    }

    /// True for failures caused by caller input rather than the environment.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            WalletError::InvalidMnemonic(_)
                | WalletError::InvalidAmount(_)
                | WalletError::InvalidAddress(_)
        )
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(err: sqlx::Error) -> Self {
        WalletError::StorageError(err.to_string())
    }
}
