use bitcoin::Network;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Chain-indexer endpoints and query behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL of the indexer REST API.
    #[serde(default = "IndexerConfig::default_base_url")]
    pub base_url: String,

    /// WebSocket endpoint for the live event subscription.
    #[serde(default = "IndexerConfig::default_ws_url")]
    pub ws_url: String,

    /// Bound on the balance query (seconds). The query degrades to a zero
    /// balance when it elapses; it is the only bounded network call.
    #[serde(default = "IndexerConfig::default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Reconnect the subscription transport with backoff on unexpected drops.
    #[serde(default = "IndexerConfig::default_keep_alive")]
    pub keep_alive: bool,
}

impl IndexerConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:8331".to_string()
    }
    fn default_ws_url() -> String {
        "ws://127.0.0.1:8331/ws".to_string()
    }
    fn default_query_timeout_secs() -> u64 {
        10
    }
    fn default_keep_alive() -> bool {
        true
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            ws_url: Self::default_ws_url(),
            query_timeout_secs: Self::default_query_timeout_secs(),
            keep_alive: Self::default_keep_alive(),
        }
    }
}

/// Fee and selection policy, in satoshis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee rate applied to the estimated transaction size.
    #[serde(default = "FeeConfig::default_fee_per_kb")]
    pub fee_per_kb: u64,

    /// Outputs below this value are uneconomical and never created.
    #[serde(default = "FeeConfig::default_dust_limit")]
    pub dust_limit: u64,

    /// Flat safety margin added to the target during UTXO selection; the
    /// real fee is computed from the assembled transaction size.
    #[serde(default = "FeeConfig::default_selection_margin")]
    pub selection_margin: u64,
}

impl FeeConfig {
    fn default_fee_per_kb() -> u64 {
        1_000
    }
    fn default_dust_limit() -> u64 {
        546
    }
    fn default_selection_margin() -> u64 {
        1_000
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_per_kb: Self::default_fee_per_kb(),
            dust_limit: Self::default_dust_limit(),
            selection_margin: Self::default_selection_margin(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_database_url")]
    pub database_url: String,
}

impl StorageConfig {
    fn default_database_url() -> String {
        "sqlite://wallet.db".to_string()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: Self::default_database_url(),
        }
    }
}

/// Wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Network name: "bitcoin", "testnet", "signet" or "regtest".
    #[serde(default = "WalletConfig::default_network")]
    pub network: String,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl WalletConfig {
    fn default_network() -> String {
        "bitcoin".to_string()
    }

    /// Maps the configured network name onto the chain parameters used for
    /// address encoding. Unknown names fall back to mainnet.
    pub fn network(&self) -> Network {
        match self.network.as_str() {
            "bitcoin" | "mainnet" => Network::Bitcoin,
            "testnet" => Network::Testnet,
            "signet" => Network::Signet,
            "regtest" => Network::Regtest,
            other => {
                warn!(network = %other, "unknown network name, falling back to mainnet");
                Network::Bitcoin
            }
        }
    }

    /// Builds a config from defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("WALLET_INDEXER_URL") {
            config.indexer.base_url = url;
        }
        if let Ok(url) = std::env::var("WALLET_INDEXER_WS_URL") {
            config.indexer.ws_url = url;
        }
        if let Ok(url) = std::env::var("WALLET_DATABASE_URL") {
            config.storage.database_url = url;
        }
        if let Ok(network) = std::env::var("WALLET_NETWORK") {
            config.network = network;
        }
        config
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Self::default_network(),
            indexer: IndexerConfig::default(),
            fees: FeeConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
