//! Command-line interface definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "wallet-cli",
    about = "Single-address UTXO hot wallet",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new wallet and persist its seed phrase
    Create,
    /// Import a wallet from an existing seed phrase
    Import {
        /// The 12-word seed phrase, quoted
        phrase: String,
    },
    /// Show the wallet address and current spendable balance
    Balance,
    /// Send satoshis to an address
    Send {
        /// Destination address
        to: String,
        /// Amount in satoshis
        amount: u64,
    },
    /// Follow live balance updates from the indexer until interrupted
    Watch,
    /// Print the stored seed phrase for backup
    ExportPhrase,
}
