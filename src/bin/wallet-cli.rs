use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use utxo_hot_wallet::cli::{Cli, Commands};
use utxo_hot_wallet::core::config::WalletConfig;
use utxo_hot_wallet::storage::SqliteStore;
use utxo_hot_wallet::WalletSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = WalletConfig::from_env();

    let store = SqliteStore::new_with_url(&config.storage.database_url)
        .await
        .context("opening wallet store")?;
    let session = WalletSession::new(config, Arc::new(store));
    session.initialize_wallet().await?;

    match cli.command {
        Commands::Create => {
            if session.is_initialized().await {
                anyhow::bail!("a wallet is already stored; import or remove it first");
            }
            let snapshot = session.create_new_wallet().await?;
            println!("address: {}", snapshot.address.unwrap_or_default());
            let phrase = session.export_seed_phrase().await?;
            println!("seed phrase (write this down, it is shown once): {}", *phrase);
        }
        Commands::Import { phrase } => {
            let snapshot = session.import_wallet(&phrase).await?;
            println!("address: {}", snapshot.address.unwrap_or_default());
            println!("balance: {} sats", snapshot.balance);
        }
        Commands::Balance => {
            let refresh = session.refresh_balance().await?;
            if refresh.is_degraded() {
                eprintln!("warning: indexer unreachable, showing zero");
            }
            let snapshot = session.get_wallet_state().await;
            println!("address: {}", snapshot.address.unwrap_or_default());
            println!("balance: {} sats", refresh.sats());
        }
        Commands::Send { to, amount } => {
            let txid = session.send_transaction(&to, amount).await?;
            println!("txid: {}", txid);
        }
        Commands::Watch => {
            session
                .on_balance_update(|sats| println!("balance: {} sats", sats))
                .await;
            if !session.start_subscription().await {
                anyhow::bail!("subscription could not be started");
            }
            println!("watching for balance changes, ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            session.stop_subscription().await;
        }
        Commands::ExportPhrase => {
            let phrase = session.export_seed_phrase().await?;
            println!("{}", *phrase);
        }
    }

    Ok(())
}
