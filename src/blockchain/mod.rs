pub mod indexer;
pub mod types;
pub mod ws;

pub use indexer::IndexerClient;
pub use types::{TokenPayload, Utxo};
