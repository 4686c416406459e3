//! Persistent key-value store for the wallet seed phrase.
//!
//! The phrase is stored in cleartext under one fixed key. That is an
//! accepted weakness of this engine: a hardened deployment must wrap the
//! store with encryption at rest before shipping.

use crate::core::errors::WalletError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The one key the wallet persists.
pub const SEED_PHRASE_KEY: &str = "wallet.seed_phrase";

/// Minimal persistence surface the session needs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError>;
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Sqlite-backed store.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new_with_url(database_url: &str) -> Result<Self, WalletError> {
        // Accept both "sqlite:" and "sqlite://" spellings.
        let mut db_url = database_url.to_string();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }

        // File-backed databases need their parent directory to exist.
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            let path_only = path.split('?').next().unwrap_or(path);
            if path_only != ":memory:" && !path_only.is_empty() {
                if let Some(parent) = std::path::Path::new(path_only).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = std::fs::create_dir_all(parent) {
                            warn!("failed to create database dir {:?}: {}", parent, e);
                        }
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| WalletError::StorageError(format!("invalid database url: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| WalletError::StorageError(format!("database connect failed: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("key-value store initialized");
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        debug!(key = %key, found = row.is_some(), "kv get");
        row.map(|r| r.try_get::<String, _>(0).map_err(WalletError::from))
            .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(key = %key, "kv set");
        Ok(())
    }
}
