//! Metadata stores: the durable fingerprint → {raw URL, expiry} mapping.
//!
//! Production uses MySQL through a single long-lived sqlx pool; the
//! in-memory store backs tests.

use async_trait::async_trait;
use cachefront_core::{CacheEntry, DbConfig, Error, MetadataStore, Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::collections::HashMap;
use std::time::Duration;

fn db_err(e: sqlx::Error) -> Error {
    Error::Db(e.to_string())
}

pub struct MySqlMetadataStore {
    pool: MySqlPool,
}

impl MySqlMetadataStore {
    /// Connect the shared pool. Sized so request handling never opens
    /// per-request connections: 10 open, 5 idle, 5-minute lifetime.
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let dsn = format!(
            "mysql://{}:{}@{}/{}",
            cfg.user, cfg.password, cfg.host, cfg.dbname
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .min_connections(5)
            .max_lifetime(Duration::from_secs(5 * 60))
            .connect(&dsn)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Create the `file` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS file (
                 url_raw TEXT NOT NULL,
                 url_hash CHAR(64) NOT NULL UNIQUE,
                 exp_at BIGINT NOT NULL
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MySqlMetadataStore {
    async fn exists(&self, fingerprint: &str) -> Result<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM file WHERE url_hash = ? LIMIT 1)")
                .bind(fingerprint)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.0 != 0)
    }

    async fn get_expiry(&self, fingerprint: &str) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT exp_at FROM file WHERE url_hash = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| r.0).ok_or(Error::NotFound)
    }

    async fn insert(&self, fingerprint: &str, raw_url: &str, expires_at: i64) -> Result<()> {
        sqlx::query("INSERT INTO file (url_raw, url_hash, exp_at) VALUES (?, ?, ?)")
            .bind(raw_url)
            .bind(fingerprint)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_expiry(&self, fingerprint: &str, expires_at: i64) -> Result<()> {
        sqlx::query("UPDATE file SET exp_at = ? WHERE url_hash = ?")
            .bind(expires_at)
            .bind(fingerprint)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// A simple in-memory metadata store, mostly useful for testing.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    rows: parking_lot::Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored raw URL for a fingerprint, when present.
    pub fn raw_url(&self, fingerprint: &str) -> Option<String> {
        self.rows.lock().get(fingerprint).map(|r| r.raw_url.clone())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn exists(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.rows.lock().contains_key(fingerprint))
    }

    async fn get_expiry(&self, fingerprint: &str) -> Result<i64> {
        self.rows
            .lock()
            .get(fingerprint)
            .map(|r| r.expires_at)
            .ok_or(Error::NotFound)
    }

    async fn insert(&self, fingerprint: &str, raw_url: &str, expires_at: i64) -> Result<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(fingerprint) {
            return Err(Error::Db(format!("duplicate fingerprint {fingerprint}")));
        }
        rows.insert(
            fingerprint.to_string(),
            CacheEntry {
                fingerprint: fingerprint.to_string(),
                raw_url: raw_url.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn update_expiry(&self, fingerprint: &str, expires_at: i64) -> Result<()> {
        let mut rows = self.rows.lock();
        let row = rows.get_mut(fingerprint).ok_or(Error::NotFound)?;
        row.expires_at = expires_at;
        Ok(())
    }
}
