//! Key-value persistence with per-key TTL.
//!
//! Keys are `account:<username>` and `session:<username>`; values are JSON.
//!
//! Every mutation in this crate is a get-modify-set against a [`Store`]. Two
//! concurrent requests for the same username can interleave between the get
//! and the set; a single user is assumed to run one login attempt at a time.
//! Closing that race needs a per-key compare-and-swap, which this trait does
//! not offer.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    future::Future,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{Instrument, error, info_span};

use super::error::FactorError;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[must_use]
pub fn account_key(username: &str) -> String {
    format!("account:{username}")
}

#[must_use]
pub fn session_key(username: &str) -> String {
    format!("session:{username}")
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value; expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, FactorError>;

    /// Write a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>)
    -> Result<(), FactorError>;

    async fn delete(&self, key: &str) -> Result<(), FactorError>;

    /// Cheap reachability check for `/health`.
    async fn ping(&self) -> Result<(), FactorError>;
}

/// Read and decode a JSON value.
///
/// # Errors
/// `StoreUnavailable` when the store fails or the stored value is corrupt.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> Result<Option<T>, FactorError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| FactorError::StoreUnavailable(format!("corrupt value at {key}: {err}")))
}

/// Encode and write a JSON value.
///
/// # Errors
/// `StoreUnavailable` when the store fails.
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn Store,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), FactorError> {
    let raw = serde_json::to_string(value)
        .map_err(|err| FactorError::Internal(format!("failed to encode {key}: {err}")))?;
    store.set(key, raw, ttl).await
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FactorError> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), FactorError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), FactorError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), FactorError> {
        Ok(())
    }
}

/// Postgres-backed store. Expired rows are ignored on read and overwritten on
/// write.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Create the backing table if it does not exist.
    ///
    /// # Errors
    /// `StoreUnavailable` when the statement fails or times out.
    pub async fn ensure_schema(&self) -> Result<(), FactorError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "CREATE");
        self.bounded(
            "ensure schema",
            sqlx::query(SCHEMA_SQL).execute(&self.pool).instrument(span),
        )
        .await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, FactorError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                error!("Store {what} failed: {err}");
                Err(FactorError::StoreUnavailable(format!("{what}: {err}")))
            }
            Err(_) => {
                error!("Store {what} timed out after {:?}", self.timeout);
                Err(FactorError::StoreUnavailable(format!("{what}: timed out")))
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FactorError> {
        let query = r"
            SELECT value
            FROM mufa_kv
            WHERE key = $1
              AND (expires_at IS NULL OR expires_at > NOW())
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let row = self
            .bounded(
                "get",
                sqlx::query(query)
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .instrument(span),
            )
            .await?;
        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), FactorError> {
        let query = r"
            INSERT INTO mufa_kv (key, value, expires_at)
            VALUES ($1, $2, CASE WHEN $3::BIGINT IS NULL THEN NULL
                                 ELSE NOW() + make_interval(secs => $3::BIGINT) END)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
        ";
        let ttl_seconds = ttl.map(|ttl| i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX));
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPSERT");
        self.bounded(
            "set",
            sqlx::query(query)
                .bind(key)
                .bind(value)
                .bind(ttl_seconds)
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), FactorError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
        self.bounded(
            "delete",
            sqlx::query("DELETE FROM mufa_kv WHERE key = $1")
                .bind(key)
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), FactorError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        self.bounded(
            "ping",
            sqlx::query("SELECT 1").execute(&self.pool).instrument(span),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Record {
        name: String,
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(account_key("alice"), "account:alice");
        assert_eq!(session_key("alice"), "session:alice");
    }

    #[tokio::test]
    async fn memory_store_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".to_string(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemoryStore::new();
        store
            .set("short", "v".to_string(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("long", "v".to_string(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn memory_store_set_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "one".to_string(), None).await.unwrap();
        store.set("k", "two".to_string(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn json_helpers_round_trip_and_flag_corruption() {
        let store = MemoryStore::new();
        let record = Record {
            name: "alice".to_string(),
        };
        set_json(&store, "r", &record, None).await.unwrap();
        let loaded: Option<Record> = get_json(&store, "r").await.unwrap();
        assert_eq!(loaded, Some(record));

        store.set("bad", "{not json".to_string(), None).await.unwrap();
        let corrupt = get_json::<Record>(&store, "bad").await;
        assert!(matches!(corrupt, Err(FactorError::StoreUnavailable(_))));
    }

    #[test]
    fn schema_creates_kv_table() {
        assert!(SCHEMA_SQL.contains("mufa_kv"));
    }
}
