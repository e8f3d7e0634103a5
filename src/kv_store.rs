//! K/V Gateway. Key naming covers `wallet:pw:{session_token}`,
//! `session:{session_token}`, `price:{mint}`, `circuit_breaker:{name}`,
//! `pool:detection:{signature}`.
//!
//! The trait is the capability every other component depends on; the
//! in-process implementation here (grounded on the `Arc<RwLock<HashMap<_>>>`
//! + TTL-on-read pattern shared by `route_cache.rs` and
//! `realtime_price_monitor.rs` in the reference bot) is the one exercised by
//! tests and single-process runs. A production deployment substitutes a
//! Redis-backed implementation (see DESIGN.md) without touching callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::errors::KvError;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn publish(&self, channel: &str, payload: String) -> Result<(), KvError>;
    /// A dedicated subscriber connection, distinct from `get`/`set`/`delete`
    /// so a long-lived subscribe loop never starves ordinary request/response
    /// traffic.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, KvError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process reference `KvStore`. Single-process only; not shared across
/// OS processes (that role belongs to the production Redis-backed
/// implementation named in DESIGN.md).
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        })
    }

    /// Remove expired entries. Intended to be driven by a periodic task in
    /// long-running processes; tests may call it directly.
    pub async fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), KvError> {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(channel) {
            // No subscribers is not an error; the envelope is simply dropped.
            let _ = tx.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, KvError> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        Ok(tx.subscribe())
    }
}

pub mod keys {
    pub fn wallet_password(session_token: &str) -> String {
        format!("wallet:pw:{session_token}")
    }

    pub fn session(session_token: &str) -> String {
        format!("session:{session_token}")
    }

    pub fn price(mint: &str) -> String {
        format!("price:{mint}")
    }

    pub fn circuit_breaker(name: &str) -> String {
        format!("circuit_breaker:{name}")
    }

    pub fn pool_detection(signature: &str) -> String {
        format!("pool:detection:{signature}")
    }

    /// Most recent reuse-mode session token for a user, so the exit
    /// executor can sign an automatic exit without a chat round-trip.
    pub fn active_session(user_id: i64) -> String {
        format!("user:{user_id}:active_session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let kv = InMemoryKvStore::new();
        kv.set_with_ttl("k", "v".to_string(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_none() {
        let kv = InMemoryKvStore::new();
        kv.set_with_ttl("k", "v".to_string(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_atomic_consume() {
        let kv = InMemoryKvStore::new();
        kv.set_with_ttl("k", "v".to_string(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(kv.delete("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(kv.delete("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let kv = InMemoryKvStore::new();
        let mut rx = kv.subscribe("chan").await.unwrap();
        kv.publish("chan", "hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn key_formats_are_stable() {
        assert_eq!(keys::wallet_password("tok"), "wallet:pw:tok");
        assert_eq!(keys::session("tok"), "session:tok");
        assert_eq!(keys::price("MINT"), "price:MINT");
        assert_eq!(keys::circuit_breaker("jupiter"), "circuit_breaker:jupiter");
        assert_eq!(keys::pool_detection("SIG"), "pool:detection:SIG");
        assert_eq!(keys::active_session(42), "user:42:active_session");
    }
}
