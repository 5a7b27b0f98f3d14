//! Keyed ephemeral store: cache, locks, rate buckets, pub/sub.
//!
//! Backed by Redis through the `redis` crate's async `ConnectionManager`,
//! which reconnects transparently — publishing stays non-blocking even
//! when the substrate is briefly unreachable, since the caller never has
//! to special-case that.

pub mod lock;
pub mod rate_limiter;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::config::EphemeralConfig;

pub const EVENT_CHANNEL: &str = "meshctl:events";

#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    client: redis::Client,
}

impl Cache {
    pub async fn connect(cfg: &EphemeralConfig) -> anyhow::Result<Self> {
        let url = match &cfg.password {
            Some(password) => cfg
                .addr
                .replacen("redis://", &format!("redis://:{password}@"), 1),
            None => cfg.addr.clone(),
        };
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { conn, client })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value)?;
        let _: () = conn.set_ex(key, raw, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn.keys(&pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    /// Non-blocking publish; substrate unreachability is logged and
    /// swallowed — events may be lost, at-most-once delivery.
    pub async fn publish(&self, channel: &str, payload: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(channel, payload).await {
            tracing::warn!(error = %e, channel, "event publish failed, continuing");
        }
    }

    pub fn client(&self) -> redis::Client {
        self.client.clone()
    }

    /// Pub/sub requires a connection dedicated to subscriber mode, which
    /// `ConnectionManager` doesn't support — open a fresh one from the
    /// client for the lifetime of the subscription.
    pub async fn subscribe(&self, channel: &str) -> anyhow::Result<redis::aio::PubSub> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    pub(crate) fn raw(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
