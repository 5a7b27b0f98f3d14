//! Best-effort advisory lock used only for alert dedup.
//!
//! "Best-effort advisory" means acquire-or-skip within a timeout — this is
//! not modeled as strongly consistent mutual exclusion. The database
//! UNIQUE constraint on the alert dedup fingerprint is the correctness
//! backstop if two instances ever race past this lock.

use rand::Rng;
use std::time::Duration;

use super::Cache;

pub struct LockGuard {
    cache: Cache,
    key: String,
    token: String,
}

impl Cache {
    /// Single-attempt acquire with a timeout; returns `None` immediately
    /// if the key is already held rather than retrying or blocking — a
    /// held lock is read as "another instance is handling it".
    pub async fn try_lock(&self, key: &str, timeout: Duration) -> anyhow::Result<Option<LockGuard>> {
        let token: u64 = rand::thread_rng().gen();
        let token = token.to_string();
        let mut conn = self.raw();
        let acquired: bool = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(timeout.as_millis() as u64)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();
        if acquired {
            Ok(Some(LockGuard {
                cache: self.clone(),
                key: key.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }
}

impl LockGuard {
    /// Releases only if the token still matches (it may have already
    /// expired and been re-acquired by another instance).
    pub async fn release(self) {
        let mut conn = self.cache.raw();
        const SCRIPT: &str = r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
        "#;
        let result: redis::RedisResult<i64> = redis::Script::new(SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, key = %self.key, "failed to release dedup lock");
        }
    }
}
