//! Fixed-window rate limiter over the ephemeral store.
//!
//! A Lua script makes the check-and-increment atomic across instances:
//! first call in a window seeds the counter and sets its expiry: the rest
//! of the window just increments, so the bucket refills automatically
//! `period` seconds after the first `Allow()` of the window.

use super::Cache;

const SCRIPT: &str = r#"
    local current = redis.call("INCR", KEYS[1])
    if current == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[2])
    end
    if current > tonumber(ARGV[1]) then
        return 0
    end
    return 1
"#;

impl Cache {
    /// Returns `true` if the call is allowed under `limit` per `period`
    /// for `key`, `false` if the window's budget is exhausted.
    pub async fn allow(&self, key: &str, limit: u32, period: std::time::Duration) -> anyhow::Result<bool> {
        let mut conn = self.raw();
        let allowed: i64 = redis::Script::new(SCRIPT)
            .key(key)
            .arg(limit)
            .arg(period.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed == 1)
    }
}

/// Pure in-process token-bucket fallback used by the notifier dispatcher
/// so a single global rate limit doesn't require a round trip to Redis
/// per send.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, per: std::time::Duration) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec: capacity as f64 / per.as_secs_f64(),
            last_refill: std::time::Instant::now(),
        }
    }

    pub fn try_take(&mut self) -> bool {
        let now = std::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn token_bucket_allows_burst_then_throttles() {
        let mut bucket = TokenBucket::new(3, Duration::from_secs(60));
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }
}
