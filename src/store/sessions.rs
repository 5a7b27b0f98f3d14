use uuid::Uuid;

use super::devices::TrendPoint;
use super::models::{ConnectionType, Session};
use super::Store;

impl Store {
    /// Sessions are keyed by the unordered pair; normalize ordering so the
    /// lookup and the UNIQUE constraint (on `(least(a,b), greatest(a,b))
    /// WHERE ended_at IS NULL`) agree regardless of call order.
    fn ordered(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub async fn find_active_session(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<Option<Session>, sqlx::Error> {
        let (lo, hi) = Self::ordered(a, b);
        sqlx::query_as::<_, Session>(
            "SELECT id, device_a_id, device_b_id, connection_type, started_at, ended_at,
                    bytes_sent, bytes_received, avg_latency_ms
             FROM sessions
             WHERE least(device_a_id, device_b_id) = $1
               AND greatest(device_a_id, device_b_id) = $2
               AND ended_at IS NULL",
        )
        .bind(lo)
        .bind(hi)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn start_session(
        &self,
        a: Uuid,
        b: Uuid,
        connection_type: ConnectionType,
    ) -> Result<Session, sqlx::Error> {
        if a == b {
            return Err(sqlx::Error::Protocol(
                "session endpoints must be distinct devices".into(),
            ));
        }
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, device_a_id, device_b_id, connection_type, started_at, bytes_sent, bytes_received)
             VALUES (gen_random_uuid(), $1, $2, $3, now(), 0, 0)
             RETURNING id, device_a_id, device_b_id, connection_type, started_at, ended_at,
                       bytes_sent, bytes_received, avg_latency_ms",
        )
        .bind(a)
        .bind(b)
        .bind(connection_type)
        .fetch_one(&self.pool)
        .await
    }

    /// Counter updates are additive at the store level.
    pub async fn add_session_counters(
        &self,
        id: Uuid,
        delta_tx: i64,
        delta_rx: i64,
        latency_ms: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions
             SET bytes_sent = bytes_sent + $2,
                 bytes_received = bytes_received + $3,
                 avg_latency_ms = COALESCE($4, avg_latency_ms)
             WHERE id = $1",
        )
        .bind(id)
        .bind(delta_tx)
        .bind(delta_rx)
        .bind(latency_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn end_session(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET ended_at = now() WHERE id = $1 AND ended_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Total bytes (sent + received) carried per day over the trailing
    /// `days` for a network's sessions (admin "traffic" stat).
    pub async fn traffic_trend(
        &self,
        virtual_network_id: Uuid,
        days: i32,
    ) -> Result<Vec<TrendPoint>, sqlx::Error> {
        sqlx::query_as::<_, TrendPoint>(
            "SELECT date_trunc('day', s.started_at) AS day,
                    sum(s.bytes_sent + s.bytes_received) AS count
             FROM sessions s
             JOIN devices d ON d.id = s.device_a_id
             WHERE d.virtual_network_id = $1 AND s.started_at > now() - ($2 || ' days')::interval
             GROUP BY day
             ORDER BY day",
        )
        .bind(virtual_network_id)
        .bind(days.to_string())
        .fetch_all(&self.pool)
        .await
    }
}
