use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::devices::TrendPoint;
use super::models::{Alert, AlertStatus, Severity};
use super::Store;

impl Store {
    pub async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(ALERT_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fingerprint lookup used by the dedup path: at most one
    /// *active* alert exists per `(org_id, device_id, type)` — enforced by
    /// a partial UNIQUE index as the correctness backstop, this query is
    /// the fast path taken under the distributed lock.
    pub async fn find_active_alert(
        &self,
        org_id: Uuid,
        device_id: Option<Uuid>,
        alert_type: &str,
    ) -> Result<Option<Alert>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "SELECT id, org_id, device_id, severity, alert_type, title, message, status,
                    metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at
             FROM alerts
             WHERE org_id = $1
               AND device_id IS NOT DISTINCT FROM $2
               AND alert_type = $3
               AND status = 'active'",
        )
        .bind(org_id)
        .bind(device_id)
        .bind(alert_type)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_alert(
        &self,
        org_id: Uuid,
        device_id: Option<Uuid>,
        severity: Severity,
        alert_type: &str,
        title: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<Alert, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "INSERT INTO alerts
                (id, org_id, device_id, severity, alert_type, title, message, status,
                 metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at)
             VALUES
                (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'active', $7, 1, now(), now(), now(), NULL)
             RETURNING id, org_id, device_id, severity, alert_type, title, message, status,
                       metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at",
        )
        .bind(org_id)
        .bind(device_id)
        .bind(severity)
        .bind(alert_type)
        .bind(title)
        .bind(message)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
    }

    /// Folds a re-occurrence into the existing active alert: bump the
    /// count, set severity to the widened value, refresh `last_seen_at`.
    /// `severity` must already be the max of the existing and new
    /// severities — the column is stored as text, so the database can't
    /// widen it correctly itself (priority order isn't lexical order).
    pub async fn bump_alert(
        &self,
        id: Uuid,
        severity: Severity,
        occurred_at: DateTime<Utc>,
    ) -> Result<Alert, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "UPDATE alerts
             SET occurrence_count = occurrence_count + 1,
                 last_seen_at = $2,
                 severity = $3
             WHERE id = $1
             RETURNING id, org_id, device_id, severity, alert_type, title, message, status,
                       metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at",
        )
        .bind(id)
        .bind(occurred_at)
        .bind(severity)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn mark_alert_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET last_notified_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_alert_status(
        &self,
        id: Uuid,
        status: AlertStatus,
    ) -> Result<Option<Alert>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            "UPDATE alerts SET status = $2 WHERE id = $1
             RETURNING id, org_id, device_id, severity, alert_type, title, message, status,
                       metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_alerts(
        &self,
        org_id: Uuid,
        status: Option<AlertStatus>,
    ) -> Result<Vec<Alert>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Alert>(
                    "SELECT id, org_id, device_id, severity, alert_type, title, message, status,
                            metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at
                     FROM alerts WHERE org_id = $1 AND status = $2
                     ORDER BY created_at DESC",
                )
                .bind(org_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Alert>(
                    "SELECT id, org_id, device_id, severity, alert_type, title, message, status,
                            metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at
                     FROM alerts WHERE org_id = $1
                     ORDER BY created_at DESC",
                )
                .bind(org_id)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// Alerts created per day over the trailing `days` (admin "alert
    /// trend" stat).
    pub async fn alert_trend(&self, org_id: Uuid, days: i32) -> Result<Vec<TrendPoint>, sqlx::Error> {
        sqlx::query_as::<_, TrendPoint>(
            "SELECT date_trunc('day', created_at) AS day, count(*) AS count
             FROM alerts
             WHERE org_id = $1 AND created_at > now() - ($2 || ' days')::interval
             GROUP BY day
             ORDER BY day",
        )
        .bind(org_id)
        .bind(days.to_string())
        .fetch_all(&self.pool)
        .await
    }
}

const ALERT_COLUMNS_WHERE_ID: &str = "SELECT id, org_id, device_id, severity, alert_type, title, message, status,
        metadata, occurrence_count, first_seen_at, last_seen_at, created_at, last_notified_at
     FROM alerts WHERE id = $1";
