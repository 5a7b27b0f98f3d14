use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use uuid::Uuid;

use super::models::{Device, NatType};
use super::Store;

pub struct NewDevice<'a> {
    pub virtual_network_id: Uuid,
    pub name: &'a str,
    pub platform: &'a str,
    pub public_key: &'a str,
    pub virtual_ip: IpNetwork,
}

/// One bucket of a time-series stat.
#[derive(Debug, Clone, Copy, sqlx::FromRow, serde::Serialize)]
pub struct TrendPoint {
    pub day: DateTime<Utc>,
    pub count: i64,
}

/// One row of a grouped-count breakdown.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DistributionRow {
    pub key: String,
    pub count: i64,
}

impl Store {
    pub async fn get_device(&self, id: Uuid) -> Result<Option<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(DEVICE_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_device_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(
            "SELECT id, virtual_network_id, name, platform, public_key, virtual_ip,
                    public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at
             FROM devices WHERE public_key = $1",
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn allocated_ips(&self, virtual_network_id: Uuid) -> Result<Vec<IpNetwork>, sqlx::Error> {
        let rows: Vec<(IpNetwork,)> = sqlx::query_as(
            "SELECT virtual_ip FROM devices WHERE virtual_network_id = $1 AND revoked = false",
        )
        .bind(virtual_network_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(ip,)| ip).collect())
    }

    /// Insert a device; on a `(virtual_network_id, virtual_ip)` UNIQUE
    /// conflict the caller (ip_pool::allocate) retries with the next
    /// address rather than this method doing it, since the pool's
    /// in-memory reservation must be rolled back too.
    pub async fn insert_device(&self, new: NewDevice<'_>) -> Result<Device, sqlx::Error> {
        sqlx::query_as::<_, Device>(
            "INSERT INTO devices
                (id, virtual_network_id, name, platform, public_key, virtual_ip,
                 public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at)
             VALUES
                (gen_random_uuid(), $1, $2, $3, $4, $5, NULL, 'unknown', false, now(), '{}', false, now())
             RETURNING id, virtual_network_id, name, platform, public_key, virtual_ip,
                       public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at",
        )
        .bind(new.virtual_network_id)
        .bind(new.name)
        .bind(new.platform)
        .bind(new.public_key)
        .bind(new.virtual_ip)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_online_devices(
        &self,
        virtual_network_id: Uuid,
    ) -> Result<Vec<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(
            "SELECT id, virtual_network_id, name, platform, public_key, virtual_ip,
                    public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at
             FROM devices
             WHERE virtual_network_id = $1 AND online = true AND revoked = false",
        )
        .bind(virtual_network_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_devices(&self, virtual_network_id: Uuid) -> Result<Vec<Device>, sqlx::Error> {
        sqlx::query_as::<_, Device>(
            "SELECT id, virtual_network_id, name, platform, public_key, virtual_ip,
                    public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at
             FROM devices WHERE virtual_network_id = $1 AND revoked = false",
        )
        .bind(virtual_network_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn set_device_presence(
        &self,
        id: Uuid,
        online: bool,
        last_seen_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET online = $2, last_seen_at = $3 WHERE id = $1")
            .bind(id)
            .bind(online)
            .bind(last_seen_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_device_nat(
        &self,
        id: Uuid,
        nat_type: NatType,
        public_endpoint: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET nat_type = $2, public_endpoint = $3 WHERE id = $1")
            .bind(id)
            .bind(nat_type)
            .bind(public_endpoint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_device_endpoint(
        &self,
        id: Uuid,
        public_endpoint: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET public_endpoint = $2 WHERE id = $1")
            .bind(id)
            .bind(public_endpoint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn revoke_device(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE devices SET revoked = true, online = false WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Used by the presence sweeper: every device whose `last_seen_at`
    /// has lapsed past `threshold` gets flipped offline in one statement,
    /// and the ids are returned so the caller can invalidate topology and
    /// emit `device_status` events per device.
    pub async fn sweep_offline_devices(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE devices SET online = false
             WHERE online = true AND last_seen_at < $1
             RETURNING id",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Devices enrolled per day over the trailing `days` (admin "device
    /// trend" stat).
    pub async fn device_trend(
        &self,
        virtual_network_id: Uuid,
        days: i32,
    ) -> Result<Vec<TrendPoint>, sqlx::Error> {
        sqlx::query_as::<_, TrendPoint>(
            "SELECT date_trunc('day', created_at) AS day, count(*) AS count
             FROM devices
             WHERE virtual_network_id = $1 AND created_at > now() - ($2 || ' days')::interval
             GROUP BY day
             ORDER BY day",
        )
        .bind(virtual_network_id)
        .bind(days.to_string())
        .fetch_all(&self.pool)
        .await
    }

    /// Device count grouped by platform (admin "distribution" stat).
    pub async fn platform_distribution(
        &self,
        virtual_network_id: Uuid,
    ) -> Result<Vec<DistributionRow>, sqlx::Error> {
        sqlx::query_as::<_, DistributionRow>(
            "SELECT platform AS key, count(*) AS count
             FROM devices
             WHERE virtual_network_id = $1 AND revoked = false
             GROUP BY platform
             ORDER BY count DESC",
        )
        .bind(virtual_network_id)
        .fetch_all(&self.pool)
        .await
    }
}

const DEVICE_COLUMNS_WHERE_ID: &str = "SELECT id, virtual_network_id, name, platform, public_key, virtual_ip,
        public_endpoint, nat_type, online, last_seen_at, tags, revoked, created_at
     FROM devices WHERE id = $1";
