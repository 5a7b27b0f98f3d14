use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::PreSharedKey;
use super::Store;

impl Store {
    pub async fn get_psk(&self, id: Uuid) -> Result<Option<PreSharedKey>, sqlx::Error> {
        sqlx::query_as::<_, PreSharedKey>(
            "SELECT id, org_id, key_hash, salt, max_uses, used_count, expires_at, status
             FROM pre_shared_keys WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn create_psk(
        &self,
        org_id: Uuid,
        key_hash: &[u8],
        salt: &[u8],
        max_uses: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<PreSharedKey, sqlx::Error> {
        sqlx::query_as::<_, PreSharedKey>(
            "INSERT INTO pre_shared_keys (id, org_id, key_hash, salt, max_uses, used_count, expires_at, status)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, 0, $5, 'active')
             RETURNING id, org_id, key_hash, salt, max_uses, used_count, expires_at, status",
        )
        .bind(org_id)
        .bind(key_hash)
        .bind(salt)
        .bind(max_uses)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Best-effort: failure to record a use does not roll back
    /// device creation. Flips `status` to `exhausted` in the same
    /// statement once the new count reaches `max_uses`.
    pub async fn increment_psk_usage(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE pre_shared_keys
             SET used_count = used_count + 1,
                 status = CASE WHEN used_count + 1 >= max_uses THEN 'exhausted' ELSE status END
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_psk(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pre_shared_keys SET status = 'revoked' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
