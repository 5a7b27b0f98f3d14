use uuid::Uuid;

use super::models::AuditLogEntry;
use super::Store;

impl Store {
    pub async fn append_audit_log(
        &self,
        org_id: Uuid,
        actor: &str,
        action: &str,
        target_type: &str,
        target_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_logs (id, org_id, actor, action, target_type, target_id, metadata, created_at)
             VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, now())",
        )
        .bind(org_id)
        .bind(actor)
        .bind(action)
        .bind(target_type)
        .bind(target_id)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_audit_logs(&self, org_id: Uuid, limit: i64) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
        sqlx::query_as::<_, AuditLogEntry>(
            "SELECT id, org_id, actor, action, target_type, target_id, metadata, created_at
             FROM audit_logs WHERE org_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
