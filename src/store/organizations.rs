use uuid::Uuid;

use super::models::Organization;
use super::Store;

impl Store {
    pub async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>, sqlx::Error> {
        sqlx::query_as::<_, Organization>("SELECT id, slug FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create_organization(&self, slug: &str) -> Result<Organization, sqlx::Error> {
        sqlx::query_as::<_, Organization>(
            "INSERT INTO organizations (id, slug) VALUES (gen_random_uuid(), $1) RETURNING id, slug",
        )
        .bind(slug)
        .fetch_one(&self.pool)
        .await
    }
}
