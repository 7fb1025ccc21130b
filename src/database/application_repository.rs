use crate::database::error::DatabaseError;
use crate::database::repository::ApplicationDirectory;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct ApplicationRepository {
    pool: PgPool,
}

impl ApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationDirectory for ApplicationRepository {
    async fn application_owner(&self, application_id: i64) -> Result<Option<i64>, DatabaseError> {
        sqlx::query_scalar::<_, i64>("SELECT user_id FROM applications WHERE id = $1")
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
