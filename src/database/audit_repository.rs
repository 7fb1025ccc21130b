use crate::database::error::DatabaseError;
use crate::services::notification::{AuditEntry, AuditSink, SinkError};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for AuditLogRepository {
    async fn log(&self, entry: AuditEntry) -> Result<(), SinkError> {
        sqlx::query(
            "INSERT INTO audit_logs (user_id, action, resource, resource_id, description, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(entry.resource_id)
        .bind(&entry.description)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}
