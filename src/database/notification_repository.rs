use crate::database::error::DatabaseError;
use crate::services::notification::{NotificationSink, SinkError, UserNotification};
use async_trait::async_trait;
use sqlx::PgPool;

/// Stores in-app notifications; email/SMS fan-out reads from this table.
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for NotificationRepository {
    async fn notify(&self, notification: UserNotification) -> Result<(), SinkError> {
        sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, message, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.metadata)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}
