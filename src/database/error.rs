use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: Option<String> },
    Connection { message: String },
    Decode { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", describe(&self.kind))]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

fn describe(kind: &DatabaseErrorKind) -> String {
    match kind {
        DatabaseErrorKind::NotFound { entity, id } => format!("{} not found: {}", entity, id),
        DatabaseErrorKind::UniqueViolation { constraint } => format!(
            "unique constraint violated: {}",
            constraint.as_deref().unwrap_or("unknown")
        ),
        DatabaseErrorKind::Connection { message } => format!("connection error: {}", message),
        DatabaseErrorKind::Decode { message } => format!("decode error: {}", message),
        DatabaseErrorKind::Unknown { message } => format!("database error: {}", message),
    }
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Decode {
            message: message.into(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().map(str::to_string),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::Connection {
                    message: err.to_string(),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseErrorKind::Decode {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }
}
