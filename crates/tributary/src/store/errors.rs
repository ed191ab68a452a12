use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// A connection id that is not in this user's database.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
}

impl StoreError {
    pub fn connection_not_found(id: &str) -> Self {
        Self::ConnectionNotFound(id.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
