mod pg_status;
mod status;
mod users;

pub use pg_status::{PgStatusStore, CHANGE_CHANNEL};
pub use status::{MemoryStatusStore, StatusStore, Triggers};
pub use users::PgUserDirectory;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the local persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Failed to (de)serialize stored record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
