use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Market data could not be read from any source for this tick.
    #[error("Market data unavailable for {pair}: {reason}")]
    MarketDataUnavailable { pair: String, reason: String },

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Persistence failures must stop the tick before an in-memory transition is committed.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Migration(_) | Error::Persistence(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
