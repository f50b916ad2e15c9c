pub mod identity;
pub mod repository;

/// Error taxonomy shared by the store, the sync bridge and the domain
/// services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Lookup miss that the caller asked to be surfaced
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Compare-and-swap write lost the race; re-read and retry
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// Local store failure; fatal to the calling operation
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Remote push failed after a successful local write; local state stands
    #[error("Remote sync failed: {0}")]
    RemoteSync(String),

    /// Listener/subscription error from the remote feed
    #[error("Remote feed read failed: {0}")]
    TransientRead(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
