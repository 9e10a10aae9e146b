use thiserror::Error;

/// Error type for failures talking to the partitioned table store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("table store unreachable: {0}")]
    Network(String),

    #[error("table store returned {0}: {1}")]
    Store(u16, String),

    #[error("malformed row in {0}/{1}: {2}")]
    Corrupt(String, String, String),

    #[error("table {0} does not exist")]
    NoSuchTable(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for DbError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

/// Whether a [`DbError`] is worth retrying, or is a permanent failure.
impl DbError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Network(_) | DbError::Store(_, _))
    }
}
