//! Error types for the RPC client.
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The error type for errors produced talking to the node's JSON-RPC surface.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientError {
    /// Network error, retry might help
    #[error("Network: {0}")]
    Network(String),

    /// Missing username or password for the RPC server
    #[error("Missing username or password")]
    MissingUserPassword,

    /// RPC server returned an error
    ///
    /// # Note
    ///
    /// These errors are ABSOLUTELY UNDOCUMENTED.
    /// Check
    /// <https://github.com/bitcoin/bitcoin/blob/96b0a8f858ab24f3672360b8c830553b963de726/src/rpc/protocol.h#L24>
    /// and good luck!
    #[error("RPC server returned error '{1}' (code {0})")]
    Server(i32, String),

    #[error("Error parsing rpc response: {0}")]
    Parse(String),

    /// Body error, unlikely to be recoverable by retrying
    #[error("{0}")]
    Body(String),

    /// HTTP status error, not retryable
    #[error("Obtained failure status({0}): {1}")]
    Status(String, String),

    /// Error decoding the response, retry might not help
    #[error("Malformed Response: {0}")]
    MalformedResponse(String),

    /// Connection error, retry might help
    #[error("Could not connect: {0}")]
    Connection(String),

    /// Timeout error, retry might help
    #[error("Timeout")]
    Timeout,

    /// Requested height/hash isn't known to the node.
    #[error("block not found: {0}")]
    NotFound(String),

    /// Unknown error, unlikely to be recoverable
    #[error("{0}")]
    Other(String),
}

impl From<SerdeJsonError> for ClientError {
    fn from(value: SerdeJsonError) -> Self {
        Self::Parse(format!("Could not parse {}", value))
    }
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_) | ClientError::Connection(_) | ClientError::Timeout
        )
    }
}
