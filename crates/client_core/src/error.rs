use thiserror::Error;

/// Failure taxonomy for backend calls.
///
/// `Validation`, `NotFound` and `Permission` carry the backend-provided
/// message when the response body had one; `Network` covers transport
/// and connectivity failures before a status was received.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// The backend-provided message, when the failure carries one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ClientError::Validation(message)
            | ClientError::NotFound(message)
            | ClientError::Permission(message)
            | ClientError::Backend { message, .. } => Some(message),
            ClientError::Network(_) | ClientError::InvalidResponse(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
