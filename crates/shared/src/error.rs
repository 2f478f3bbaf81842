use serde::{Deserialize, Serialize};

/// Error body returned by the backend on non-success responses, e.g.
/// `{"message": "Designation not found"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
