//! Error types for port operations.

/// Failures reported by a ledger store adapter.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Duplicate sequence, unknown session and the like
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    /// Only raw database failures are worth retrying; the rest will fail the
    /// same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { .. })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// The request never got an HTTP answer
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    /// The server answered with a non-success status
    #[error("LLM server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Connection failures, throttling and server errors may clear up on a
    /// second try. Client errors and unparseable bodies will not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Errors from the latency-bound collaborators (classifier, plausibility,
/// narrator, content generator, memory).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} timed out after {elapsed_ms}ms")]
    Timeout {
        service: &'static str,
        elapsed_ms: u64,
    },
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    pub fn timeout(service: &'static str, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            service,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<LlmError> for ServiceError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RequestFailed(msg) => Self::Unavailable(msg),
            LlmError::Status { status, body } => Self::Unavailable(format!("{status}: {body}")),
            LlmError::InvalidResponse(msg) => Self::InvalidResponse(msg),
        }
    }
}
