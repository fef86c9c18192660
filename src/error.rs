/// Error types for the pairing session core.
/// Every error kind maps onto one boundary status code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status codes returned across the external boundary.
/// `Ok` is always zero; the rest enumerate the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    DuplicateSession = 1,
    SessionNotFound = 2,
    SessionClosed = 3,
    ParticipantNotFound = 4,
    CryptoFailure = 5,
    AlreadyRegistered = 6,
    InternalError = 7,
}

impl StatusCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<StatusCode> for i32 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Participant {key} is not a member of session {session_id}")]
    ParticipantNotFound { session_id: String, key: String },

    #[error("Key generation failed: {0}")]
    CryptoFailure(String),

    #[error("A log callback is already registered")]
    AlreadyRegistered,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Status code reported to the boundary for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::DuplicateSession(_) => StatusCode::DuplicateSession,
            ServiceError::SessionNotFound(_) => StatusCode::SessionNotFound,
            ServiceError::SessionClosed(_) => StatusCode::SessionClosed,
            ServiceError::ParticipantNotFound { .. } => StatusCode::ParticipantNotFound,
            ServiceError::CryptoFailure(_) => StatusCode::CryptoFailure,
            ServiceError::AlreadyRegistered => StatusCode::AlreadyRegistered,
            ServiceError::Storage(_) | ServiceError::Internal(_) => StatusCode::InternalError,
        }
    }

    /// True for invariant violations after which the service must not keep serving
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::Internal(_))
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(error: rusqlite::Error) -> Self {
        ServiceError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        ServiceError::Storage(format!("serialization: {}", error))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ServiceError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ServiceError::Internal("lock poisoned".to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
