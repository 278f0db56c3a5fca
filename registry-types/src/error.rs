//! Error taxonomy shared by every crate in the workspace (spec §7).
//!
//! Each crate returns `Result<_, GatewayError>` (or a local error that
//! converts into one); the boundary layer in `gateway` maps `ErrorKind` to
//! an HTTP status in exactly one place.

use thiserror::Error;

/// The closed set of error kinds the core ever surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Conflict,
    Forbidden,
    Timeout,
    Internal,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Invalid(_) => ErrorKind::Invalid,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::Forbidden(_) => ErrorKind::Forbidden,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        GatewayError::Invalid(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GatewayError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GatewayError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        GatewayError::Forbidden(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        GatewayError::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Invalid(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
