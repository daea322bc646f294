//! Error types.
//!
//! Three families, told apart by how they surface:
//!
//! - [`HttpError`]: a business outcome with a status code and a message the
//!   client is allowed to read. Raised by handlers, translated by the envelope
//!   middleware.
//! - [`ChainError`]: a broken middleware chain (a continuation run twice, a
//!   terminal handler asking for `next`, an undeclared dependency). A
//!   programming fault, logged and answered with a 500.
//! - [`ConfigError`]: a bad route table or resource pool, caught by
//!   [`App::build`](crate::App::build) before the server accepts a connection.
//!
//! [`Error`] is what flows through a chain at request time.

use http::{Method, StatusCode};
use thiserror::Error;

/// The error type flowing through a middleware chain.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any error as an unexpected server fault.
    pub fn internal(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Internal(err.into())
    }
}

/// An error with a client-facing status code and message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// The generic 500. Carries no detail about the underlying fault.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "The server encountered an internal error and was unable to complete your request.",
        )
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }
}

/// Violations of the middleware chain discipline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("next() called multiple times from `{link}`")]
    NextCalledMultipleTimes { link: String },

    #[error("next() must not be called from the final element `{link}`")]
    NextFromTerminal { link: String },

    #[error("`{link}` requested `{dependency}`, which was not declared or is not available")]
    Unresolved { link: String, dependency: String },
}

/// Startup-time failures of the route table or the resource pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate route {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("resource `{0}` registered twice")]
    DuplicateResource(&'static str),

    #[error("`{link}` needs resource `{resource}`, which is not registered")]
    MissingResource { link: String, resource: &'static str },

    #[error("`{link}` needs path parameter `{param}`, which `{pattern}` does not capture")]
    MissingParam { link: String, param: String, pattern: String },

    #[error("`{link}` is the final element of {pattern} and cannot declare `next`")]
    NextInTerminal { link: String, pattern: String },

    #[error("`{link}` is used as a {expected} but was built as a {actual}")]
    WrongRole { link: String, expected: &'static str, actual: &'static str },
}

/// Infrastructure failures of the server itself: binding or serving.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
