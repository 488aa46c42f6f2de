//! Fallible handlers and their dispatch to responses.

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use super::endpoint::SharedEndpoint;

/// Failure returned by a [`Handler`].
///
/// `Status` carries a status code and message that are safe to show to the
/// client. `Internal` is anything else: it is logged and answered with a bare
/// 500. Any `std::error::Error` converts into `Internal`, so `?` works on
/// I/O, parsing and similar errors inside handlers.
#[derive(Debug)]
pub enum HandlerError {
    Status { status: StatusCode, message: String },
    Internal(anyhow::Error),
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Wrap an opaque failure, e.g. an `anyhow::Error`.
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        HandlerError::Internal(err.into())
    }

    /// Status code this failure maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Status { status, .. } => *status,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Status { status, message } => write!(f, "{}: {}", status, message),
            HandlerError::Internal(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        HandlerError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Status { status, message } => {
                (status, format!("message: {}", message)).into_response()
            }
            HandlerError::Internal(err) => {
                error!(error = ?err, "Handler failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// A request handler that may fail.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, request: Request) -> Result<Response, HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    async fn call(&self, request: Request) -> Result<Response, HandlerError> {
        (self)(request).await
    }
}

/// Adapt a fallible handler into an endpoint that always responds.
pub fn dispatch<H: Handler>(handler: H) -> SharedEndpoint {
    let handler = Arc::new(handler);
    Arc::new(move |request: Request| {
        let handler = handler.clone();
        async move {
            match handler.call(request).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            }
        }
    })
}
