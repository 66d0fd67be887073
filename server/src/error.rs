use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Inbound webhook requests that cannot become a command.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl IntoResponse for InboundError {
    fn into_response(self) -> Response {
        tracing::warn!("rejected inbound request: {}", self);
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
