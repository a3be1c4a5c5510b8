use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Terminal failure of a `/cep` request, as seen by the client.
///
/// The `Display` output is the exact plain-text body written to the client.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid zipcode")]
    InvalidZipcode,

    #[error("can not find zipcode: {0}")]
    ZipcodeNotFound(String),

    #[error("error fetching weather")]
    WeatherUnavailable,

    /// Failure of the gateway → resolver hop, carrying the underlying cause.
    #[error("{0}")]
    Upstream(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The shutdown grace period ran out while the request was still running.
    #[error("server shutting down")]
    ShuttingDown,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidZipcode => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::ZipcodeNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::WeatherUnavailable
            | ServiceError::Upstream(_)
            | ServiceError::DeadlineExceeded
            | ServiceError::ShuttingDown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
