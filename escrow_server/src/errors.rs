use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use escrow_engine::{ErrorKind, SettlementError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request query: {0}")]
    InvalidQuery(String),
    #[error("{0}")]
    Settlement(#[from] SettlementError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// The machine-readable error category sent in the `code` field of error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidQuery(_) => "validation",
            Self::Settlement(e) => match e.kind() {
                ErrorKind::Validation => "validation",
                ErrorKind::NotFound => "not_found",
                ErrorKind::InvalidTransition => "invalid_transition",
                ErrorKind::Conflict => "conflict",
                ErrorKind::ExternalService => "external_service",
                ErrorKind::Internal => "internal",
            },
            Self::InitializeError(_) | Self::IOError(_) | Self::Unspecified(_) => "internal",
        }
    }

    /// Only processor outages are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Settlement(e) if e.kind() == ErrorKind::ExternalService)
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Settlement(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidTransition => StatusCode::CONFLICT,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {status} response: {self}");
        }
        HttpResponse::build(status).insert_header(ContentType::json()).body(
            serde_json::json!({ "error": self.to_string(), "code": self.code(), "retryable": self.is_retryable() })
                .to_string(),
        )
    }
}
