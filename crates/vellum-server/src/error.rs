use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use vellum_repository::{ErrorKind, RepositoryError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<vellum_ledger::LedgerError> for ServerError {
    fn from(err: vellum_ledger::LedgerError) -> Self {
        Self::Repository(err.into())
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    description: String,
    code: u16,
}

/// Status for clients that went away before the response was ready.
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Repository(err) => match err.kind() {
                ErrorKind::InvalidInput | ErrorKind::BadQuery | ErrorKind::AddressMismatch => {
                    StatusCode::BAD_REQUEST
                }
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::DanglingReference | ErrorKind::Store => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ErrorKind::Cancelled => client_closed_request(),
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to show a client. Server-side failures are logged, not echoed.
    fn description(&self, status: StatusCode) -> String {
        if status == StatusCode::NOT_FOUND {
            "not found".to_string()
        } else if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("internal error")
                .to_lowercase()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            description: self.description(status),
            code: status.as_u16(),
        };
        let json = serde_json::to_string(&body)
            .unwrap_or_else(|_| r#"{"description":"internal error","code":500}"#.to_string());
        (
            status,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json; charset=utf-8"),
                ),
                (
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ),
            ],
            json,
        )
            .into_response()
    }
}
