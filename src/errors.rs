use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DeskError {
    #[error("Authentication required")]
    #[diagnostic(code(visadesk::unauthenticated))]
    Unauthenticated,

    #[error("Permission denied")]
    #[diagnostic(code(visadesk::forbidden))]
    Forbidden,

    #[error("Not found: {0}")]
    #[diagnostic(code(visadesk::not_found))]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(code(visadesk::conflict))]
    Conflict(String),

    #[error("Bad request: {0}")]
    #[diagnostic(code(visadesk::bad_request))]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(visadesk::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(visadesk::db),
        help("Check that the database is reachable and migrations have been applied")
    )]
    Db(#[from] sea_orm::DbErr),

    #[error("{0}")]
    #[diagnostic(code(visadesk::other))]
    Other(String),
}

impl DeskError {
    pub fn status(&self) -> StatusCode {
        match self {
            DeskError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DeskError::Forbidden => StatusCode::FORBIDDEN,
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::Conflict(_) => StatusCode::CONFLICT,
            DeskError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DeskError::Serde(_)
            | DeskError::Db(_)
            | DeskError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeskError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            DeskError::NotFound(msg) | DeskError::Conflict(msg) | DeskError::BadRequest(msg) => {
                msg.clone()
            }
            DeskError::Unauthenticated | DeskError::Forbidden => self.to_string(),
            _ => {
                // Internals stay in the log, never in the response body.
                tracing::error!(error = %self, "Request failed with an internal error");
                "Internal server error".to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
