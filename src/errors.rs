use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error as StdError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Connection error: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body or query string could not be read into the expected types.
    #[error("Invalid request: {details}")]
    InvalidRequest { status: StatusCode, details: String },
}

impl AppError {
    /// Stable label sent as the `error` field of error responses.
    fn label(&self) -> &'static str {
        match self {
            AppError::Connection(_) => "Database connection failed",
            AppError::Database(_) => "Database operation failed",
            AppError::Timeout(_) => "Database operation timed out",
            AppError::NotFound(_) => "Not found",
            AppError::InvalidRequest { .. } => "Invalid request",
        }
    }

    fn source_chain(&self) -> String {
        let mut chain = String::new();
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            chain.push_str(&format!("\n  Caused by: {}", err));
            current = err.source();
        }
        chain
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::NotFound(message) = &self {
            tracing::debug!(message = %message, "Resource not found");
            return (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response();
        }

        if let AppError::InvalidRequest { status, details } = &self {
            tracing::warn!(status_code = %status, details = %details, "Rejected request");
            let body = Json(json!({ "error": self.label(), "details": details }));
            return (*status, body).into_response();
        }

        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let details = match &self {
            AppError::Connection(e) | AppError::Database(e) => {
                format!("{:#}", e)
            }
            other => other.to_string(),
        };

        tracing::error!(
            error_type = %self,
            error_message = %details,
            status_code = %status,
            "Request error"
        );

        let source_chain = self.source_chain();
        if !source_chain.is_empty() {
            tracing::error!("Error source chain:{}", source_chain);
        }

        let body = Json(json!({
            "error": self.label(),
            "details": details,
        }));
        (status, body).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let unreachable = matches!(
            *err.kind,
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. }
        );

        if unreachable {
            AppError::Connection(anyhow::Error::new(err).context("MongoDB is unreachable"))
        } else {
            AppError::Database(anyhow::Error::new(err).context("MongoDB operation failed"))
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest {
            status: rejection.status(),
            details: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest {
            status: rejection.status(),
            details: rejection.body_text(),
        }
    }
}
