// Shared error type and result alias

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Instructional message returned when a load request has no job name.
pub const MISSING_JOB_NAME: &str = "Please include job_name in request json.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", MISSING_JOB_NAME)]
    MissingJobName,

    #[error("{0} was not found in the config file.")]
    JobNotFound(String),

    #[error("The value '{value}' provided for {kind} does not match any valid value.")]
    InvalidDisposition { kind: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Watermark store error: {0}")]
    Store(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Warehouse load error: {0}")]
    Warehouse(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// True for errors caused by the request or the job configuration
    /// rather than by a collaborator.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::MissingJobName
                | AppError::JobNotFound(_)
                | AppError::InvalidDisposition { .. }
                | AppError::Configuration(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingJobName
            | AppError::InvalidDisposition { .. }
            | AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            AppError::JobNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Store(_)
            | AppError::Storage(_)
            | AppError::Warehouse(_)
            | AppError::Dispatch(_)
            | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_string())).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
