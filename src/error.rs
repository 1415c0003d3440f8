use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::gemini::{GenerationError, SafetyRating};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing errorMessage or code")]
    MissingField,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Prompt blocked by safety filters.")]
    Blocked {
        reason: String,
        ratings: Vec<SafetyRating>,
    },

    #[error("No content generated or no candidates in response.")]
    NoContent,

    #[error("API request failed: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingField => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Blocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoContent => StatusCode::BAD_GATEWAY,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingField => "missing_field",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Blocked { .. } => "safety_blocked",
            AppError::NoContent => "no_content",
            AppError::Provider(_) => "provider_error",
            AppError::Config(_) => "config_error",
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Blocked { reason, ratings } => AppError::Blocked { reason, ratings },
            GenerationError::NoContent => AppError::NoContent,
            GenerationError::Provider(detail) => AppError::Provider(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        error!(error_code = code, message = %message, "Request failed");

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let AppError::Blocked { reason, ratings } = &self {
            body["details"] = json!({
                "blockReason": reason,
                "safetyRatings": ratings,
            });
        }

        (status, Json(body)).into_response()
    }
}
