//! Error handling for the Agri-Siddhi yield service
//!
//! Every failure leaves the service as `{ "error": { code, message, field } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::FeatureError;
use thiserror::Error;

use crate::ml::MlError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Model pipeline errors
    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error("Feature schema drift: {0}")]
    SchemaDrift(String),

    #[error(transparent)]
    UnknownCategory(#[from] FeatureError),

    // External service errors
    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<MlError> for AppError {
    fn from(err: MlError) -> Self {
        match err {
            MlError::InsufficientTrainingData(msg) => AppError::InsufficientTrainingData(msg),
            MlError::SchemaDrift(msg) => AppError::SchemaDrift(msg),
            MlError::Category(err) => AppError::UnknownCategory(err),
            MlError::InvalidConfig(msg) => AppError::Configuration(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid {}", field));
                (field.to_string(), message)
            });
        match first {
            Some((field, message)) => AppError::Validation { field, message },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::ValidationError(_) | AppError::UnknownCategory(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientTrainingData(_) | AppError::SchemaDrift(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_detail = match &self {
            AppError::Validation { field, message } => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: message.clone(),
                field: Some(field.clone()),
            },
            AppError::ValidationError(msg) => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: msg.clone(),
                field: None,
            },
            AppError::NotFound(resource) => ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message: format!("{} not found", resource),
                field: None,
            },
            AppError::InsufficientTrainingData(msg) => ErrorDetail {
                code: "INSUFFICIENT_TRAINING_DATA".to_string(),
                message: msg.clone(),
                field: None,
            },
            AppError::SchemaDrift(msg) => ErrorDetail {
                code: "SCHEMA_DRIFT".to_string(),
                message: msg.clone(),
                field: None,
            },
            AppError::UnknownCategory(FeatureError::UnknownCategory { kind, value }) => ErrorDetail {
                code: "UNKNOWN_CATEGORY".to_string(),
                message: format!("Unknown {}: {}", kind, value),
                field: Some(kind.to_string()),
            },
            AppError::ExternalService(msg) => ErrorDetail {
                code: "EXTERNAL_SERVICE_ERROR".to_string(),
                message: format!("External service error: {}", msg),
                field: None,
            },
            AppError::Configuration(_) => ErrorDetail {
                code: "CONFIGURATION_ERROR".to_string(),
                message: "The service is misconfigured".to_string(),
                field: None,
            },
            AppError::DatabaseError(_) => ErrorDetail {
                code: "DATABASE_ERROR".to_string(),
                message: "A database error occurred".to_string(),
                field: None,
            },
            AppError::Internal(_) | AppError::InternalError(_) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: "An internal server error occurred".to_string(),
                field: None,
            },
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (self.status(), Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CategoryKind;

    #[test]
    fn test_pipeline_errors_map_to_client_errors() {
        let err: AppError = MlError::InsufficientTrainingData("10 samples".into()).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: AppError = MlError::SchemaDrift("order".into()).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: AppError = MlError::Category(FeatureError::UnknownCategory {
            kind: CategoryKind::District,
            value: "Atlantis".into(),
        })
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_artifact_failures_are_internal() {
        let err: AppError = MlError::ArtifactLoad("checksum".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
