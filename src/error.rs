//! Typed errors and HTTP mapping.

use crate::store::StoreError;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} column {column}")]
    InvalidPrimaryKey { entity: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Request-level failure. `Api`, `Validation`, `NotFound` and `BadRequest` are domain
/// errors whose message reaches the client; the rest are answered generically.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("csv: {0}")]
    Csv(String),
}

impl AppError {
    pub fn api(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Api {
            status,
            message: message.into(),
        }
    }

    /// Status for domain errors; `None` for errors that must be answered generically.
    pub fn domain_status(&self) -> Option<StatusCode> {
        match self {
            AppError::Api { status, .. } => Some(*status),
            AppError::Validation(_) | AppError::NotFound(_) => Some(StatusCode::UNPROCESSABLE_ENTITY),
            AppError::BadRequest(_) => Some(StatusCode::BAD_REQUEST),
            AppError::Config(_) | AppError::Store(_) | AppError::Csv(_) => None,
        }
    }

    /// Message shown to clients for domain errors.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Api { message, .. }
            | AppError::NotFound(message)
            | AppError::Validation(message)
            | AppError::BadRequest(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Csv(e.to_string())
    }
}
