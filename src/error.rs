use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::classifier::ClassifierError;

/// Failures of the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Task(#[from] rocket::tokio::task::JoinError),
}

/// Route-level failures. Every variant renders as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User not authenticated")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFoundOrForbidden(&'static str),
    #[error("{message}: {source}")]
    Store {
        message: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("{message}: {source}")]
    Classifier {
        message: &'static str,
        #[source]
        source: ClassifierError,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    /// Adapter for `map_err` that tags a store failure with the message the
    /// client will see.
    pub fn store<E: Into<StoreError>>(message: &'static str) -> impl FnOnce(E) -> ApiError {
        move |source| ApiError::Store {
            message,
            source: source.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::Unauthenticated => Status::Unauthorized,
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::NotFoundOrForbidden(_) => Status::NotFound,
            ApiError::Store { .. } | ApiError::Classifier { .. } => Status::InternalServerError,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Store { message, .. } | ApiError::Classifier { message, .. } => {
                message.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!(uri = %request.uri(), error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).respond_to(request)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
