// Copyright 2023 Remi Bernotavicius

use crate::database::models::MealCategory;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Wrong category")]
    InvalidCategory,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Connection(#[from] diesel::ConnectionError),

    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidCategory => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_)
            | Self::Connection(_)
            | Self::Pool(_)
            | Self::Migration(_)
            | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidCategory => json!({
                "error": self.to_string(),
                "valid_categories": MealCategory::names(),
            }),
            Self::NotFound(message) => json!({
                "error": "Not Found",
                "message": message,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            log::error!("request failed: {self}");
        } else {
            log::warn!("request rejected: {self}");
        }

        (status, Json(body)).into_response()
    }
}

#[test]
fn error_statuses() {
    assert_eq!(
        Error::validation("Missing field: date").status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(Error::InvalidCategory.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        Error::not_found("Meal plan not found").status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        Error::from(diesel::result::Error::NotFound).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn storage_errors_surface_their_text() {
    let error = Error::from(diesel::result::Error::RollbackTransaction);
    assert_eq!(
        error.to_string(),
        diesel::result::Error::RollbackTransaction.to_string()
    );
}
