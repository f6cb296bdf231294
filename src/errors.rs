use actix_web::http::StatusCode;
use actix_web::{error::ResponseError, HttpResponse};
use log::{debug, error, warn};
use serde_json::json;
use thiserror::Error;

use crate::ports::BackendError;
use crate::validation::FieldErrors;
use crate::views::Notice;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(FieldErrors),
    #[error("Session required")]
    SessionRequired { redirect: &'static str },
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Access denied: {message}")]
    AccessDenied { message: String, redirect: &'static str },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{title}: {message}")]
    Backend { title: &'static str, message: String },
}

impl ApiError {
    pub fn backend(title: &'static str, err: BackendError) -> Self {
        ApiError::Backend { title, message: err.to_string() }
    }
}

impl From<FieldErrors> for ApiError {
    fn from(fields: FieldErrors) -> Self {
        ApiError::Validation(fields)
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            ApiError::Validation(fields) => {
                warn!("\x1B[1;33mVALIDATION ERROR:\x1B[0m {} field(s)", fields.len());
                builder.json(json!({ "error": "Validation failed", "fields": fields }))
            }
            ApiError::SessionRequired { redirect } => {
                debug!("\x1B[1;36mSESSION REQUIRED:\x1B[0m redirecting to {}", redirect);
                builder.json(json!({ "error": "Not signed in", "redirect": redirect }))
            }
            ApiError::Auth(msg) => {
                warn!("\x1B[1;33mAUTHENTICATION ERROR:\x1B[0m {}", msg);
                builder.json(json!({ "error": msg }))
            }
            ApiError::AccessDenied { message, redirect } => {
                warn!("\x1B[1;33mACCESS DENIED:\x1B[0m {}", message);
                builder.json(json!({
                    "error": message,
                    "redirect": redirect,
                    "notice": Notice::destructive("Access denied", message.as_str()),
                }))
            }
            ApiError::NotFound(msg) => {
                debug!("\x1B[1;36mNOT FOUND ERROR:\x1B[0m {}", msg);
                builder.json(json!({ "error": msg }))
            }
            ApiError::Backend { title, message } => {
                error!("\x1B[1;31mBACKEND ERROR:\x1B[0m {}: {}", title, message);
                builder.json(json!({
                    "error": message,
                    "notice": Notice::destructive(title, message.as_str()),
                }))
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionRequired { .. } | ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
