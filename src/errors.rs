use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use derive_more::Display;
use serde_json::json;
use std::fmt;

#[derive(Debug, Display)]
pub enum ApiError {
    /// `detail` carries the underlying error and is only set in development mode
    #[display(fmt = "{}", message)]
    Internal {
        message: String,
        detail: Option<String>,
    },

    #[display(fmt = "Bad request: {}", _0)]
    BadRequest(String),
}

impl ApiError {
    pub fn internal(message: &str, cause: &dyn fmt::Display, expose_detail: bool) -> Self {
        ApiError::Internal {
            message: message.to_string(),
            detail: expose_detail.then(|| cause.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Internal {
                ref message,
                detail: Some(ref detail),
            } => HttpResponse::InternalServerError().json(json!({
                "message": message,
                "error": detail
            })),
            ApiError::Internal { ref message, .. } => {
                HttpResponse::InternalServerError().json(json!({
                    "message": message
                }))
            }
            ApiError::BadRequest(ref message) => HttpResponse::BadRequest().json(json!({
                "message": message
            })),
        }
    }
}
