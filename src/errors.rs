// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StylistError {
    #[error("{0}")]
    Validation(String),

    #[error("Image exceeds the {limit} byte upload limit")]
    UploadTooLarge { limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {details}")]
    Provider {
        status: Option<u16>,
        details: String,
    },
}

impl StylistError {
    pub fn provider(details: impl Into<String>) -> Self {
        StylistError::Provider {
            status: None,
            details: details.into(),
        }
    }
}

impl ResponseError for StylistError {
    fn status_code(&self) -> StatusCode {
        match self {
            StylistError::Validation(_) => StatusCode::BAD_REQUEST,
            StylistError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            StylistError::Config(_) | StylistError::Provider { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            StylistError::Validation(_) | StylistError::UploadTooLarge { .. } => {
                serde_json::json!({
                    "success": false,
                    "error": self.to_string()
                })
            }
            StylistError::Config(message) => serde_json::json!({
                "success": false,
                "error": "Server configuration error",
                "details": message
            }),
            StylistError::Provider { status, details } => {
                let details = match status {
                    Some(code) => format!("API Error: {} - {}", code, details),
                    None => details.clone(),
                };
                serde_json::json!({
                    "success": false,
                    "error": "AI provider request failed",
                    "details": details
                })
            }
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
