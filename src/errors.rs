// src/errors.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use thiserror::Error;

use crate::services::image_provider::ProviderError;
use crate::services::provider_errors::map_provider_error;

#[derive(Error, Debug)]
pub enum PosterError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported image {filename} – cannot decode")]
    UnsupportedImage { filename: String },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Image provider returned no image")]
    ProviderNoImage,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PosterError {
    pub fn missing_field(field: &str) -> Self {
        PosterError::Validation(format!("{field} is required"))
    }
}

impl ResponseError for PosterError {
    fn status_code(&self) -> StatusCode {
        match self {
            PosterError::Validation(_) => StatusCode::BAD_REQUEST,
            PosterError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PosterError::UnsupportedImage { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PosterError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PosterError::ProviderNoImage => StatusCode::BAD_GATEWAY,
            PosterError::Provider(e) => map_provider_error(e).status,
            PosterError::ImageProcessing(_)
            | PosterError::Store(_)
            | PosterError::Serialization(_)
            | PosterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (category, message) = match self {
            PosterError::Validation(_) => ("Validation error", self.to_string()),
            PosterError::PayloadTooLarge(_) => ("Payload too large", self.to_string()),
            PosterError::UnsupportedImage { .. } => ("Unsupported image", self.to_string()),
            PosterError::RateLimited { .. } => ("Rate limit exceeded", self.to_string()),
            PosterError::ProviderNoImage => ("Image provider error", self.to_string()),
            PosterError::Provider(e) => {
                error!("Image provider failure: {}", e);
                ("Image provider error", map_provider_error(e).message)
            }
            PosterError::ImageProcessing(_)
            | PosterError::Store(_)
            | PosterError::Serialization(_)
            | PosterError::Internal(_) => {
                error!("Internal failure: {}", self);
                ("Internal error", "Something went wrong generating the poster".to_string())
            }
        };

        let mut builder = HttpResponse::build(self.status_code());
        if let PosterError::RateLimited { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }
        builder.json(serde_json::json!({
            "error": category,
            "message": message
        }))
    }
}
