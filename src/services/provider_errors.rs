// src/services/provider_errors.rs
use crate::services::image_provider::ProviderError;
use actix_web::http::StatusCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedError {
    pub status: StatusCode,
    pub message: String,
}

impl MappedError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

const CONTENT_POLICY_CODES: [&str; 2] = ["moderation_blocked", "content_policy_violation"];

/// Translate a provider failure into what the client gets to see.
pub fn map_provider_error(err: &ProviderError) -> MappedError {
    match err {
        ProviderError::Timeout => {
            MappedError::new(StatusCode::GATEWAY_TIMEOUT, "Image generation timed out")
        }
        ProviderError::Transport(_) => {
            MappedError::new(StatusCode::BAD_GATEWAY, "Image provider is unreachable")
        }
        ProviderError::Api { status: 400, code, message } => {
            if code
                .as_deref()
                .is_some_and(|c| CONTENT_POLICY_CODES.contains(&c))
            {
                MappedError::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Poster description was rejected by the provider's content policy",
                )
            } else {
                MappedError::new(StatusCode::BAD_REQUEST, message.clone())
            }
        }
        ProviderError::Api { status: 401 | 403, .. } => MappedError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Image provider credentials are misconfigured",
        ),
        ProviderError::Api { status: 429, .. } => MappedError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Image provider is over capacity, try again later",
        ),
        ProviderError::Api { .. } => MappedError::new(StatusCode::BAD_GATEWAY, "Image provider failed"),
        ProviderError::InvalidResponse(_) => MappedError::new(
            StatusCode::BAD_GATEWAY,
            "Image provider returned an unreadable response",
        ),
    }
}
