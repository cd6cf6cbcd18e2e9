// src/services/image_provider.rs
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response, multipart};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("image provider timed out")]
    Timeout,

    #[error("image provider request failed: {0}")]
    Transport(String),

    #[error("image provider returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("image provider response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// First image of a provider response. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderImage {
    pub b64_json: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str, size: &str) -> Result<ProviderImage, ProviderError>;

    /// `image` is PNG encoded.
    async fn edit(
        &self,
        prompt: &str,
        image: Vec<u8>,
        size: &str,
    ) -> Result<ProviderImage, ProviderError>;
}

pub struct OpenAiImageProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl OpenAiImageProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    async fn first_image(response: Response) -> Result<ProviderImage, ProviderError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        let parsed: ImagesResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(parsed.data.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn generate(&self, prompt: &str, size: &str) -> Result<ProviderImage, ProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": size,
            }))
            .send()
            .await?;

        let image = Self::first_image(response).await;
        debug!("images/generations finished in {}ms", start.elapsed().as_millis());
        image
    }

    async fn edit(
        &self,
        prompt: &str,
        image: Vec<u8>,
        size: &str,
    ) -> Result<ProviderImage, ProviderError> {
        let start = Instant::now();
        let image_part = multipart::Part::bytes(image)
            .file_name("reference.png")
            .mime_str("image/png")?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", size.to_string())
            .part("image", image_part);

        let response = self
            .client
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let image = Self::first_image(response).await;
        debug!("images/edits finished in {}ms", start.elapsed().as_millis());
        image
    }
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ProviderImage>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

fn api_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ProviderError::Api {
            status,
            code: envelope.error.code,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| "no message".to_string()),
        },
        Err(_) => ProviderError::Api {
            status,
            code: None,
            message: body.chars().take(300).collect(),
        },
    }
}
