// src/config.rs
use anyhow::{Context, Result, bail};
use std::time::Duration;

/// Upper bound on reference images per request. Not configurable.
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// Output size as understood by the image provider, e.g. `1024x1536`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn parse(raw: &str) -> Result<Self> {
        let (w, h) = raw
            .trim()
            .split_once(['x', 'X'])
            .with_context(|| format!("image size '{raw}' must look like WxH"))?;
        let width: u32 = w.parse().with_context(|| format!("invalid width in '{raw}'"))?;
        let height: u32 = h.parse().with_context(|| format!("invalid height in '{raw}'"))?;
        if width == 0 || height == 0 {
            bail!("image size '{raw}' must be non-zero");
        }
        Ok(Self { width, height })
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub redis_url: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub image_model: String,
    pub image_size: ImageSize,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
    pub cache_ttl: Duration,
    pub provider_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            image_model: env_or("POSTER_IMAGE_MODEL", "gpt-image-1"),
            image_size: ImageSize::parse(&env_or("POSTER_IMAGE_SIZE", "1024x1536"))?,
            rate_limit_window: Duration::from_secs(parse_env("POSTER_RATE_LIMIT_WINDOW_SEC", 60)?),
            rate_limit_max: parse_env("POSTER_RATE_LIMIT_MAX", 4)?,
            cache_ttl: Duration::from_millis(parse_env("POSTER_CACHE_TTL_MS", 900_000)?),
            provider_timeout: Duration::from_secs(parse_env("POSTER_PROVIDER_TIMEOUT_SEC", 120)?),
            max_upload_bytes: parse_env("POSTER_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
