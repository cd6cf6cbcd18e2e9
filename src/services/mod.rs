// src/services/mod.rs
pub mod cache;
pub mod image_processor;
pub mod image_provider;
pub mod orchestrator;
pub mod payload_normalizer;
pub mod prompt;
pub mod provider_errors;
pub mod rate_limiter;
pub mod redis_service;
pub mod store;

pub use cache::ResultCache;
pub use image_processor::ImageProcessor;
pub use image_provider::OpenAiImageProvider;
pub use orchestrator::GenerationOrchestrator;
pub use rate_limiter::RateLimiter;
pub use redis_service::RedisService;
pub use store::MemoryStore;
