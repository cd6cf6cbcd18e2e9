// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod submission;

use crate::config::Config;
use crate::services::store::{CacheStore, CounterStore};
use crate::services::{
    GenerationOrchestrator, ImageProcessor, MemoryStore, OpenAiImageProvider, RateLimiter,
    RedisService, ResultCache,
};

#[derive(Clone)]
pub struct AppState {
    result_cache: Arc<ResultCache>,
    rate_limiter: Arc<RateLimiter>,
    orchestrator: Arc<GenerationOrchestrator>,
    max_upload_bytes: usize,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting poster studio...");

    let config = Config::from_env()?;

    // Initialize services
    let (cache_store, counter_store): (Arc<dyn CacheStore>, Arc<dyn CounterStore>) =
        match &config.redis_url {
            Some(url) => {
                let redis = Arc::new(
                    RedisService::new(url)
                        .await
                        .context("failed to connect to Redis")?,
                );
                info!("Using Redis for poster cache and rate limits");
                (redis.clone() as Arc<dyn CacheStore>, redis as Arc<dyn CounterStore>)
            }
            None => {
                warn!("REDIS_URL not set, cache and rate limits are per process");
                let memory = Arc::new(MemoryStore::new());
                (memory.clone() as Arc<dyn CacheStore>, memory as Arc<dyn CounterStore>)
            }
        };

    let provider = Arc::new(
        OpenAiImageProvider::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.image_model.clone(),
            config.provider_timeout,
        )
        .context("failed to build image provider client")?,
    );

    let app_state = AppState {
        result_cache: Arc::new(ResultCache::new(cache_store, config.cache_ttl)),
        rate_limiter: Arc::new(RateLimiter::new(
            counter_store,
            config.rate_limit_max,
            config.rate_limit_window,
        )),
        orchestrator: Arc::new(GenerationOrchestrator::new(
            provider,
            Arc::new(ImageProcessor::new()),
            config.image_size,
        )),
        max_upload_bytes: config.max_upload_bytes,
    };

    info!(
        "Generating {} posters with {} via {}, listening on {}",
        config.image_size, config.image_model, config.openai_base_url, config.bind_addr
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
