// src/handlers.rs
use crate::{
    AppState,
    errors::PosterError,
    models::{GenerationMode, GenerationResult, PosterRequest},
    services::{
        cache::idempotency_key, orchestrator::PreparedReferences, payload_normalizer,
        rate_limiter::RateLimitDecision,
    },
    submission::read_submission,
};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use log::{error, info, warn};
use uuid::Uuid;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/poster", web::post().to(create_poster))
        .route("/health", web::get().to(health_check));
}

pub async fn create_poster(
    req: HttpRequest,
    payload: web::Payload,
    data: web::Data<AppState>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let client_ip = client_ip(&req);

    let parsed = read_submission(&req, payload, data.max_upload_bytes)
        .await
        .and_then(|s| payload_normalizer::normalize(&s.fields).map(|r| (r, s.references)));
    let (request, references) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return reject(&data, request_id, &client_ip, None, e).await,
    };
    let mode = GenerationMode::for_image_count(references.len());
    let key = idempotency_key(mode, &request, &references);

    // Cache hits are served before rate limiting, so they never spend a token.
    if let Some(cached) = data.result_cache.get(&key).await {
        info!("[{}] {} served from cache", request_id, key);
        let limits = data.rate_limiter.peek(&client_ip).await;
        let resp = HttpResponse::Ok().json(&cached);
        return annotate(resp, request_id, CacheStatus::Hit, Some(&key), &limits);
    }

    // Exhausted clients are turned away before any decoding work.
    let current = data.rate_limiter.peek(&client_ip).await;
    if current.remaining == 0 {
        return rate_limited(request_id, &client_ip, &key, &current);
    }

    // Uploads are decoded before a token is spent, so a 415 costs the client nothing.
    let prepared = match data.orchestrator.prepare(references).await {
        Ok(prepared) => prepared,
        Err(e) => return reject(&data, request_id, &client_ip, Some(&key), e).await,
    };

    let limits = data.rate_limiter.check(&client_ip).await;
    if !limits.ok {
        return rate_limited(request_id, &client_ip, &key, &limits);
    }

    info!(
        "[{}] generating {} poster with {} reference image(s)",
        request_id,
        mode.as_str(),
        prepared.count
    );

    // Detached so a client that hangs up still leaves a cached, already billed result.
    let job = tokio::spawn(generate_and_store(data.clone(), key.clone(), request, prepared));
    let resp = match job.await {
        Ok(Ok(result)) => HttpResponse::Ok().json(&result),
        Ok(Err(e)) => {
            warn!("[{}] generation failed: {}", request_id, e);
            e.error_response()
        }
        Err(e) => {
            error!("[{}] generation task panicked: {}", request_id, e);
            PosterError::Internal(e.to_string()).error_response()
        }
    };

    annotate(resp, request_id, CacheStatus::Miss, Some(&key), &limits)
}

async fn generate_and_store(
    data: web::Data<AppState>,
    key: String,
    request: PosterRequest,
    prepared: PreparedReferences,
) -> Result<GenerationResult, PosterError> {
    let result = data.orchestrator.generate(&request, prepared).await?;
    if let Err(e) = data.result_cache.set(&key, &result).await {
        warn!("Failed to cache {}: {}", key, e);
    }
    Ok(result)
}

/// Error response for a request that never reached the limiter; reports the window untouched.
async fn reject(
    data: &AppState,
    request_id: Uuid,
    client_ip: &str,
    key: Option<&str>,
    err: PosterError,
) -> HttpResponse {
    info!("[{}] rejected: {}", request_id, err);
    let limits = data.rate_limiter.peek(client_ip).await;
    annotate(err.error_response(), request_id, CacheStatus::Miss, key, &limits)
}

fn rate_limited(
    request_id: Uuid,
    client_ip: &str,
    key: &str,
    limits: &RateLimitDecision,
) -> HttpResponse {
    warn!("[{}] rate limit exceeded for {}", request_id, client_ip);
    let err = PosterError::RateLimited { retry_after_secs: limits.retry_after_secs };
    annotate(err.error_response(), request_id, CacheStatus::Miss, Some(key), limits)
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Clone, Copy)]
enum CacheStatus {
    Hit,
    Miss,
}

fn annotate(
    mut resp: HttpResponse,
    request_id: Uuid,
    cache: CacheStatus,
    key: Option<&str>,
    limits: &RateLimitDecision,
) -> HttpResponse {
    let headers = resp.headers_mut();
    let cache = match cache {
        CacheStatus::Hit => "HIT",
        CacheStatus::Miss => "MISS",
    };
    headers.insert(HeaderName::from_static("x-cache"), HeaderValue::from_static(cache));
    if let Some(Ok(value)) = key.map(HeaderValue::from_str) {
        headers.insert(HeaderName::from_static("x-idempotency-key"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(HeaderName::from_static("x-request-id"), value);
    }
    limits.write_headers(headers);
    resp
}

/// First hop of the forwarded chain, else the peer address.
fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageSize;
    use crate::services::cache::ResultCache;
    use crate::services::image_processor::ImageProcessor;
    use crate::services::image_provider::{ProviderError, ProviderImage};
    use crate::services::orchestrator::GenerationOrchestrator;
    use crate::services::orchestrator::tests::{Call, FakeProvider, png_bytes};
    use crate::services::rate_limiter::RateLimiter;
    use crate::services::store::MemoryStore;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    const BOUNDARY: &str = "----posterboundary";

    fn state(provider: Arc<FakeProvider>, limit: u32) -> AppState {
        let store = Arc::new(MemoryStore::new());
        AppState {
            result_cache: Arc::new(ResultCache::new(store.clone(), Duration::from_secs(60))),
            rate_limiter: Arc::new(RateLimiter::new(store, limit, Duration::from_secs(60))),
            orchestrator: Arc::new(GenerationOrchestrator::new(
                provider,
                Arc::new(ImageProcessor::new()),
                ImageSize { width: 1024, height: 1536 },
            )),
            max_upload_bytes: 1024 * 1024,
        }
    }

    fn json_request(body: Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/poster")
            .insert_header(("x-forwarded-for", "198.51.100.7, 10.0.0.1"))
            .set_json(body)
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a str, Vec<u8>),
    }

    fn multipart_request(parts: Vec<Part<'_>>) -> test::TestRequest {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, content_type, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, filename, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        test::TestRequest::post()
            .uri("/poster")
            .insert_header(("x-forwarded-for", "198.51.100.7"))
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    fn header<'a>(resp: &'a actix_web::dev::ServiceResponse, name: &str) -> &'a str {
        resp.headers()
            .get(name)
            .unwrap_or_else(|| panic!("missing header {}", name))
            .to_str()
            .unwrap()
    }

    #[actix_web::test]
    async fn json_request_generates_then_hits_cache() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 4)))
                .configure(configure),
        )
        .await;
        let body = json!({ "payload": { "posterNotes": "Hiring a backend engineer" } });

        let first = test::call_service(&app, json_request(body.clone()).to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(header(&first, "x-cache"), "MISS");
        assert_eq!(header(&first, "x-ratelimit-limit"), "4");
        assert_eq!(header(&first, "x-ratelimit-remaining"), "3");
        let key = header(&first, "x-idempotency-key").to_string();
        assert!(key.starts_with("poster:gen:"));
        let first_body: Value = test::read_body_json(first).await;
        assert_eq!(first_body["type"], "poster");
        assert_eq!(first_body["meta"]["mode"], "generate");
        assert_eq!(first_body["meta"]["size"], "1024x1536");
        assert!(first_body["image"].as_str().unwrap().starts_with("data:image/png;base64,"));

        let second = test::call_service(&app, json_request(body).to_request()).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(header(&second, "x-cache"), "HIT");
        assert_eq!(header(&second, "x-idempotency-key"), key);
        // the hit did not spend a token
        assert_eq!(header(&second, "x-ratelimit-remaining"), "3");
        let second_body: Value = test::read_body_json(second).await;
        assert_eq!(second_body, first_body);
        assert_eq!(provider.calls().len(), 1);
    }

    #[actix_web::test]
    async fn whitespace_only_notes_are_rejected_before_the_provider() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 4)))
                .configure(configure),
        )
        .await;

        for payload in [json!({}), json!({ "posterNotes": "   " }), json!({ "title": "Only a title" })] {
            let resp =
                test::call_service(&app, json_request(json!({ "payload": payload })).to_request())
                    .await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(header(&resp, "x-cache"), "MISS");
            assert_eq!(header(&resp, "x-ratelimit-limit"), "4");
            assert_eq!(header(&resp, "x-ratelimit-remaining"), "4");
            assert!(resp.headers().get("x-idempotency-key").is_none());
            let body: Value = test::read_body_json(resp).await;
            assert!(body["message"].as_str().unwrap().contains("posterNotes"));
        }
        assert!(provider.calls().is_empty());
    }

    #[actix_web::test]
    async fn bad_transports_are_400() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeProvider::new()), 4)))
                .configure(configure),
        )
        .await;

        let wrong_type = test::TestRequest::post()
            .uri("/poster")
            .insert_header(("content-type", "text/plain"))
            .set_payload("posterNotes=hi")
            .to_request();
        let resp = test::call_service(&app, wrong_type).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(header(&resp, "x-cache"), "MISS");
        assert_eq!(header(&resp, "x-ratelimit-remaining"), "4");

        let malformed = test::TestRequest::post()
            .uri("/poster")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"payload\": {")
            .to_request();
        let resp = test::call_service(&app, malformed).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().contains("{\\\"payload\\\": {"));
    }

    #[actix_web::test]
    async fn two_images_compose_under_an_edit_key() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 10)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            multipart_request(vec![
                Part::Text("posterNotes", "Join our team"),
                Part::File("sampleImages", "a.png", "image/png", png_bytes(64, 64, [200, 0, 0])),
                Part::File("sampleImages", "b.bin", "application/octet-stream", png_bytes(32, 64, [0, 0, 200])),
            ])
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let compose_key = header(&resp, "x-idempotency-key").to_string();
        assert!(compose_key.starts_with("poster:edit:"));
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["meta"]["mode"], "edit_compose");

        let resp = test::call_service(
            &app,
            multipart_request(vec![Part::Text("posterNotes", "Join our team")]).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, "x-cache"), "MISS");
        assert_ne!(header(&resp, "x-idempotency-key"), compose_key);

        let calls = provider.calls();
        assert!(matches!(calls[0], Call::Edit { width: 1024, .. }));
        assert!(matches!(calls[1], Call::Generate { .. }));
    }

    #[actix_web::test]
    async fn legacy_field_is_appended_and_capped() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 10)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            multipart_request(vec![
                Part::File("sampleImage", "legacy.png", "image/png", png_bytes(8, 8, [0, 0, 0])),
                Part::Text("posterNotes", "Now hiring"),
                Part::File("sampleImages[]", "1.png", "image/png", png_bytes(8, 8, [1, 1, 1])),
                Part::File("sampleImages[]", "2.png", "image/png", png_bytes(8, 8, [2, 2, 2])),
                Part::File("sampleImages[]", "3.png", "image/png", png_bytes(8, 8, [3, 3, 3])),
                Part::File("sampleImages[]", "4.png", "image/png", png_bytes(8, 8, [4, 4, 4])),
            ])
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["meta"]["mode"], "edit_compose");
        assert!(body["meta"]["prompt"].as_str().unwrap().contains("3 references"));
    }

    #[actix_web::test]
    async fn undecodable_upload_is_415() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 10)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            multipart_request(vec![
                Part::Text("posterNotes", "Join our team"),
                Part::File("sampleImages", "resume.pdf", "image/png", b"%PDF-1.7 not an image".to_vec()),
            ])
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(header(&resp, "x-cache"), "MISS");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Unsupported image resume.pdf – cannot decode");
        assert!(provider.calls().is_empty());
    }

    #[actix_web::test]
    async fn oversized_body_is_413_with_headers() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeProvider::new()), 4)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            multipart_request(vec![
                Part::Text("posterNotes", "Join our team"),
                Part::File("sampleImages", "huge.png", "image/png", vec![0u8; 2 * 1024 * 1024]),
            ])
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(header(&resp, "x-cache"), "MISS");
        assert_eq!(header(&resp, "x-ratelimit-limit"), "4");
    }

    #[actix_web::test]
    async fn undecodable_upload_does_not_spend_a_token() {
        let provider = Arc::new(FakeProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(provider.clone(), 1)))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(
            &app,
            multipart_request(vec![
                Part::Text("posterNotes", "Join our team"),
                Part::File("sampleImages", "bad.png", "image/png", b"not a png".to_vec()),
            ])
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(header(&resp, "x-ratelimit-remaining"), "1");

        let body = json!({ "payload": { "posterNotes": "Join our team" } });
        let resp = test::call_service(&app, json_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, "x-ratelimit-remaining"), "0");
        assert_eq!(provider.calls().len(), 1);
    }

    #[actix_web::test]
    async fn fifth_request_in_a_window_is_429() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeProvider::new()), 4)))
                .configure(configure),
        )
        .await;

        for i in 0..4 {
            let body = json!({ "payload": { "posterNotes": format!("Role #{}", i) } });
            let resp = test::call_service(&app, json_request(body).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let body = json!({ "payload": { "posterNotes": "Role #5" } });
        let resp = test::call_service(&app, json_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&resp, "x-ratelimit-remaining"), "0");
        assert_eq!(header(&resp, "x-ratelimit-limit"), "4");
        assert!(header(&resp, "retry-after").parse::<u64>().unwrap() >= 1);
        assert!(header(&resp, "x-ratelimit-reset").parse::<i64>().is_ok());

        // cached requests are still served while limited
        let body = json!({ "payload": { "posterNotes": "Role #0" } });
        let resp = test::call_service(&app, json_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, "x-cache"), "HIT");
    }

    #[actix_web::test]
    async fn provider_outcomes_map_to_statuses() {
        let cases = [
            (FakeProvider::returning(ProviderImage::default()), StatusCode::BAD_GATEWAY),
            (
                FakeProvider::failing_with(ProviderError::Api {
                    status: 429,
                    code: Some("rate_limit_exceeded".to_string()),
                    message: "slow down".to_string(),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (FakeProvider::failing_with(ProviderError::Timeout), StatusCode::GATEWAY_TIMEOUT),
        ];

        for (provider, expected) in cases {
            let app = test::init_service(
                App::new()
                    .app_data(web::Data::new(state(Arc::new(provider), 4)))
                    .configure(configure),
            )
            .await;
            let body = json!({ "payload": { "posterNotes": "Hiring" } });
            let resp = test::call_service(&app, json_request(body.clone()).to_request()).await;
            assert_eq!(resp.status(), expected);

            // failures are not cached
            let resp = test::call_service(&app, json_request(body).to_request()).await;
            assert_eq!(header(&resp, "x-cache"), "MISS");
        }
    }

    #[actix_web::test]
    async fn health_reports_service() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeProvider::new()), 4)))
                .configure(configure),
        )
        .await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "poster-studio");
    }
}
