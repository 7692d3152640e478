//! Integration tests for the textclf HTTP API.
//!
//! The router is driven through `tower::ServiceExt::oneshot` with a mock
//! model loader, so no network access or model download is needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use textclf_classifiers::{Classifier, InferenceService, ModelLoader, ModelSpec, ServiceLimits};
use textclf_core::{Error, Result};
use textclf_server::{build_router, start_service, AppState, ServerConfig};
use tower::ServiceExt;

/// Keyword sentiment model with call accounting
#[derive(Default)]
struct KeywordClassifier {
    labels: Vec<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
}

impl Classifier for KeywordClassifier {
    fn predict(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        if text.contains("slow") {
            std::thread::sleep(Duration::from_millis(300));
        }

        let result = if text.contains("fail") {
            Err(Error::inference("backend exploded"))
        } else if text.contains("hate") {
            Ok(vec![0.98, 0.02])
        } else {
            Ok(vec![0.1, 0.9])
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

struct KeywordLoader {
    classifier: Arc<KeywordClassifier>,
}

#[async_trait]
impl ModelLoader for KeywordLoader {
    async fn load(&self, _spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
        let classifier: Arc<dyn Classifier> = self.classifier.clone();
        Ok(classifier)
    }
}

/// Loader whose every attempt fails, as with a missing repository
#[derive(Default)]
struct BrokenLoader {
    attempts: AtomicUsize,
}

#[async_trait]
impl ModelLoader for BrokenLoader {
    async fn load(&self, _spec: &ModelSpec) -> Result<Arc<dyn Classifier>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::model_load("repository not found"))
    }
}

struct TestApp {
    router: Router,
    service: Arc<InferenceService>,
    classifier: Arc<KeywordClassifier>,
}

fn test_app(limits: ServiceLimits) -> TestApp {
    let classifier = Arc::new(KeywordClassifier {
        labels: vec!["NEGATIVE".to_string(), "POSITIVE".to_string()],
        ..Default::default()
    });
    let loader = KeywordLoader {
        classifier: Arc::clone(&classifier),
    };
    let service = Arc::new(InferenceService::new(Arc::new(loader), limits));
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let router = build_router(AppState::new(
        Arc::clone(&service),
        ServerConfig::default(),
        metrics,
    ));

    TestApp {
        router,
        service,
        classifier,
    }
}

async fn ready_app(limits: ServiceLimits) -> TestApp {
    let app = test_app(limits);
    app.service.initialize(&ModelSpec::default()).await.unwrap();
    app
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn predict_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_healthz_ok_before_and_after_load() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));

    app.service.initialize(&ModelSpec::default()).await.unwrap();

    let response = app.router.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_readyz_reflects_model_state() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({ "ready": false }));

    app.service.initialize(&ModelSpec::default()).await.unwrap();

    let response = app.router.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ready"], true);
    assert!(body["model"]
        .as_str()
        .unwrap()
        .starts_with("distilbert/distilbert-base-uncased-finetuned-sst-2-english"));
    assert!(body["loaded_at"].is_string());
}

#[tokio::test]
async fn test_root_welcome_message() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["message"],
        "Welcome to the Sentiment & Emotion Classifier API!"
    );
}

#[tokio::test]
async fn test_predict_returns_label_and_score_only() {
    let app = ready_app(ServiceLimits::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(predict_request(json!({ "text": "I love this!" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["label"], "POSITIVE");
    assert!((body["score"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    assert_eq!(body.as_object().unwrap().len(), 2);

    let response = app
        .router
        .oneshot(predict_request(json!({ "text": "I hate this." })))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["label"], "NEGATIVE");
}

#[tokio::test]
async fn test_predict_accepts_exactly_max_length() {
    let app = ready_app(ServiceLimits::default()).await;

    let text = "é".repeat(2000);
    let response = app
        .router
        .oneshot(predict_request(json!({ "text": text })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_text_is_400_and_never_reaches_model() {
    let app = ready_app(ServiceLimits::default()).await;

    for text in [String::new(), "a".repeat(2001)] {
        let response = app
            .router
            .clone()
            .oneshot(predict_request(json!({ "text": text })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "validation_error");
        assert!(body["error"]["message"].is_string());
    }

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_validation_checked_before_readiness() {
    let app = test_app(ServiceLimits::default());

    let response = app
        .router
        .oneshot(predict_request(json!({ "text": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_before_load_is_503() {
    let app = test_app(ServiceLimits::default());

    let response = app
        .router
        .oneshot(predict_request(json!({ "text": "I love this!" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get(header::RETRY_AFTER).is_none());

    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "not_ready");
    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let app = ready_app(ServiceLimits::default()).await;

    // Syntax error
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"text\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");

    // Missing field
    let response = app
        .router
        .clone()
        .oneshot(predict_request(json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Wrong type
    let response = app
        .router
        .clone()
        .oneshot(predict_request(json!({ "text": 42 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Not JSON at all
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from("text=hello"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let app = ready_app(ServiceLimits::default()).await;

    let text = "a".repeat(70 * 1024);
    let response = app
        .router
        .oneshot(predict_request(json!({ "text": text })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backend_failure_is_500_and_service_recovers() {
    let app = ready_app(ServiceLimits::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(predict_request(json!({ "text": "please fail" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "inference_error");

    let response = app
        .router
        .oneshot(predict_request(json!({ "text": "I love this!" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_timeout_is_500() {
    let limits = ServiceLimits {
        inference_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let app = ready_app(limits).await;

    let response = app
        .router
        .oneshot(predict_request(json!({ "text": "slow" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "inference_error");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overload_is_503_with_retry_after() {
    let limits = ServiceLimits {
        max_concurrency: 1,
        max_queue: 0,
        ..Default::default()
    };
    let app = ready_app(limits).await;

    let busy = tokio::spawn(
        app.router
            .clone()
            .oneshot(predict_request(json!({ "text": "slow and steady" }))),
    );

    // Wait for the first request to occupy the only slot
    for _ in 0..200 {
        if app.classifier.in_flight.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(app.classifier.in_flight.load(Ordering::SeqCst), 1);

    let response = app
        .router
        .clone()
        .oneshot(predict_request(json!({ "text": "I love this!" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "overloaded");

    let response = busy.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn test_ui_is_served() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.clone().oneshot(get("/ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let response = app.router.clone().oneshot(get("/ui/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .contains("javascript"));

    // Unknown UI paths fall back to the page
    let response = app
        .router
        .clone()
        .oneshot(get("/ui/some/deep/link"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.router.oneshot(get("/ui")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/ui/");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = test_app(ServiceLimits::default());

    let response = app.router.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = test_app(ServiceLimits::default());

    let request = Request::builder()
        .uri("/healthz")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

fn startup_config(load_in_background: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.startup.load_in_background = load_in_background;
    config
}

#[tokio::test]
async fn test_start_service_blocking_load_succeeds() {
    let loader = KeywordLoader {
        classifier: Arc::new(KeywordClassifier {
            labels: vec!["NEGATIVE".to_string(), "POSITIVE".to_string()],
            ..Default::default()
        }),
    };

    let service = start_service(&startup_config(false), Arc::new(loader))
        .await
        .unwrap();
    assert!(service.is_ready());
}

#[tokio::test]
async fn test_start_service_blocking_load_failure_is_returned() {
    let loader = Arc::new(BrokenLoader::default());

    let result = start_service(&startup_config(false), loader.clone()).await;
    assert!(matches!(result, Err(Error::ModelLoad(_))));
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_background_load_failure_keeps_server_not_ready() {
    let config = startup_config(true);
    let loader = Arc::new(BrokenLoader::default());

    let service = start_service(&config, loader.clone()).await.unwrap();

    // Wait for the spawned load to give up
    for _ in 0..100 {
        if loader.attempts.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(loader.attempts.load(Ordering::SeqCst), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!service.is_ready());

    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let router = build_router(AppState::new(service, config, metrics));

    let response = router.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({ "ready": false }));

    let response = router
        .oneshot(predict_request(json!({ "text": "I love this!" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "not_ready");
}
