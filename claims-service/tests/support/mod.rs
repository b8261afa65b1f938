use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use claims_service::config::ServiceConfig;
use claims_service::{build_router, AppState};
use common_claims::{ClaimsConfig, ClaimsManager, InMemoryDocumentStore, InMemoryIdentityProvider};
use common_observability::ClaimsMetrics;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub provider: InMemoryIdentityProvider,
    pub store: InMemoryDocumentStore,
    pub metrics: Arc<ClaimsMetrics>,
}

impl TestApp {
    pub fn new(identities: &[&str]) -> Self {
        let provider = InMemoryIdentityProvider::with_identities(identities.iter().copied());
        let store = InMemoryDocumentStore::new();
        let metrics = ClaimsMetrics::new().expect("metrics");
        let config = ServiceConfig::new(ADMIN_TOKEN, ClaimsConfig::new("demo"));
        let manager = ClaimsManager::from_config(
            Arc::new(provider.clone()),
            Arc::new(store.clone()),
            &config.claims,
        )
        .with_metrics(metrics.clone());

        let metrics = Arc::new(metrics);
        let state = AppState {
            manager: Arc::new(manager),
            config: Arc::new(config),
            metrics: metrics.clone(),
        };

        Self {
            router: build_router(state),
            provider,
            store,
            metrics,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let code = response
            .headers()
            .get("X-Error-Code")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, code, body)
    }
}

pub fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}
