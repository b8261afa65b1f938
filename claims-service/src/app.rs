use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRef, Request, State};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::Router;
use common_claims::ClaimsManager;
use common_http_errors::{ApiError, ApiResult, ERROR_CODE_HEADER};
use common_observability::ClaimsMetrics;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::ServiceConfig;
use crate::handlers::{assign_patient_role, assign_staff_role, health, read_role, revoke_role};

const SERVICE_NAME: &str = "claims-service";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ClaimsManager>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<ClaimsMetrics>,
}

impl FromRef<AppState> for Arc<ServiceConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ClaimsMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let origins = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .route("/users/:identity_id/claims", get(read_role).delete(revoke_role))
        .route("/users/:identity_id/claims/staff", put(assign_staff_role))
        .route("/users/:identity_id/claims/patient", put(assign_patient_role))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_http_errors,
        ))
        .with_state(state)
        .layer(cors)
}

async fn track_http_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get(ERROR_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        state.metrics.http_error(SERVICE_NAME, code, status.as_u16());
    }
    resp
}

async fn render_metrics(State(metrics): State<Arc<ClaimsMetrics>>) -> ApiResult<Response> {
    let text = metrics.render().map_err(|err| {
        warn!(error = %err, "Unable to render metrics");
        ApiError::internal(err)
    })?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
        .body(Body::from(text))
        .map_err(ApiError::internal)
}
