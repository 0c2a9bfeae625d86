pub mod import;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use crate::state::{AppState, HealthResponse, ServiceInfoResponse};
use crate::utils::json_error_response;

pub const API_KEY_HEADER: &str = "X-API-Key";

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/import", post(import::import_track))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !api_key_matches(req.headers(), &state.api_key) {
        return json_error_response(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
    }
    next.run(req).await
}

fn api_key_matches(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == expected)
        .unwrap_or(false)
}

async fn root() -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        service: "Audio Upload Server",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
