use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode, Uri},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tracing::error;

use admin_cell::{admin_routes, doctor_routes};
use appointment_cell::appointment_routes;
use auth_cell::auth_routes;
use billing_cell::billing_routes;
use dashboard_cell::{dashboard_routes, report_routes};
use medical_record_cell::medical_record_routes;
use patient_cell::patient_routes;
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::state::AppState;

async fn health(State(state): State<Arc<AppState>>) -> ApiResponse<Value> {
    let database = match shared_database::ping(&state.db).await {
        Ok(()) => "connected",
        Err(e) => {
            error!("Health check could not reach the database: {:#}", e);
            "disconnected"
        }
    };
    let status = if database == "connected" { "ok" } else { "degraded" };

    ApiResponse::ok(
        "Service is running",
        json!({
            "status": status,
            "database": database,
            "timezone": state.display_zone().name(),
        }),
    )
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {} not found", uri.path()))
}

const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Request body exceeds the upload limit";

/// Headroom over the attachment limit for base64 inflation and the JSON wrapper.
pub fn body_limit(max_file_size: usize) -> usize {
    max_file_size / 3 * 4 + 64 * 1024
}

/// Rewrites error responses produced by axum itself (no JSON body) into the
/// error envelope.
async fn envelope_bare_errors(method: Method, uri: Uri, response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            let allow = response.headers().get(header::ALLOW).cloned();
            let message = format!("Method {} not allowed on {}", method, uri.path());
            let mut enveloped = AppError::MethodNotAllowed(message).into_response();
            if let Some(allow) = allow {
                enveloped.headers_mut().insert(header::ALLOW, allow);
            }
            enveloped
        }
        StatusCode::PAYLOAD_TOO_LARGE => {
            AppError::PayloadTooLarge(PAYLOAD_TOO_LARGE_MESSAGE.to_string()).into_response()
        }
        _ => response,
    }
}

fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/auth", auth_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/invoices", billing_routes(state.clone()))
        .nest("/medical-records", medical_record_routes(state.clone()))
        .nest("/dashboard", dashboard_routes(state.clone()))
        .nest("/reports", report_routes(state.clone()))
        .nest("/admin", admin_routes(state.clone()))
        .nest("/doctors", doctor_routes(state))
}

/// Every resource lives under `API_BASE_PATH`; an empty base path mounts
/// them at the root.
pub fn create_router(state: Arc<AppState>) -> Router {
    let base_path = state.config.api_base_path.clone();
    let limit = body_limit(state.config.max_file_size);
    let api = api_routes(state);

    let router = if base_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&base_path, api)
    };
    router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(limit))
        .layer(map_response(envelope_bare_errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use shared_utils::test_utils::TestConfig;

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn call(router: Router, uri: &str) -> (StatusCode, Value) {
        send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let state = TestConfig::default().to_state();
        let (status, body) = call(create_router(state), "/api/v1/nowhere").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route /api/v1/nowhere not found");
    }

    #[tokio::test]
    async fn test_wrong_method_uses_error_envelope() {
        let router = create_router(TestConfig::default().to_state());
        let request = Request::builder()
            .method("PATCH")
            .uri("/api/v1/auth/login")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(header::ALLOW));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Method PATCH not allowed on /api/v1/auth/login");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_body_uses_error_envelope() {
        let state = TestConfig { max_file_size: 1024, ..TestConfig::default() }.to_state();
        let padding = "x".repeat(200_000);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "email": padding, "password": "secret123" }).to_string()))
            .unwrap();
        let (status, body) = send(create_router(state), request).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Request body exceeds the upload limit");
    }

    #[test]
    fn test_body_limit_leaves_room_for_base64() {
        assert!(body_limit(3_000) >= 4_000);
        assert_eq!(body_limit(5_242_880), 5_242_880 / 3 * 4 + 64 * 1024);
    }

    #[tokio::test]
    async fn test_resources_are_mounted_under_base_path() {
        let state = TestConfig::default().to_state();
        let (status, body) = call(create_router(state), "/api/v1/patients").await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token required");
    }
}
