use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_utils::extractor::{auth_middleware, role_guard, ADMIN_ONLY, ALL_STAFF};
use shared_utils::state::AppState;

use crate::handlers::*;

/// Mounted at `/dashboard`.
pub fn dashboard_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route_layer(middleware::from_fn_with_state(ALL_STAFF, role_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted at `/reports`.
pub fn report_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/revenue", get(revenue_report))
        .route("/appointments", get(appointment_report))
        .route("/patients", get(patient_report))
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, role_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
