use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::{auth_middleware, role_guard, ADMIN_ONLY, ALL_STAFF};
use shared_utils::state::AppState;

use crate::handlers::*;

/// Mounted at `/admin`.
pub fn admin_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", put(update_user).delete(deactivate_user))
        .route("/users/{id}/reset-password", post(reset_password))
        .route("/system", get(system_info))
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, role_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

/// Mounted at `/doctors`.
pub fn doctor_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_doctors))
        .route_layer(middleware::from_fn_with_state(ALL_STAFF, role_guard))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
