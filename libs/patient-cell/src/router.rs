use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::{auth_middleware, role_guard, ADMIN_ONLY, ALL_STAFF, FRONT_DESK};
use shared_utils::state::AppState;

use crate::handlers::*;

pub fn patient_routes(state: Arc<AppState>) -> Router {
    let all_staff = Router::new()
        .route("/", get(list_patients))
        .route("/{id}", get(get_patient).put(update_patient))
        .route("/{id}/history", get(get_patient_history))
        .route_layer(middleware::from_fn_with_state(ALL_STAFF, role_guard));

    let front_desk = Router::new()
        .route("/", post(create_patient))
        .route_layer(middleware::from_fn_with_state(FRONT_DESK, role_guard));

    let admin = Router::new()
        .route("/{id}", delete(delete_patient))
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, role_guard));

    Router::new()
        .merge(all_staff)
        .merge(front_desk)
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
