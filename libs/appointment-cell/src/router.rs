use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};

use shared_utils::extractor::{auth_middleware, role_guard, ALL_STAFF, FRONT_DESK};
use shared_utils::state::AppState;

use crate::handlers::*;

pub fn appointment_routes(state: Arc<AppState>) -> Router {
    let all_staff = Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route("/{id}", get(get_appointment).put(update_appointment))
        .route("/{id}/status", patch(update_appointment_status))
        .route_layer(middleware::from_fn_with_state(ALL_STAFF, role_guard));

    let front_desk = Router::new()
        .route("/{id}", delete(delete_appointment))
        .route_layer(middleware::from_fn_with_state(FRONT_DESK, role_guard));

    Router::new()
        .merge(all_staff)
        .merge(front_desk)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
