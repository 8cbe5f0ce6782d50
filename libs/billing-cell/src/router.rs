use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_utils::extractor::{auth_middleware, role_guard, ADMIN_ONLY, FRONT_DESK};
use shared_utils::state::AppState;

use crate::handlers::*;

pub fn billing_routes(state: Arc<AppState>) -> Router {
    let front_desk = Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/{id}", get(get_invoice).put(update_invoice))
        .route("/{id}/payments", post(record_payment))
        .route("/{id}/cancel", patch(cancel_invoice))
        .route_layer(middleware::from_fn_with_state(FRONT_DESK, role_guard));

    let admin = Router::new()
        .route("/{id}", delete(delete_invoice))
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, role_guard));

    Router::new()
        .merge(front_desk)
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
