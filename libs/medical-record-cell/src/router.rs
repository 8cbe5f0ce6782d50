use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use shared_utils::extractor::{auth_middleware, role_guard, ADMIN_ONLY, CLINICAL_STAFF};
use shared_utils::state::AppState;

use crate::handlers::*;

pub fn medical_record_routes(state: Arc<AppState>) -> Router {
    let clinical = Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/{id}", get(get_record).put(update_record))
        .route("/{id}/attachments", get(list_attachments).post(upload_attachment))
        .route_layer(middleware::from_fn_with_state(CLINICAL_STAFF, role_guard));

    let admin = Router::new()
        .route("/{id}", delete(delete_record))
        .route_layer(middleware::from_fn_with_state(ADMIN_ONLY, role_guard));

    Router::new()
        .merge(clinical)
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
