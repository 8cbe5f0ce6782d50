// Runs against a real PostgreSQL database; enabled with
// LIVE_DATABASE_TESTS=true and DATABASE_URL.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use patient_cell::patient_routes;
use shared_models::auth::Role;
use shared_utils::state::AppState;
use shared_utils::test_utils::{insert_test_patient, live_state, JwtTestUtils, TestUser};

async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    user: &TestUser,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user))
        .body(Body::empty())
        .unwrap();
    let response = patient_routes(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn book_for(state: &Arc<AppState>, patient_id: Uuid, doctor: &TestUser) {
    sqlx::query(
        "INSERT INTO appointments (id, patient_id, doctor_id, appointment_at, duration_minutes) \
         VALUES ($1, $2, $3, TIMESTAMP '2031-05-12 10:00:00', 30)",
    )
    .bind(Uuid::new_v4())
    .bind(patient_id)
    .bind(doctor.id)
    .execute(&state.db)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_live_deleting_referenced_patient_is_a_dangling_reference() {
    let Some(state) = live_state().await else { return };
    let admin = TestUser::unique(Role::Admin);
    admin.insert(&state.db).await;
    let doctor = TestUser::unique(Role::Doctor);
    doctor.insert(&state.db).await;
    let patient_id = insert_test_patient(&state.db, "Referenced").await;
    book_for(&state, patient_id, &doctor).await;

    let (status, body) = send(&state, "DELETE", &format!("/{}", patient_id), &admin).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Referenced record does not exist or is still referenced by other records"
    );
    let (status, _) = send(&state, "GET", &format!("/{}", patient_id), &admin).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_live_unreferenced_patient_is_deleted() {
    let Some(state) = live_state().await else { return };
    let admin = TestUser::unique(Role::Admin);
    admin.insert(&state.db).await;
    let patient_id = insert_test_patient(&state.db, "Unreferenced").await;

    let (status, _) = send(&state, "DELETE", &format!("/{}", patient_id), &admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&state, "GET", &format!("/{}", patient_id), &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_live_history_hides_records_from_receptionists() {
    let Some(state) = live_state().await else { return };
    let receptionist = TestUser::unique(Role::Receptionist);
    receptionist.insert(&state.db).await;
    let doctor = TestUser::unique(Role::Doctor);
    doctor.insert(&state.db).await;
    let patient_id = insert_test_patient(&state.db, "History").await;
    book_for(&state, patient_id, &doctor).await;

    let history = format!("/{}/history", patient_id);
    let (status, body) = send(&state, "GET", &history, &receptionist).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["appointments"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["appointments"][0]["appointmentAt"], "2031-05-12 10:00:00");
    assert!(body["data"].get("medicalRecords").is_none());

    let (_, body) = send(&state, "GET", &history, &doctor).await;
    assert!(body["data"]["medicalRecords"].is_array());
}
