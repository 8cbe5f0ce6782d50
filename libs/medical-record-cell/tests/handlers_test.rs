use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use medical_record_cell::medical_record_routes;
use shared_utils::test_utils::{test_state, JwtTestUtils, TestUser};

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = medical_record_routes(test_state()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn request(method: &str, uri: &str, user: &TestUser, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user));
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_receptionist_cannot_read_records() {
    let receptionist = TestUser::receptionist("desk@example.com");
    let (status, body) = send(request("GET", "/", &receptionist, None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errors"][0]["field"], "role");
    assert_eq!(body["errors"][0]["value"], "receptionist");
}

#[tokio::test]
async fn test_doctor_cannot_delete_record() {
    let doctor = TestUser::doctor("doc@example.com");
    let uri = format!("/{}", Uuid::new_v4());
    let (status, _) = send(request("DELETE", &uri, &doctor, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_must_name_the_doctor() {
    let admin = TestUser::admin("admin@example.com");
    let body = json!({ "patientId": Uuid::new_v4(), "diagnosis": "Migraine" });

    let (status, body) = send(request("POST", "/", &admin, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "doctorId");
}

#[tokio::test]
async fn test_doctor_cannot_sign_for_colleague() {
    let doctor = TestUser::doctor("doc@example.com");
    let body = json!({
        "patientId": Uuid::new_v4(),
        "doctorId": Uuid::new_v4(),
        "diagnosis": "Migraine",
    });

    let (status, _) = send(request("POST", "/", &doctor, Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_record_requires_patient_and_diagnosis() {
    let doctor = TestUser::doctor("doc@example.com");
    let body = json!({ "visitDate": "not-a-date" });
    let (status, body) = send(request("POST", "/", &doctor, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["patientId", "diagnosis", "visitDate"]);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let doctor = TestUser::doctor("doc@example.com");
    let uri = format!("/{}/attachments", Uuid::new_v4());
    let body = json!({
        "fileName": "setup.exe",
        "mimeType": "application/x-msdownload",
        "data": "TVo=",
    });

    let (status, body) = send(request("POST", &uri, &doctor, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "mimeType");
}

#[tokio::test]
async fn test_attachment_route_validates_record_id() {
    let doctor = TestUser::doctor("doc@example.com");
    let (status, body) = send(request("GET", "/not-a-uuid/attachments", &doctor, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
