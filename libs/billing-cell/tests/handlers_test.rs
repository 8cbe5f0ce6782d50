use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use billing_cell::billing_routes;
use shared_utils::test_utils::{test_state, JwtTestUtils, TestUser};

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = billing_routes(test_state()).oneshot(request).await.unwrap();
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
async fn test_doctors_cannot_see_invoices() {
    let doctor = TestUser::doctor("doc@example.com");
    let (status, body) = send(request("GET", "/", &doctor, None)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].as_str().unwrap().contains("admin, receptionist"));
}

#[tokio::test]
async fn test_receptionist_cannot_delete_invoice() {
    let receptionist = TestUser::receptionist("desk@example.com");
    let uri = format!("/{}", Uuid::new_v4());
    let (status, _) = send(request("DELETE", &uri, &receptionist, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invoice_requires_patient_and_items() {
    let receptionist = TestUser::receptionist("desk@example.com");
    let body = json!({ "items": [] });
    let (status, body) = send(request("POST", "/", &receptionist, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["patientId", "items"]);
}

#[tokio::test]
async fn test_payment_validation_runs_before_lookup() {
    let receptionist = TestUser::receptionist("desk@example.com");
    let uri = format!("/{}/payments", Uuid::new_v4());
    let body = json!({ "amount": 0, "paymentMethod": "cash" });

    let (status, body) = send(request("POST", &uri, &receptionist, Some(body))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "amount");
}

#[tokio::test]
async fn test_unknown_status_filter_is_rejected() {
    let admin = TestUser::admin("admin@example.com");
    let (status, body) = send(request("GET", "/?status=overdue", &admin, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["value"], "overdue");
}
