use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use admin_cell::{admin_routes, doctor_routes};
use shared_utils::test_utils::{test_state, JwtTestUtils, TestUser};

async fn send(
    router: Router,
    method: &str,
    uri: &str,
    user: &TestUser,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", JwtTestUtils::bearer(user));
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_admin_routes_reject_other_roles() {
    let doctor = TestUser::doctor("doc@example.com");
    let (status, body) = send(admin_routes(test_state()), "GET", "/users", &doctor, None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["errors"][0]["message"], "Requires one of: admin");
}

#[tokio::test]
async fn test_system_summary_hides_secrets() {
    let admin = TestUser::admin("admin@example.com");
    let (status, body) = send(admin_routes(test_state()), "GET", "/system", &admin, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["displayTimezone"], "UTC");
    let rendered = body.to_string();
    assert!(!rendered.contains("jwtSecret"));
    assert!(!rendered.contains("databaseUrl"));
}

#[tokio::test]
async fn test_admin_cannot_deactivate_self() {
    let admin = TestUser::admin("admin@example.com");
    let uri = format!("/users/{}", admin.id);
    let (status, body) = send(admin_routes(test_state()), "DELETE", &uri, &admin, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot deactivate your own account");
}

#[tokio::test]
async fn test_create_user_validates_all_fields() {
    let admin = TestUser::admin("admin@example.com");
    let body = json!({ "name": "", "email": "nope", "password": "short", "role": "nurse" });

    let router = admin_routes(test_state());
    let (status, body) = send(router, "POST", "/users", &admin, Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"name"));
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"role"));
    assert!(fields.contains(&"password"));
}

#[tokio::test]
async fn test_unknown_role_filter() {
    let admin = TestUser::admin("admin@example.com");
    let router = admin_routes(test_state());
    let (status, body) = send(router, "GET", "/users?role=nurse", &admin, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["value"], "nurse");
}

#[tokio::test]
async fn test_doctor_list_requires_token() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = doctor_routes(test_state()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_with_bad_id_is_rejected() {
    let admin = TestUser::admin("admin@example.com");
    let body = json!({ "name": "Renamed" });
    let router = admin_routes(test_state());
    let (status, _) = send(router, "PUT", "/users/123", &admin, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        admin_routes(test_state()),
        "PUT",
        &format!("/users/{}", Uuid::new_v4()),
        &admin,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
