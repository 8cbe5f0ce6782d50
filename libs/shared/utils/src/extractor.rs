use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, FromRequestParts, State},
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;

use crate::jwt::validate_token;
use crate::state::AppState;

pub const MISSING_TOKEN_MESSAGE: &str = "Access token required";

/// `Json` whose rejection renders as a `ValidationFailed` envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Verifies the bearer token and stores the caller in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::AuthenticationRequired(MISSING_TOKEN_MESSAGE.to_string()))?;

    let auth_value = auth_header.to_str().map_err(|_| {
        AppError::InvalidCredential("Invalid authorization header format".to_string())
    })?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::AuthenticationRequired(MISSING_TOKEN_MESSAGE.to_string()))?;

    let user = validate_token(token, &state.config.jwt_secret)?;
    debug!("Authenticated {} as {}", user.id, user.role);

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// The access policy: a caller passes when its role is in the allow-list.
pub fn authorize(user: &CurrentUser, allowed: &[Role]) -> Result<(), AppError> {
    if user.has_any_role(allowed) {
        Ok(())
    } else {
        Err(AppError::InsufficientPermissions {
            required: allowed.to_vec(),
            actual: user.role,
        })
    }
}

/// Allow-list carried as middleware state by `role_guard`.
#[derive(Debug, Clone, Copy)]
pub struct RoleGuard {
    allowed: &'static [Role],
}

impl RoleGuard {
    pub const fn new(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub fn allowed(&self) -> &'static [Role] {
        self.allowed
    }
}

/// Must run inside `auth_middleware`.
pub async fn role_guard(
    State(guard): State<RoleGuard>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::AuthenticationRequired(MISSING_TOKEN_MESSAGE.to_string()))?;

    authorize(user, guard.allowed)?;
    Ok(next.run(request).await)
}

pub const ADMIN_ONLY: RoleGuard = RoleGuard::new(&[Role::Admin]);
pub const CLINICAL_STAFF: RoleGuard = RoleGuard::new(&[Role::Admin, Role::Doctor]);
pub const FRONT_DESK: RoleGuard = RoleGuard::new(&[Role::Admin, Role::Receptionist]);
pub const ALL_STAFF: RoleGuard = RoleGuard::new(&Role::ALL);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::test_utils::{test_state, JwtTestUtils, TestUser};

    fn guarded_router(state: Arc<AppState>, guard: RoleGuard) -> Router {
        Router::new()
            .route("/guarded", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(guard, role_guard))
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    async fn call(router: Router, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri("/guarded");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let response = router.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn test_authorize_is_total_over_roles() {
        for role in Role::ALL {
            let user = TestUser::new("x@example.com", role).to_current_user();
            assert!(authorize(&user, &Role::ALL).is_ok());
            assert_eq!(authorize(&user, &[]).is_err(), true);
        }
    }

    #[test]
    fn test_authorize_reports_required_and_actual() {
        let user = TestUser::receptionist("desk@example.com").to_current_user();
        let err = authorize(&user, CLINICAL_STAFF.allowed()).unwrap_err();
        assert_matches!(
            err,
            AppError::InsufficientPermissions { ref required, actual: Role::Receptionist }
                if required == &vec![Role::Admin, Role::Doctor]
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let state = test_state();
        let (status, body) = call(guarded_router(state, ALL_STAFF), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], MISSING_TOKEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_expired_and_malformed_tokens_have_distinct_messages() {
        let state = test_state();
        let secret = state.config.jwt_secret.clone();
        let user = TestUser::default();

        let expired = JwtTestUtils::create_expired_token(&user, &secret);
        let (status, expired_body) =
            call(guarded_router(state.clone(), ALL_STAFF), Some(&expired)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let malformed = JwtTestUtils::create_malformed_token();
        let (status, malformed_body) =
            call(guarded_router(state, ALL_STAFF), Some(&malformed)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(expired_body["message"], crate::jwt::EXPIRED_TOKEN_MESSAGE);
        assert_eq!(malformed_body["message"], crate::jwt::INVALID_TOKEN_MESSAGE);
        assert_ne!(expired_body["message"], malformed_body["message"]);
    }

    #[tokio::test]
    async fn test_receptionist_is_forbidden_from_clinical_route() {
        let state = test_state();
        let user = TestUser::receptionist("desk@example.com");
        let token = JwtTestUtils::create_test_token(&user, &state.config.jwt_secret, Some(1));

        let (status, body) = call(guarded_router(state, CLINICAL_STAFF), Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("admin, doctor"));
        assert!(message.contains("receptionist"));
        assert_eq!(body["errors"][0]["value"], "receptionist");
    }

    #[tokio::test]
    async fn test_allowed_role_passes() {
        let state = test_state();
        let user = TestUser::doctor("doc@example.com");
        let token = JwtTestUtils::create_test_token(&user, &state.config.jwt_secret, Some(1));

        let (status, _) = call(guarded_router(state, CLINICAL_STAFF), Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
