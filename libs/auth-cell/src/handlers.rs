use std::sync::Arc;

use axum::extract::{Extension, State};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::extractor::AppJson;
use shared_utils::fields::to_wire;
use shared_utils::jwt::issue_token;
use shared_utils::password::{hash_password_async, password_issues, verify_password_async};
use shared_utils::state::AppState;
use shared_utils::validation::Validator;

use crate::models::{
    department_for, normalize_email, ChangePasswordRequest, LoginRequest, NewUser, RegisterRequest,
    UserRow,
};
use crate::services::user::UserService;

const INVALID_LOGIN_MESSAGE: &str = "Invalid email or password";
const DEACTIVATED_MESSAGE: &str = "Account is deactivated";

fn session_payload(state: &AppState, user: &UserRow) -> Result<Value, AppError> {
    let token = issue_token(
        user.id,
        &user.email,
        &user.name,
        user.role(),
        &state.config.jwt_secret,
        state.config.jwt_expires_in,
    )?;
    Ok(json!({
        "user": to_wire(&user.to_profile())?,
        "token": token,
    }))
}

fn check_password_strength(validator: &mut Validator, field: &str, password: &str) {
    for issue in password_issues(password) {
        validator.push(field, &issue, None);
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    Validator::new()
        .required("email", &request.email)
        .required("password", &request.password)
        .finish()?;

    let email = normalize_email(&request.email);
    let users = UserService::new(&state.db);

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::InvalidCredential(INVALID_LOGIN_MESSAGE.to_string()))?;

    if !verify_password_async(request.password, user.password_hash.clone()).await? {
        debug!("Password mismatch for {}", email);
        return Err(AppError::InvalidCredential(INVALID_LOGIN_MESSAGE.to_string()));
    }
    if !user.is_active {
        warn!("Login attempt on deactivated account {}", user.id);
        return Err(AppError::InvalidCredential(DEACTIVATED_MESSAGE.to_string()));
    }

    users.touch_last_login(user.id).await?;
    info!("User {} logged in", user.id);

    Ok(ApiResponse::ok("Login successful", session_payload(&state, &user)?))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let mut validator = Validator::new();
    validator
        .required("name", &request.name)
        .max_length("name", &request.name, 100)
        .email("email", &request.email)
        .one_of("role", &request.role, &["admin", "doctor", "receptionist"])
        .optional_phone("phone", request.phone.as_deref());
    check_password_strength(&mut validator, "password", &request.password);
    validator.finish()?;

    let role: Role = request
        .role
        .parse()
        .map_err(|_| AppError::field("role", "Role must be one of admin, doctor, receptionist"))?;
    if role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    let users = UserService::new(&state.db);
    let email = normalize_email(&request.email);
    if users.find_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateEntry("User with this email already exists".to_string()));
    }

    let password_hash = hash_password_async(request.password).await?;
    let user = users
        .create(NewUser {
            name: request.name.trim().to_string(),
            email,
            password_hash,
            role,
            department: department_for(role, request.department),
            phone: request.phone.filter(|p| !p.trim().is_empty()),
        })
        .await?;
    info!("Registered {} account {}", role, user.id);

    Ok(ApiResponse::created("User registered successfully", session_payload(&state, &user)?))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<ApiResponse<Value>, AppError> {
    let user = UserService::new(&state.db).get(current.id).await?;
    Ok(ApiResponse::ok("Profile retrieved successfully", to_wire(&user.to_profile())?))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(request): AppJson<ChangePasswordRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let mut validator = Validator::new();
    validator.required("currentPassword", &request.current_password);
    check_password_strength(&mut validator, "newPassword", &request.new_password);
    validator.check(
        request.current_password != request.new_password,
        "newPassword",
        "New password must differ from the current password",
    );
    validator.finish()?;

    let users = UserService::new(&state.db);
    let user = users.get(current.id).await?;
    if !verify_password_async(request.current_password, user.password_hash.clone()).await? {
        return Err(AppError::InvalidCredential("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password_async(request.new_password).await?;
    users.update_password(user.id, &password_hash).await?;
    info!("User {} changed password", user.id);

    Ok(ApiResponse::ok("Password changed successfully", Value::Null))
}
