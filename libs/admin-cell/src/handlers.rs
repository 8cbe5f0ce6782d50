use std::sync::Arc;

use axum::extract::{Extension, State};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use auth_cell::models::{department_for, normalize_email, NewUser};
use auth_cell::services::user::UserChanges;
use auth_cell::UserService;
use shared_models::auth::{CurrentUser, Role};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Paginated};
use shared_utils::extractor::{AppJson, AppPath, AppQuery};
use shared_utils::fields::to_wire;
use shared_utils::password::{generate_temporary_password, hash_password_async, password_issues};
use shared_utils::state::AppState;
use shared_utils::validation::Validator;

use crate::models::{CreateUserRequest, UpdateUserRequest, UserListQuery};

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<UserListQuery>,
) -> Result<Paginated<Value>, AppError> {
    let filters = query.filters()?;
    let page = query.page_query();

    let (users, total) = UserService::new(&state.db)
        .list(&filters, i64::from(page.limit()), page.offset())
        .await?;
    let data = users
        .iter()
        .map(|u| to_wire(&u.to_profile()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(data, &page, total))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<CurrentUser>,
    AppJson(request): AppJson<CreateUserRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let mut validator = Validator::new();
    validator
        .required("name", &request.name)
        .max_length("name", &request.name, 100)
        .email("email", &request.email)
        .one_of("role", &request.role, &["admin", "doctor", "receptionist"])
        .optional_phone("phone", request.phone.as_deref());
    for issue in password_issues(&request.password) {
        validator.push("password", &issue, None);
    }
    validator.finish()?;

    let role: Role = request
        .role
        .parse()
        .map_err(|_| AppError::field("role", "Role must be one of admin, doctor, receptionist"))?;

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
    info!("Admin {} created {} account {}", actor.id, role, user.id);

    Ok(ApiResponse::created("User created successfully", to_wire(&user.to_profile())?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateUserRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let changes = request.validate(id, &actor)?;
    let updated = UserService::new(&state.db).update(id, changes).await?;
    info!("Admin {} updated user {}", actor.id, id);

    Ok(ApiResponse::ok("User updated successfully", to_wire(&updated.to_profile())?))
}

/// Deactivates rather than deletes: users are referenced by appointments,
/// records and payments.
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    if id == actor.id {
        warn!("Admin {} tried to deactivate their own account", actor.id);
        return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
    }

    let changes = UserChanges {
        is_active: Some(false),
        ..Default::default()
    };
    let updated = UserService::new(&state.db).update(id, changes).await?;
    info!("Admin {} deactivated user {}", actor.id, id);

    Ok(ApiResponse::ok("User deactivated successfully", to_wire(&updated.to_profile())?))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    let users = UserService::new(&state.db);
    let user = users.get(id).await?;

    let temporary = generate_temporary_password();
    let password_hash = hash_password_async(temporary.clone()).await?;
    users.update_password(user.id, &password_hash).await?;
    info!("Admin {} reset the password of user {}", actor.id, user.id);

    Ok(ApiResponse::ok(
        "Password reset successfully",
        json!({
            "user": to_wire(&user.to_profile())?,
            "temporaryPassword": temporary,
        }),
    ))
}

pub async fn system_info(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Value>, AppError> {
    Ok(ApiResponse::ok(
        "System information retrieved successfully",
        to_wire(&state.config.summary())?,
    ))
}

pub async fn list_doctors(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Value>, AppError> {
    let doctors = UserService::new(&state.db).list_active_doctors().await?;
    let data = doctors
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "name": d.name,
                "email": d.email,
                "department": d.department,
                "phone": d.phone,
            })
        })
        .collect::<Vec<_>>();

    Ok(ApiResponse::ok("Doctors retrieved successfully", Value::Array(data)))
}
