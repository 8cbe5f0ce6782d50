use serde::Deserialize;
use uuid::Uuid;

use auth_cell::services::user::{UserChanges, UserFilters};
use shared_models::auth::{CurrentUser, Role};
use shared_models::error::{AppError, FieldError};
use shared_models::response::PageQuery;
use shared_utils::validation::Validator;

const ROLES: [&str; 3] = ["admin", "doctor", "receptionist"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<String>,
    pub search: Option<String>,
}

impl UserListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn filters(&self) -> Result<UserFilters, AppError> {
        let role = match self.role.as_deref().filter(|r| !r.is_empty()) {
            Some(raw) => Some(parse_role(raw)?),
            None => None,
        };
        Ok(UserFilters {
            role,
            search: self.search.clone(),
            active_only: false,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
    pub department: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse::<Role>().map_err(|_| {
        AppError::validation(vec![
            FieldError::new("role", "Role must be one of admin, doctor, receptionist")
                .with_value(raw),
        ])
    })
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl UpdateUserRequest {
    /// Admins cannot demote or deactivate their own account.
    pub fn validate(self, target: Uuid, actor: &CurrentUser) -> Result<UserChanges, AppError> {
        let mut validator = Validator::new();
        if let Some(name) = &self.name {
            validator.required("name", name).max_length("name", name, 100);
        }
        if let Some(role) = &self.role {
            validator.one_of("role", role, &ROLES);
        }
        validator.optional_phone("phone", self.phone.as_deref().filter(|p| !p.trim().is_empty()));
        validator.finish()?;

        let role = self.role.as_deref().map(parse_role).transpose()?;
        if target == actor.id {
            if role.is_some_and(|r| r != Role::Admin) {
                return Err(AppError::BadRequest("You cannot change your own role".to_string()));
            }
            if self.is_active == Some(false) {
                return Err(AppError::BadRequest(
                    "You cannot deactivate your own account".to_string(),
                ));
            }
        }

        let changes = UserChanges {
            name: self.name.map(|n| n.trim().to_string()),
            role,
            department: self.department.map(blank_to_none),
            phone: self.phone.map(blank_to_none),
            is_active: self.is_active,
        };
        if changes.name.is_none()
            && changes.role.is_none()
            && changes.department.is_none()
            && changes.phone.is_none()
            && changes.is_active.is_none()
        {
            return Err(AppError::BadRequest("No fields to update".to_string()));
        }
        Ok(changes)
    }
}
