use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use shared_models::auth::Role;
use shared_utils::timestamp::to_external_naive;

pub const DEFAULT_DOCTOR_DEPARTMENT: &str = "General Medicine";

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserRow {
    /// Unknown role strings cannot come out of the table (CHECK constraint);
    /// they degrade to the least privileged role.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Receptionist)
    }

    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role(),
            department: self.department.clone(),
            phone: self.phone.clone(),
            is_active: self.is_active,
            last_login_at: self.last_login_at.map(to_external_naive),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The user as returned to clients; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
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
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Department stored for a new account: doctors always get one, other roles
/// start without. Admins can assign one later through a user update.
pub fn department_for(role: Role, requested: Option<String>) -> Option<String> {
    match role {
        Role::Doctor => Some(
            requested
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DOCTOR_DEPARTMENT.to_string()),
        ),
        Role::Admin | Role::Receptionist => None,
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctor_gets_default_department() {
        let default = Some(DEFAULT_DOCTOR_DEPARTMENT);
        assert_eq!(department_for(Role::Doctor, None).as_deref(), default);
        assert_eq!(department_for(Role::Doctor, Some("  ".into())).as_deref(), default);
        let chosen = department_for(Role::Doctor, Some("Cardiology".into()));
        assert_eq!(chosen.as_deref(), Some("Cardiology"));
        assert_eq!(department_for(Role::Receptionist, None), None);
        assert_eq!(department_for(Role::Receptionist, Some("Front desk".into())), None);
        assert_eq!(department_for(Role::Admin, Some("Operations".into())), None);
    }

    #[test]
    fn test_profile_hides_password_hash() {
        let now = chrono::Utc::now().naive_utc();
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "Dr. Grey".into(),
            email: "grey@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: "doctor".into(),
            department: Some("Surgery".into()),
            phone: None,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(row.to_profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "doctor");
    }
}
