use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_models::auth::Role;
use shared_models::error::AppError;
use shared_utils::timestamp::now_reference;

use crate::models::{NewUser, UserRow};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, department, phone, is_active, \
                            last_login_at, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct UserFilters {
    pub role: Option<Role>,
    pub search: Option<String>,
    pub active_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub department: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
}

pub struct UserService {
    db: PgPool,
}

impl UserService {
    pub fn new(db: &PgPool) -> Self {
        Self { db: db.clone() }
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRow>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<UserRow, AppError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    #[instrument(skip(self, user), fields(email = %user.email, role = %user.role))]
    pub async fn create(&self, user: NewUser) -> Result<UserRow, AppError> {
        debug!("Creating user account");
        let now = now_reference();
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, role, department, phone, \
             is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $8) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.department)
            .bind(&user.phone)
            .bind(now)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    pub async fn touch_last_login(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now_reference())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, password_hash))]
    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .bind(now_reference())
                .execute(&self.db)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filters: &'a UserFilters) {
        builder.push(" WHERE 1 = 1");
        if let Some(role) = filters.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }
        if filters.active_only {
            builder.push(" AND is_active = TRUE");
        }
        if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = format!("%{}%", search);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(like.clone())
                .push(" OR email ILIKE ")
                .push_bind(like)
                .push(")");
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filters: &UserFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserRow>, u64), AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        Self::push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        Self::push_filters(&mut query, filters);
        query
            .push(" ORDER BY name ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let users = query.build_query_as::<UserRow>().fetch_all(&self.db).await?;

        Ok((users, total.max(0) as u64))
    }

    pub async fn list_active_doctors(&self) -> Result<Vec<UserRow>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = 'doctor' AND is_active = TRUE ORDER BY name ASC",
            USER_COLUMNS
        );
        let doctors = sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.db).await?;
        Ok(doctors)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, changes: UserChanges) -> Result<UserRow, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = ");
        builder.push_bind(now_reference());
        if let Some(name) = changes.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(role) = changes.role {
            builder.push(", role = ").push_bind(role.as_str());
        }
        if let Some(department) = changes.department {
            builder.push(", department = ").push_bind(department);
        }
        if let Some(phone) = changes.phone {
            builder.push(", phone = ").push_bind(phone);
        }
        if let Some(is_active) = changes.is_active {
            builder.push(", is_active = ").push_bind(is_active);
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", USER_COLUMNS));

        builder
            .build_query_as::<UserRow>()
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
