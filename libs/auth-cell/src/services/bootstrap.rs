use anyhow::{Context, Result};
use tracing::{info, warn};

use shared_models::auth::Role;
use shared_utils::password::{hash_password_async, password_issues};
use shared_utils::state::AppState;

use crate::models::{normalize_email, NewUser};
use crate::services::user::UserService;

/// Creates the configured admin account on first start.
pub async fn ensure_admin_account(state: &AppState) -> Result<()> {
    let Some((email, password)) = state.config.admin_bootstrap() else {
        info!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin bootstrap");
        return Ok(());
    };

    let email = normalize_email(email);
    let users = UserService::new(&state.db);

    if users
        .find_by_email(&email)
        .await
        .context("failed to look up bootstrap admin")?
        .is_some()
    {
        info!("Admin account {} already exists", email);
        return Ok(());
    }

    let issues = password_issues(password);
    if !issues.is_empty() {
        warn!("ADMIN_PASSWORD is weak: {}", issues.join("; "));
    }

    let password_hash = hash_password_async(password.to_string())
        .await
        .context("failed to hash admin password")?;
    users
        .create(NewUser {
            name: state.config.admin_name.clone(),
            email: email.clone(),
            password_hash,
            role: Role::Admin,
            department: None,
            phone: None,
        })
        .await
        .context("failed to create bootstrap admin")?;

    info!("Created bootstrap admin account {}", email);
    Ok(())
}
