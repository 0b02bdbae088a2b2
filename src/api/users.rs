//! User management endpoints (Admin+).

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{self, Identity, MessageResponse, Mutation};
use crate::api::authz;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{actions, tables, DbPool, Role, User, UserResponse};
use crate::AppState;

async fn fetch_user(db: &DbPool, user_id: &str) -> Result<User, ApiError> {
    sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))
}

/// GET /api/users (Admin+)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    authz::require_role(&identity, Role::Admin)?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY username")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Admin-set password reset; also clears any lockout
    #[serde(default)]
    pub password: Option<String>,
}

/// PUT /api/users/:id (Admin+)
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let existing = fetch_user(&state.db, &user_id).await?;
    authz::check_target_user(&mutation.identity, existing.role())?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(email) = request.email.as_deref() {
        if let Err(e) = validation::validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Some(full_name) = request.full_name.as_deref() {
        if let Err(e) = validation::validate_full_name(full_name) {
            errors.add("full_name", e);
        }
    }
    if let Some(password) = request.password.as_deref() {
        if let Err(e) = validation::validate_password(password) {
            errors.add("password", e);
        }
    }
    errors.finish()?;

    let role = match request.role.as_deref() {
        Some(requested) => {
            let role = Role::parse(requested)
                .ok_or_else(|| ApiError::validation_field("role", "Invalid role selected."))?;
            if role != existing.role() {
                authz::check_role_assignment(Some(&mutation.identity), role)?;
            }
            role
        }
        None => existing.role(),
    };

    if let Some(email) = request.email.as_deref() {
        let clash: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM users WHERE email = ? AND user_id != ?")
                .bind(email)
                .bind(&user_id)
                .fetch_optional(&state.db)
                .await?;
        if clash.is_some() {
            return Err(ApiError::validation_field(
                "email",
                "Email already registered. Please use a different one.",
            ));
        }
    }

    let full_name = request
        .full_name
        .clone()
        .unwrap_or_else(|| existing.full_name.clone());
    let email = request
        .email
        .clone()
        .unwrap_or_else(|| existing.email.clone());
    let is_active = request
        .is_active
        .map(i64::from)
        .unwrap_or(existing.is_active);

    let password_hash = match request.password.as_deref() {
        Some(password) => Some(
            auth::hash_password(password)
                .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?,
        ),
        None => None,
    };

    // Password reset and reactivation both clear the lockout state. One
    // statement carries every piece of the update, so a persistence failure
    // commits nothing.
    let clear_lockout = password_hash.is_some()
        || (request.is_active == Some(true) && !existing.is_active());

    sqlx::query(
        r#"
        UPDATE users
        SET full_name = ?, email = ?, role = ?, is_active = ?,
            password_hash = COALESCE(?, password_hash),
            login_attempts = CASE WHEN ? THEN 0 ELSE login_attempts END,
            locked_until = CASE WHEN ? THEN NULL ELSE locked_until END
        WHERE user_id = ?
        "#,
    )
    .bind(&full_name)
    .bind(&email)
    .bind(role.as_str())
    .bind(is_active)
    .bind(&password_hash)
    .bind(clear_lockout)
    .bind(clear_lockout)
    .bind(&user_id)
    .execute(&state.db)
    .await?;

    let user = fetch_user(&state.db, &user_id).await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Updated user account: {}", user.username),
        actions::UPDATE,
        Some(tables::USERS),
        Some(&user_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(UserResponse::from(user)))
}

/// DELETE /api/users/:id (Super Admin only)
///
/// Self-deletion is denied for every role. Sessions go with the account.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::SuperAdmin)?;
    authz::deny_self_delete(&mutation.identity, &user_id)?;

    let user = fetch_user(&state.db, &user_id).await?;
    authz::check_target_user(&mutation.identity, user.role())?;

    let referenced: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM assistance_records WHERE encoded_by = ?")
            .bind(&user_id)
            .fetch_one(&state.db)
            .await?;
    if referenced > 0 {
        return Err(ApiError::conflict(
            "User has encoded assistance records and cannot be deleted. Deactivate the account instead.",
        ));
    }

    sqlx::query("DELETE FROM users WHERE user_id = ?")
        .bind(&user_id)
        .execute(&state.db)
        .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Deleted user account: {}", user.username),
        actions::DELETE,
        Some(tables::USERS),
        Some(&user_id),
        mutation.ip.as_deref(),
    )
    .await;

    tracing::info!(username = %user.username, "User deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully.".to_string(),
    }))
}
