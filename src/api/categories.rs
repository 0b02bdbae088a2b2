//! Beneficiary category endpoints (Admin+ for writes).

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::auth::{Identity, MessageResponse, Mutation};
use crate::api::authz;
use crate::api::error::ApiError;
use crate::api::validation;
use crate::db::{actions, tables, BeneficiaryCategory, CategoryFields, DbPool, Role};
use crate::AppState;

async fn fetch_category(db: &DbPool, category_id: &str) -> Result<BeneficiaryCategory, ApiError> {
    sqlx::query_as("SELECT * FROM beneficiary_category WHERE category_id = ?")
        .bind(category_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found."))
}

async fn check_name_unique(
    db: &DbPool,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), ApiError> {
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT category_id FROM beneficiary_category WHERE category_name = ? COLLATE NOCASE",
    )
    .bind(name)
    .fetch_optional(db)
    .await?;

    if let Some((id,)) = existing {
        if exclude_id != Some(id.as_str()) {
            return Err(ApiError::conflict("Category name already exists."));
        }
    }
    Ok(())
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
) -> Result<Json<Vec<BeneficiaryCategory>>, ApiError> {
    let categories =
        sqlx::query_as("SELECT * FROM beneficiary_category ORDER BY category_name")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(categories))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(category_id): Path<String>,
) -> Result<Json<BeneficiaryCategory>, ApiError> {
    let category = fetch_category(&state.db, &category_id).await?;
    Ok(Json(category))
}

/// POST /api/categories (Admin+)
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Json(fields): Json<CategoryFields>,
) -> Result<Json<BeneficiaryCategory>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;

    let name = fields.category_name.trim().to_string();
    validation::validate_required("Category name", &name)
        .map_err(|e| ApiError::validation_field("category_name", e))?;
    check_name_unique(&state.db, &name, None).await?;

    let category = BeneficiaryCategory {
        category_id: uuid::Uuid::new_v4().to_string(),
        category_name: name,
        description: fields.description.clone(),
        is_active: i64::from(fields.is_active.unwrap_or(true)),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO beneficiary_category (category_id, category_name, description, is_active, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.category_id)
    .bind(&category.category_name)
    .bind(&category.description)
    .bind(category.is_active)
    .bind(&category.created_at)
    .execute(&state.db)
    .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Added beneficiary category: {}", category.category_name),
        actions::CREATE,
        Some(tables::BENEFICIARY_CATEGORY),
        Some(&category.category_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(category))
}

/// PUT /api/categories/:id (Admin+)
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(category_id): Path<String>,
    Json(fields): Json<CategoryFields>,
) -> Result<Json<BeneficiaryCategory>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let existing = fetch_category(&state.db, &category_id).await?;

    let name = fields.category_name.trim().to_string();
    validation::validate_required("Category name", &name)
        .map_err(|e| ApiError::validation_field("category_name", e))?;
    check_name_unique(&state.db, &name, Some(&category_id)).await?;

    let is_active = fields
        .is_active
        .map(i64::from)
        .unwrap_or(existing.is_active);

    sqlx::query(
        "UPDATE beneficiary_category SET category_name = ?, description = ?, is_active = ? WHERE category_id = ?",
    )
    .bind(&name)
    .bind(&fields.description)
    .bind(is_active)
    .bind(&category_id)
    .execute(&state.db)
    .await?;

    let category = fetch_category(&state.db, &category_id).await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Updated beneficiary category: {}", category.category_name),
        actions::UPDATE,
        Some(tables::BENEFICIARY_CATEGORY),
        Some(&category_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(category))
}

/// DELETE /api/categories/:id (Admin+)
///
/// Refused while assistance records still reference the category;
/// assignments cascade.
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(category_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let category = fetch_category(&state.db, &category_id).await?;

    let in_use: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM assistance_records WHERE category_id = ?")
            .bind(&category_id)
            .fetch_one(&state.db)
            .await?;
    if in_use > 0 {
        return Err(ApiError::conflict(
            "Category is referenced by assistance records and cannot be deleted.",
        ));
    }

    sqlx::query("DELETE FROM beneficiary_category WHERE category_id = ?")
        .bind(&category_id)
        .execute(&state.db)
        .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Deleted beneficiary category: {}", category.category_name),
        actions::DELETE,
        Some(tables::BENEFICIARY_CATEGORY),
        Some(&category_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Category deleted successfully.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_category(db: &DbPool, name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO beneficiary_category (category_id, category_name, is_active, created_at)
             VALUES (?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(db)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_case_insensitively() {
        let db = test_pool().await;
        let id = seed_category(&db, "Senior Citizen").await;

        assert!(check_name_unique(&db, "senior citizen", None).await.is_err());
        // Updating the same row keeps its own name
        assert!(check_name_unique(&db, "Senior Citizen", Some(&id))
            .await
            .is_ok());
        assert!(check_name_unique(&db, "Solo Parent", None).await.is_ok());
    }
}
