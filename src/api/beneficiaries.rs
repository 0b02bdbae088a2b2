//! Resident-to-category beneficiary assignments.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::auth::{Identity, MessageResponse, Mutation};
use crate::api::authz;
use crate::api::error::ApiError;
use crate::db::{
    actions, tables, AssignmentRequest, BeneficiaryAssignment, BeneficiaryCategory, DbPool,
    Resident, ResidentWithCategories, Role,
};
use crate::AppState;

/// GET /api/beneficiaries
///
/// Residents with their active category names aggregated, for the
/// classification overview.
pub async fn list_classified(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
) -> Result<Json<Vec<ResidentWithCategories>>, ApiError> {
    let rows = sqlx::query_as(
        r#"
        SELECT r.resident_id, r.first_name, r.middle_name, r.last_name, r.status,
               GROUP_CONCAT(c.category_name, ', ') AS categories
        FROM residents r
        LEFT JOIN resident_beneficiary rb
               ON rb.resident_id = r.resident_id AND rb.is_active = 1
        LEFT JOIN beneficiary_category c ON c.category_id = rb.category_id
        GROUP BY r.resident_id
        ORDER BY r.last_name, r.first_name
        "#,
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// GET /api/residents/:id/categories
pub async fn list_for_resident(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(resident_id): Path<String>,
) -> Result<Json<Vec<BeneficiaryCategory>>, ApiError> {
    let categories = sqlx::query_as(
        r#"
        SELECT c.* FROM beneficiary_category c
        JOIN resident_beneficiary rb ON rb.category_id = c.category_id
        WHERE rb.resident_id = ? AND rb.is_active = 1
        ORDER BY c.category_name
        "#,
    )
    .bind(&resident_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(categories))
}

async fn names_for(
    db: &DbPool,
    resident_id: &str,
    category_id: &str,
) -> Result<(String, String), ApiError> {
    let resident: Resident = sqlx::query_as("SELECT * FROM residents WHERE resident_id = ?")
        .bind(resident_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::bad_request("Resident not found."))?;

    let category: BeneficiaryCategory =
        sqlx::query_as("SELECT * FROM beneficiary_category WHERE category_id = ?")
            .bind(category_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| ApiError::bad_request("Category not found."))?;

    Ok((resident.display_name(), category.category_name))
}

/// POST /api/beneficiaries (Staff+)
pub async fn assign(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Json(request): Json<AssignmentRequest>,
) -> Result<Json<BeneficiaryAssignment>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;

    let (resident_name, category_name) =
        names_for(&state.db, &request.resident_id, &request.category_id).await?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT assignment_id FROM resident_beneficiary WHERE resident_id = ? AND category_id = ?",
    )
    .bind(&request.resident_id)
    .bind(&request.category_id)
    .fetch_optional(&state.db)
    .await?;
    if existing.is_some() {
        return Err(ApiError::conflict(
            "Resident is already classified under this category.",
        ));
    }

    let assignment = BeneficiaryAssignment {
        assignment_id: uuid::Uuid::new_v4().to_string(),
        resident_id: request.resident_id.clone(),
        category_id: request.category_id.clone(),
        is_active: 1,
        date_classified: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO resident_beneficiary (assignment_id, resident_id, category_id, is_active, date_classified)
        VALUES (?, ?, ?, 1, ?)
        "#,
    )
    .bind(&assignment.assignment_id)
    .bind(&assignment.resident_id)
    .bind(&assignment.category_id)
    .bind(&assignment.date_classified)
    .execute(&state.db)
    .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Classified {} as {}", resident_name, category_name),
        actions::CREATE,
        Some(tables::RESIDENT_BENEFICIARY),
        Some(&assignment.assignment_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(assignment))
}

/// DELETE /api/beneficiaries/:id (Staff+)
pub async fn unassign(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(assignment_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;

    let assignment: BeneficiaryAssignment =
        sqlx::query_as("SELECT * FROM resident_beneficiary WHERE assignment_id = ?")
            .bind(&assignment_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Assignment not found."))?;

    let (resident_name, category_name) =
        names_for(&state.db, &assignment.resident_id, &assignment.category_id).await?;

    sqlx::query("DELETE FROM resident_beneficiary WHERE assignment_id = ?")
        .bind(&assignment_id)
        .execute(&state.db)
        .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Removed {} classification from {}", category_name, resident_name),
        actions::DELETE,
        Some(tables::RESIDENT_BENEFICIARY),
        Some(&assignment_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Classification removed successfully.".to_string(),
    }))
}
