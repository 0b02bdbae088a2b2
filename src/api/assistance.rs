//! Assistance record endpoints. Records carry the encoding user so every
//! disbursement is attributable.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{Identity, MessageResponse, Mutation};
use crate::api::authz;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{
    actions, tables, AssistanceFields, AssistanceRecord, AssistanceRecordView, DbPool, Role,
};
use crate::AppState;

const VIEW_SELECT: &str = r#"
    SELECT a.record_id, a.resident_id,
           r.first_name || ' ' || r.last_name AS resident_name,
           a.category_id, c.category_name,
           a.assistance_type, a.amount, a.date_given, a.encoded_by, a.remarks
    FROM assistance_records a
    JOIN residents r ON r.resident_id = a.resident_id
    JOIN beneficiary_category c ON c.category_id = a.category_id
"#;

fn validate_fields(fields: &AssistanceFields) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_required("Assistance type", &fields.assistance_type) {
        errors.add("assistance_type", e);
    }
    if let Err(e) = validation::validate_required_date(&fields.date_given) {
        errors.add("date_given", e);
    }
    if let Err(e) = validation::validate_amount(&fields.amount) {
        errors.add("amount", e);
    }
    errors.finish()
}

async fn check_references(db: &DbPool, fields: &AssistanceFields) -> Result<(), ApiError> {
    let resident: Option<(String,)> =
        sqlx::query_as("SELECT resident_id FROM residents WHERE resident_id = ?")
            .bind(&fields.resident_id)
            .fetch_optional(db)
            .await?;
    if resident.is_none() {
        return Err(ApiError::bad_request("Resident not found."));
    }

    let category: Option<(String,)> =
        sqlx::query_as("SELECT category_id FROM beneficiary_category WHERE category_id = ?")
            .bind(&fields.category_id)
            .fetch_optional(db)
            .await?;
    if category.is_none() {
        return Err(ApiError::bad_request("Category not found."));
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AssistanceQuery {
    pub resident_id: Option<String>,
    pub category_id: Option<String>,
}

/// GET /api/assistance
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Query(query): Query<AssistanceQuery>,
) -> Result<Json<Vec<AssistanceRecordView>>, ApiError> {
    let mut sql = format!("{} WHERE 1=1", VIEW_SELECT);
    let mut binds: Vec<String> = Vec::new();

    if let Some(resident_id) = query.resident_id.filter(|v| !v.is_empty()) {
        sql.push_str(" AND a.resident_id = ?");
        binds.push(resident_id);
    }
    if let Some(category_id) = query.category_id.filter(|v| !v.is_empty()) {
        sql.push_str(" AND a.category_id = ?");
        binds.push(category_id);
    }
    sql.push_str(" ORDER BY a.date_given DESC, a.created_at DESC");

    let mut stmt = sqlx::query_as(&sql);
    for bind in &binds {
        stmt = stmt.bind(bind);
    }
    let records = stmt.fetch_all(&state.db).await?;
    Ok(Json(records))
}

/// GET /api/assistance/:id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(record_id): Path<String>,
) -> Result<Json<AssistanceRecordView>, ApiError> {
    let record = sqlx::query_as(&format!("{} WHERE a.record_id = ?", VIEW_SELECT))
        .bind(&record_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Assistance record not found."))?;
    Ok(Json(record))
}

/// POST /api/assistance (Staff+)
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Json(fields): Json<AssistanceFields>,
) -> Result<Json<AssistanceRecord>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;
    validate_fields(&fields)?;
    check_references(&state.db, &fields).await?;

    let record = AssistanceRecord {
        record_id: uuid::Uuid::new_v4().to_string(),
        resident_id: fields.resident_id.clone(),
        category_id: fields.category_id.clone(),
        assistance_type: fields.assistance_type.trim().to_string(),
        amount: fields.amount,
        date_given: fields.date_given.clone(),
        encoded_by: mutation.identity.user_id.clone(),
        remarks: fields.remarks.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO assistance_records (record_id, resident_id, category_id, assistance_type,
                                        amount, date_given, encoded_by, remarks, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.record_id)
    .bind(&record.resident_id)
    .bind(&record.category_id)
    .bind(&record.assistance_type)
    .bind(record.amount)
    .bind(&record.date_given)
    .bind(&record.encoded_by)
    .bind(&record.remarks)
    .bind(&record.created_at)
    .execute(&state.db)
    .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Recorded {} assistance", record.assistance_type),
        actions::CREATE,
        Some(tables::ASSISTANCE_RECORDS),
        Some(&record.record_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(record))
}

/// PUT /api/assistance/:id (Staff+)
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(record_id): Path<String>,
    Json(fields): Json<AssistanceFields>,
) -> Result<Json<AssistanceRecord>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;

    let existing: Option<AssistanceRecord> =
        sqlx::query_as("SELECT * FROM assistance_records WHERE record_id = ?")
            .bind(&record_id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_none() {
        return Err(ApiError::not_found("Assistance record not found."));
    }

    validate_fields(&fields)?;
    check_references(&state.db, &fields).await?;

    sqlx::query(
        r#"
        UPDATE assistance_records
        SET resident_id = ?, category_id = ?, assistance_type = ?, amount = ?,
            date_given = ?, remarks = ?
        WHERE record_id = ?
        "#,
    )
    .bind(&fields.resident_id)
    .bind(&fields.category_id)
    .bind(fields.assistance_type.trim())
    .bind(fields.amount)
    .bind(&fields.date_given)
    .bind(&fields.remarks)
    .bind(&record_id)
    .execute(&state.db)
    .await?;

    let record: AssistanceRecord =
        sqlx::query_as("SELECT * FROM assistance_records WHERE record_id = ?")
            .bind(&record_id)
            .fetch_one(&state.db)
            .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Updated assistance record: {}", record.assistance_type),
        actions::UPDATE,
        Some(tables::ASSISTANCE_RECORDS),
        Some(&record_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(record))
}

/// DELETE /api/assistance/:id (Admin+)
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(record_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;

    let record: AssistanceRecord =
        sqlx::query_as("SELECT * FROM assistance_records WHERE record_id = ?")
            .bind(&record_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::not_found("Assistance record not found."))?;

    sqlx::query("DELETE FROM assistance_records WHERE record_id = ?")
        .bind(&record_id)
        .execute(&state.db)
        .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Deleted assistance record: {}", record.assistance_type),
        actions::DELETE,
        Some(tables::ASSISTANCE_RECORDS),
        Some(&record_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Assistance record deleted successfully.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_fields() -> AssistanceFields {
        AssistanceFields {
            resident_id: "r1".into(),
            category_id: "c1".into(),
            assistance_type: "Medical".into(),
            amount: Some(1500.0),
            date_given: "2026-03-01".into(),
            remarks: None,
        }
    }

    #[test]
    fn type_and_date_are_required() {
        assert!(validate_fields(&base_fields()).is_ok());

        let fields = AssistanceFields {
            assistance_type: " ".into(),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());

        let fields = AssistanceFields {
            date_given: "March 1".into(),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());
    }

    #[test]
    fn amount_must_be_non_negative() {
        let fields = AssistanceFields {
            amount: Some(-5.0),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());

        let fields = AssistanceFields {
            amount: None,
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_ok());
    }
}
