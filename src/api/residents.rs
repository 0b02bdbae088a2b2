//! Resident record endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::auth::{Identity, Mutation};
use crate::api::authz;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{actions, tables, DbPool, Resident, ResidentFields, Role};
use crate::AppState;

const STATUSES: &[&str] = &["Active", "Inactive", "Deceased", "Transferred"];

fn validate_fields(fields: &ResidentFields) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_required("First name", &fields.first_name) {
        errors.add("first_name", e);
    }
    if let Err(e) = validation::validate_required("Last name", &fields.last_name) {
        errors.add("last_name", e);
    }
    if let Err(e) = validation::validate_date(&fields.birthdate) {
        errors.add("birthdate", e);
    }
    if let Some(email) = fields.email.as_deref() {
        if !email.is_empty() {
            if let Err(e) = validation::validate_email(email) {
                errors.add("email", e);
            }
        }
    }
    if let Err(e) = validation::validate_amount(&fields.monthly_income) {
        errors.add("monthly_income", e);
    }
    if let Some(status) = fields.status.as_deref() {
        if !STATUSES.contains(&status) {
            errors.add("status", "Invalid status selected.");
        }
    }
    errors.finish()
}

async fn fetch_resident(db: &DbPool, resident_id: &str) -> Result<Resident, ApiError> {
    sqlx::query_as("SELECT * FROM residents WHERE resident_id = ?")
        .bind(resident_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Resident not found."))
}

#[derive(Debug, Deserialize)]
pub struct ResidentQuery {
    /// Case-insensitive match against names and purok
    pub q: Option<String>,
    pub status: Option<String>,
}

/// GET /api/residents
pub async fn list_residents(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Query(query): Query<ResidentQuery>,
) -> Result<Json<Vec<Resident>>, ApiError> {
    let mut sql = String::from("SELECT * FROM residents WHERE 1=1");
    let mut binds: Vec<String> = Vec::new();

    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        sql.push_str(
            " AND (first_name LIKE ? OR middle_name LIKE ? OR last_name LIKE ? OR purok LIKE ?)",
        );
        let pattern = format!("%{}%", q.trim());
        binds.extend([pattern.clone(), pattern.clone(), pattern.clone(), pattern]);
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(" AND status = ?");
        binds.push(status.to_string());
    }
    sql.push_str(" ORDER BY last_name, first_name");

    let mut stmt = sqlx::query_as(&sql);
    for bind in &binds {
        stmt = stmt.bind(bind);
    }
    let residents = stmt.fetch_all(&state.db).await?;
    Ok(Json(residents))
}

/// GET /api/residents/:id
pub async fn get_resident(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(resident_id): Path<String>,
) -> Result<Json<Resident>, ApiError> {
    let resident = fetch_resident(&state.db, &resident_id).await?;
    Ok(Json(resident))
}

/// POST /api/residents (Staff+)
pub async fn create_resident(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Json(fields): Json<ResidentFields>,
) -> Result<Json<Resident>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;
    validate_fields(&fields)?;

    let resident = Resident {
        resident_id: uuid::Uuid::new_v4().to_string(),
        first_name: fields.first_name.trim().to_string(),
        middle_name: fields.middle_name.clone(),
        last_name: fields.last_name.trim().to_string(),
        suffix: fields.suffix.clone(),
        birthdate: fields.birthdate.clone(),
        gender: fields.gender.clone(),
        civil_status: fields.civil_status.clone(),
        contact_no: fields.contact_no.clone(),
        email: fields.email.clone(),
        address: fields.address.clone(),
        purok: fields.purok.clone(),
        occupation: fields.occupation.clone(),
        monthly_income: fields.monthly_income,
        status: fields.status.clone().unwrap_or_else(|| "Active".to_string()),
        remarks: fields.remarks.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO residents (resident_id, first_name, middle_name, last_name, suffix,
                               birthdate, gender, civil_status, contact_no, email, address,
                               purok, occupation, monthly_income, status, remarks, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&resident.resident_id)
    .bind(&resident.first_name)
    .bind(&resident.middle_name)
    .bind(&resident.last_name)
    .bind(&resident.suffix)
    .bind(&resident.birthdate)
    .bind(&resident.gender)
    .bind(&resident.civil_status)
    .bind(&resident.contact_no)
    .bind(&resident.email)
    .bind(&resident.address)
    .bind(&resident.purok)
    .bind(&resident.occupation)
    .bind(resident.monthly_income)
    .bind(&resident.status)
    .bind(&resident.remarks)
    .bind(&resident.created_at)
    .execute(&state.db)
    .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Created resident: {}", resident.display_name()),
        actions::CREATE,
        Some(tables::RESIDENTS),
        Some(&resident.resident_id),
        mutation.ip.as_deref(),
    )
    .await;

    tracing::info!(resident_id = %resident.resident_id, "Resident created");
    Ok(Json(resident))
}

/// PUT /api/residents/:id (Staff+)
pub async fn update_resident(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(resident_id): Path<String>,
    Json(fields): Json<ResidentFields>,
) -> Result<Json<Resident>, ApiError> {
    authz::require_role(&mutation.identity, Role::Staff)?;
    let existing = fetch_resident(&state.db, &resident_id).await?;
    validate_fields(&fields)?;

    let status = fields.status.clone().unwrap_or(existing.status);

    sqlx::query(
        r#"
        UPDATE residents
        SET first_name = ?, middle_name = ?, last_name = ?, suffix = ?, birthdate = ?,
            gender = ?, civil_status = ?, contact_no = ?, email = ?, address = ?,
            purok = ?, occupation = ?, monthly_income = ?, status = ?, remarks = ?
        WHERE resident_id = ?
        "#,
    )
    .bind(fields.first_name.trim())
    .bind(&fields.middle_name)
    .bind(fields.last_name.trim())
    .bind(&fields.suffix)
    .bind(&fields.birthdate)
    .bind(&fields.gender)
    .bind(&fields.civil_status)
    .bind(&fields.contact_no)
    .bind(&fields.email)
    .bind(&fields.address)
    .bind(&fields.purok)
    .bind(&fields.occupation)
    .bind(fields.monthly_income)
    .bind(&status)
    .bind(&fields.remarks)
    .bind(&resident_id)
    .execute(&state.db)
    .await?;

    let resident = fetch_resident(&state.db, &resident_id).await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Updated resident: {}", resident.display_name()),
        actions::UPDATE,
        Some(tables::RESIDENTS),
        Some(&resident_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(resident))
}

/// DELETE /api/residents/:id (Admin+)
///
/// Dependent assistance records and beneficiary assignments go with the
/// resident, all inside one transaction.
pub async fn delete_resident(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(resident_id): Path<String>,
) -> Result<Json<crate::api::auth::MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let resident = fetch_resident(&state.db, &resident_id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM assistance_records WHERE resident_id = ?")
        .bind(&resident_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM resident_beneficiary WHERE resident_id = ?")
        .bind(&resident_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM residents WHERE resident_id = ?")
        .bind(&resident_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Deleted resident: {}", resident.display_name()),
        actions::DELETE,
        Some(tables::RESIDENTS),
        Some(&resident_id),
        mutation.ip.as_deref(),
    )
    .await;

    tracing::info!(resident_id = %resident_id, "Resident deleted");
    Ok(Json(crate::api::auth::MessageResponse {
        message: "Resident deleted successfully.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Config::default(), test_pool().await))
    }

    fn mutation_as(role: Role) -> Mutation {
        Mutation {
            identity: Identity {
                user_id: "actor-1".into(),
                username: "actor".into(),
                role,
            },
            ip: Some("203.0.113.9".into()),
        }
    }

    async fn seed_actor(db: &DbPool) {
        sqlx::query(
            "INSERT INTO users (user_id, username, email, password_hash, full_name, role, created_at)
             VALUES ('actor-1', 'actor', 'actor@x.com', 'h', 'The Actor', 'Admin', '2026-01-01T00:00:00Z')",
        )
        .execute(db)
        .await
        .unwrap();
    }

    fn base_fields() -> ResidentFields {
        ResidentFields {
            first_name: "Juan".into(),
            last_name: "Dela Cruz".into(),
            ..ResidentFields::default()
        }
    }

    #[test]
    fn names_are_required() {
        let fields = ResidentFields {
            first_name: "  ".into(),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());
        assert!(validate_fields(&base_fields()).is_ok());
    }

    #[test]
    fn birthdate_must_be_a_calendar_date() {
        let fields = ResidentFields {
            birthdate: Some("2026-02-30".into()),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());

        let fields = ResidentFields {
            birthdate: Some("1990-02-28".into()),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_ok());
    }

    #[test]
    fn income_cannot_be_negative() {
        let fields = ResidentFields {
            monthly_income: Some(-1.0),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());
    }

    #[tokio::test]
    async fn create_writes_the_row_and_exactly_one_audit_entry() {
        let state = test_state().await;
        seed_actor(&state.db).await;

        let Json(resident) = create_resident(
            axum::extract::State(state.clone()),
            mutation_as(Role::Staff),
            Json(base_fields()),
        )
        .await
        .unwrap();

        assert_eq!(resident.status, "Active");

        let stored: Resident = sqlx::query_as("SELECT * FROM residents WHERE resident_id = ?")
            .bind(&resident.resident_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stored.first_name, "Juan");

        let entries =
            crate::db::count_for_record(&state.db, tables::RESIDENTS, &resident.resident_id)
                .await
                .unwrap();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_dependents_and_needs_admin() {
        let state = test_state().await;
        seed_actor(&state.db).await;

        let Json(resident) = create_resident(
            axum::extract::State(state.clone()),
            mutation_as(Role::Staff),
            Json(base_fields()),
        )
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO beneficiary_category (category_id, category_name, is_active, created_at)
             VALUES ('c1', 'Senior Citizen', 1, '2026-01-01T00:00:00Z')",
        )
        .execute(&state.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO resident_beneficiary (assignment_id, resident_id, category_id, is_active, date_classified)
             VALUES ('rb1', ?, 'c1', 1, '2026-01-02T00:00:00Z')",
        )
        .bind(&resident.resident_id)
        .execute(&state.db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO assistance_records (record_id, resident_id, category_id, assistance_type, date_given, encoded_by, created_at)
             VALUES ('ar1', ?, 'c1', 'Medical', '2026-01-03', 'actor-1', '2026-01-03T00:00:00Z')",
        )
        .bind(&resident.resident_id)
        .execute(&state.db)
        .await
        .unwrap();

        // Staff cannot delete
        let err = delete_resident(
            axum::extract::State(state.clone()),
            mutation_as(Role::Staff),
            Path(resident.resident_id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), crate::api::error::ErrorCode::Forbidden);

        delete_resident(
            axum::extract::State(state.clone()),
            mutation_as(Role::Admin),
            Path(resident.resident_id.clone()),
        )
        .await
        .unwrap();

        for table in ["residents", "resident_beneficiary", "assistance_records"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&state.db)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} not emptied", table);
        }
    }

    #[test]
    fn status_is_constrained() {
        let fields = ResidentFields {
            status: Some("Missing".into()),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_err());

        let fields = ResidentFields {
            status: Some("Deceased".into()),
            ..base_fields()
        };
        assert!(validate_fields(&fields).is_ok());
    }
}
