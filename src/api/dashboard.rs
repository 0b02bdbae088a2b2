//! Dashboard summary endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::auth::Identity;
use crate::api::error::ApiError;
use crate::db::{self, ActivityLogView};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_residents: i64,
    pub active_residents: i64,
    pub total_categories: i64,
    pub total_beneficiaries: i64,
    pub assistance_this_year: i64,
    pub total_assistance_amount: f64,
    pub recent_activities: Vec<ActivityLogView>,
}

/// GET /api/dashboard
pub async fn summary(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
) -> Result<Json<DashboardSummary>, ApiError> {
    let total_residents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM residents")
        .fetch_one(&state.db)
        .await?;
    let active_residents: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM residents WHERE status = 'Active'")
            .fetch_one(&state.db)
            .await?;
    let total_categories: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM beneficiary_category WHERE is_active = 1")
            .fetch_one(&state.db)
            .await?;
    let total_beneficiaries: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT resident_id) FROM resident_beneficiary WHERE is_active = 1",
    )
    .fetch_one(&state.db)
    .await?;
    let assistance_this_year: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM assistance_records WHERE strftime('%Y', date_given) = strftime('%Y', 'now')",
    )
    .fetch_one(&state.db)
    .await?;
    let total_assistance_amount: f64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM assistance_records")
            .fetch_one(&state.db)
            .await?;

    let recent_activities = db::list_recent(&state.db, 15).await?;

    Ok(Json(DashboardSummary {
        total_residents,
        active_residents,
        total_categories,
        total_beneficiaries,
        assistance_this_year,
        total_assistance_amount,
        recent_activities,
    }))
}
