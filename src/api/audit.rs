//! Audit trail plumbing for the HTTP layer.
//!
//! Recording is fire-and-forget: a failed insert is logged and swallowed,
//! never surfaced to the client and never allowed to fail the operation it
//! describes.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::auth::Identity;
use crate::api::authz;
use crate::api::error::ApiError;
use crate::db::{self, actions, tables, ActivityLogView, DbPool, Role};
use crate::AppState;

/// Best-effort client address: proxy headers first, then the socket peer.
pub fn extract_client_ip(headers: &HeaderMap, conn_info: Option<&SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        // First hop in the chain is the originating client
        if let Some(ip) = forwarded.split(',').next() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|h| h.to_str().ok()) {
        let ip = real_ip.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    conn_info.map(|addr| addr.ip().to_string())
}

/// Append an audit entry. Never propagates failure.
pub async fn record(
    db: &DbPool,
    user_id: &str,
    activity: &str,
    action_type: &str,
    table_affected: Option<&str>,
    record_id: Option<&str>,
    ip_address: Option<&str>,
) {
    if let Err(e) = db::log_activity(
        db,
        user_id,
        activity,
        action_type,
        table_affected,
        record_id,
        ip_address,
    )
    .await
    {
        tracing::warn!(
            user_id,
            action_type,
            activity,
            error = %e,
            "Failed to write audit entry"
        );
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

/// GET /api/activity (Admin+)
///
/// Reading the full trail is itself an audited action.
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    headers: HeaderMap,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityLogView>>, ApiError> {
    authz::require_role(&identity, Role::Admin)?;

    let entries = match query.limit {
        Some(limit) if limit > 0 => db::list_recent(&state.db, limit).await?,
        _ => db::list_all(&state.db).await?,
    };

    let ip = extract_client_ip(&headers, None);
    record(
        &state.db,
        &identity.user_id,
        "Viewed activity log",
        actions::VIEW,
        Some(tables::ACTIVITY_LOG),
        None,
        ip.as_deref(),
    )
    .await;

    Ok(Json(entries))
}
