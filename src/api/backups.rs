//! Backup management endpoints (Admin+).

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::auth::{Identity, MessageResponse, Mutation};
use crate::api::authz;
use crate::api::error::ApiError;
use crate::backup;
use crate::db::{
    actions, tables, BackupRecord, BackupResponse, CreateBackupRequest, Role,
};
use crate::AppState;

fn backup_dir(state: &AppState) -> PathBuf {
    state
        .config
        .server
        .data_dir
        .join(&state.config.backup.backup_dir)
}

fn checked_backup_path(state: &AppState, filename: &str) -> Result<PathBuf, ApiError> {
    if !backup::is_valid_backup_name(filename) {
        return Err(ApiError::bad_request("Invalid backup filename."));
    }
    Ok(backup_dir(state).join(filename))
}

/// GET /api/backups (Admin+)
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<BackupResponse>>, ApiError> {
    authz::require_role(&identity, Role::Admin)?;

    let records: Vec<BackupRecord> =
        sqlx::query_as("SELECT * FROM backup_history ORDER BY backup_date DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(records.into_iter().map(BackupResponse::from).collect()))
}

/// POST /api/backups (Admin+)
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Json(request): Json<CreateBackupRequest>,
) -> Result<Json<BackupResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;

    let db_path = crate::db::database_path(&state.config.server.data_dir);
    let (dest, size) = backup::create_backup(
        &state.config.backup.dump_tool,
        &db_path,
        &backup_dir(&state),
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Backup failed");
        ApiError::internal("Backup failed. Check the server logs.")
    })?;

    let filename = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let record = BackupRecord {
        backup_id: uuid::Uuid::new_v4().to_string(),
        user_id: mutation.identity.user_id.clone(),
        file_location: filename.clone(),
        file_size: size,
        remarks: request.remarks.clone(),
        backup_date: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO backup_history (backup_id, user_id, file_location, file_size, remarks, backup_date)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.backup_id)
    .bind(&record.user_id)
    .bind(&record.file_location)
    .bind(record.file_size)
    .bind(&record.remarks)
    .bind(&record.backup_date)
    .execute(&state.db)
    .await?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Created database backup: {}", filename),
        actions::CREATE,
        Some(tables::BACKUP_HISTORY),
        Some(&record.backup_id),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(BackupResponse::from(record)))
}

/// GET /api/backups/:filename/download (Admin+)
pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    authz::require_role(&identity, Role::Admin)?;
    let path = checked_backup_path(&state, &filename)?;

    let contents = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::not_found("Backup file not found."))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/sql")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(contents))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))?;
    Ok(response)
}

/// DELETE /api/backups/:filename (Admin+)
pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let path = checked_backup_path(&state, &filename)?;

    let record: Option<BackupRecord> =
        sqlx::query_as("SELECT * FROM backup_history WHERE file_location = ?")
            .bind(&filename)
            .fetch_optional(&state.db)
            .await?;

    if tokio::fs::remove_file(&path).await.is_err() && record.is_none() {
        return Err(ApiError::not_found("Backup file not found."));
    }

    if let Some(record) = &record {
        sqlx::query("DELETE FROM backup_history WHERE backup_id = ?")
            .bind(&record.backup_id)
            .execute(&state.db)
            .await?;
    }

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Deleted backup: {}", filename),
        actions::DELETE,
        Some(tables::BACKUP_HISTORY),
        record.as_ref().map(|r| r.backup_id.as_str()),
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Backup deleted successfully.".to_string(),
    }))
}

/// POST /api/backups/:filename/restore (Admin+)
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    mutation: Mutation,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    authz::require_role(&mutation.identity, Role::Admin)?;
    let path = checked_backup_path(&state, &filename)?;

    if !path.exists() {
        return Err(ApiError::not_found("Backup file not found."));
    }

    let db_path = crate::db::database_path(&state.config.server.data_dir);
    backup::restore_backup(&state.config.backup.dump_tool, &db_path, &path)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Restore failed");
            ApiError::internal("Restore failed. Check the server logs.")
        })?;

    crate::api::audit::record(
        &state.db,
        &mutation.identity.user_id,
        &format!("Restored database from backup: {}", filename),
        actions::UPDATE,
        Some(tables::BACKUP_HISTORY),
        None,
        mutation.ip.as_deref(),
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Database restored successfully.".to_string(),
    }))
}
