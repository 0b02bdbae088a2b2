//! Activity log models. Entries are append-only: the application exposes no
//! update or delete path for this table.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogEntry {
    pub log_id: String,
    pub user_id: String,
    pub activity: String,
    pub action_type: Option<String>,
    pub table_affected: Option<String>,
    pub record_id: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp: String,
}

/// Activity log entry joined with the acting username for display.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogView {
    pub log_id: String,
    pub user_id: String,
    pub username: String,
    pub activity: String,
    pub action_type: Option<String>,
    pub table_affected: Option<String>,
    pub record_id: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp: String,
}

/// Action-type tags recorded with every entry
pub mod actions {
    pub const CREATE: &str = "CREATE";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
    pub const LOGIN: &str = "LOGIN";
    pub const LOGOUT: &str = "LOGOUT";
    pub const VIEW: &str = "VIEW";
}

/// Table names recorded in the `table_affected` column
pub mod tables {
    pub const USERS: &str = "users";
    pub const RESIDENTS: &str = "residents";
    pub const BENEFICIARY_CATEGORY: &str = "beneficiary_category";
    pub const RESIDENT_BENEFICIARY: &str = "resident_beneficiary";
    pub const ASSISTANCE_RECORDS: &str = "assistance_records";
    pub const ACTIVITY_LOG: &str = "activity_log";
    pub const BACKUP_HISTORY: &str = "backup_history";
}

/// Append an activity log entry
pub async fn log_activity(
    db: &SqlitePool,
    user_id: &str,
    activity: &str,
    action_type: &str,
    table_affected: Option<&str>,
    record_id: Option<&str>,
    ip_address: Option<&str>,
) -> Result<(), sqlx::Error> {
    let log_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO activity_log (log_id, user_id, activity, action_type, table_affected, record_id, ip_address, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&log_id)
    .bind(user_id)
    .bind(activity)
    .bind(action_type)
    .bind(table_affected)
    .bind(record_id)
    .bind(ip_address)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::debug!(
        user_id = user_id,
        action_type = action_type,
        table_affected = table_affected,
        record_id = record_id,
        "Activity logged"
    );

    Ok(())
}

/// The `limit` most recent entries, newest first, with acting username.
/// Entries written by since-deleted accounts fall back to the raw id.
pub async fn list_recent(
    db: &SqlitePool,
    limit: i64,
) -> Result<Vec<ActivityLogView>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT l.log_id, l.user_id, COALESCE(u.username, l.user_id) AS username,
               l.activity, l.action_type, l.table_affected, l.record_id,
               l.ip_address, l.timestamp
        FROM activity_log l
        LEFT JOIN users u ON l.user_id = u.user_id
        ORDER BY l.timestamp DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

/// The full history, newest first, with acting username
pub async fn list_all(db: &SqlitePool) -> Result<Vec<ActivityLogView>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT l.log_id, l.user_id, COALESCE(u.username, l.user_id) AS username,
               l.activity, l.action_type, l.table_affected, l.record_id,
               l.ip_address, l.timestamp
        FROM activity_log l
        LEFT JOIN users u ON l.user_id = u.user_id
        ORDER BY l.timestamp DESC
        "#,
    )
    .fetch_all(db)
    .await
}

/// Number of entries for a given table/record pair
pub async fn count_for_record(
    db: &SqlitePool,
    table_affected: &str,
    record_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM activity_log WHERE table_affected = ? AND record_id = ?",
    )
    .bind(table_affected)
    .bind(record_id)
    .fetch_one(db)
    .await
}
