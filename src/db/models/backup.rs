//! Backup history models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BackupRecord {
    pub backup_id: String,
    pub user_id: String,
    pub file_location: String,
    pub file_size: i64,
    pub remarks: Option<String>,
    pub backup_date: String,
}

/// Backup record shaped for the API, with a readable size
#[derive(Debug, Clone, Serialize)]
pub struct BackupResponse {
    pub backup_id: String,
    pub user_id: String,
    pub file_location: String,
    pub file_size: i64,
    pub file_size_human: String,
    pub remarks: Option<String>,
    pub backup_date: String,
}

impl From<BackupRecord> for BackupResponse {
    fn from(record: BackupRecord) -> Self {
        let file_size_human = human_size(record.file_size);
        Self {
            backup_id: record.backup_id,
            user_id: record.user_id,
            file_location: record.file_location,
            file_size: record.file_size,
            file_size_human,
            remarks: record.remarks,
            backup_date: record.backup_date,
        }
    }
}

fn human_size(size: i64) -> String {
    if size >= 1_073_741_824 {
        format!("{:.2} GB", size as f64 / 1_073_741_824.0)
    } else if size >= 1_048_576 {
        format!("{:.2} MB", size as f64 / 1_048_576.0)
    } else if size >= 1024 {
        format!("{:.2} KB", size as f64 / 1024.0)
    } else {
        format!("{} B", size)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}
