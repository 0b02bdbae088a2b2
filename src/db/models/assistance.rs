//! Assistance record models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssistanceRecord {
    pub record_id: String,
    pub resident_id: String,
    pub category_id: String,
    pub assistance_type: String,
    pub amount: Option<f64>,
    pub date_given: String,
    pub encoded_by: String,
    pub remarks: Option<String>,
    pub created_at: String,
}

/// Assistance record joined with resident and category names for listing
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AssistanceRecordView {
    pub record_id: String,
    pub resident_id: String,
    pub resident_name: String,
    pub category_id: String,
    pub category_name: String,
    pub assistance_type: String,
    pub amount: Option<f64>,
    pub date_given: String,
    pub encoded_by: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistanceFields {
    pub resident_id: String,
    pub category_id: String,
    pub assistance_type: String,
    #[serde(default)]
    pub amount: Option<f64>,
    pub date_given: String,
    #[serde(default)]
    pub remarks: Option<String>,
}
