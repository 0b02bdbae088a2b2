//! Resident models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Resident {
    pub resident_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub suffix: Option<String>,
    pub birthdate: Option<String>,
    pub gender: Option<String>,
    pub civil_status: Option<String>,
    pub contact_no: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub purok: Option<String>,
    pub occupation: Option<String>,
    pub monthly_income: Option<f64>,
    pub status: String,
    pub remarks: Option<String>,
    pub created_at: String,
}

impl Resident {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields accepted when creating or updating a resident
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResidentFields {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub civil_status: Option<String>,
    #[serde(default)]
    pub contact_no: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub purok: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub monthly_income: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Resident row with its active beneficiary categories, for the
/// classification overview
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResidentWithCategories {
    pub resident_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub status: String,
    pub categories: Option<String>,
}
