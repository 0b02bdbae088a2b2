//! Beneficiary category models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BeneficiaryCategory {
    pub category_id: String,
    pub category_name: String,
    pub description: Option<String>,
    pub is_active: i64,
    pub created_at: String,
}

impl BeneficiaryCategory {
    pub fn is_active(&self) -> bool {
        self.is_active != 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryFields {
    pub category_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
