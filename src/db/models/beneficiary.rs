//! Resident-to-category beneficiary assignments.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BeneficiaryAssignment {
    pub assignment_id: String,
    pub resident_id: String,
    pub category_id: String,
    pub is_active: i64,
    pub date_classified: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentRequest {
    pub resident_id: String,
    pub category_id: String,
}
