use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DesignationId, DesignationStatus, EmployeeId, PromotionId};

/// Collection envelope used by the designation and promotion endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(rename = "_id")]
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: String,
    /// Current designation name; the promotion form copies this into
    /// `fromDesignation` at submission time.
    pub designation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Designation {
    #[serde(rename = "_id")]
    pub id: DesignationId,
    pub name: String,
    pub status: DesignationStatus,
}

impl Designation {
    pub fn is_active(&self) -> bool {
        self.status == DesignationStatus::Active
    }
}

/// Employee reference embedded in a promotion record. The backend may
/// populate the full employee document; only `_id` is relied upon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRef {
    #[serde(rename = "_id")]
    pub id: EmployeeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterRef {
    pub original_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRecord {
    #[serde(rename = "_id")]
    pub id: PromotionId,
    pub employee: EmployeeRef,
    pub from_designation: String,
    pub to_designation: String,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub remarks: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_letter: Option<LetterRef>,
}

impl PromotionRecord {
    pub fn has_letter(&self) -> bool {
        self.promotion_letter.is_some()
    }
}
