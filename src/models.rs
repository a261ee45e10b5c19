use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::curriculum::Track;

#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
}

/// A stored code review of one project group.
#[derive(Debug, Clone, Serialize)]
pub struct Audit {
    pub id: Uuid,
    pub promotion_id: String,
    pub track: Track,
    pub project: String,
    pub group_id: String,
    pub summary: String,
    pub warnings: Vec<String>,
    pub auditor: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub results: Vec<AuditResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    pub student_login: String,
    pub validated: bool,
    pub feedback: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StudentResultInput {
    pub student_login: String,
    pub validated: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewAudit {
    pub promotion_id: String,
    pub track: Track,
    pub project: String,
    pub group_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub auditor: String,
    pub results: Vec<StudentResultInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditUpdate {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub results: Vec<StudentResultInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropoutRecord {
    pub login: String,
    pub promotion_id: String,
    #[serde(default)]
    pub reason: String,
}
