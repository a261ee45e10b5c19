use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use uuid::Uuid;

use crate::curriculum::Track;
use crate::error::AuditError;
use crate::models::{Audit, AuditUpdate, NewAudit, Promotion};

/// Persistence for audits and their per-student results.
///
/// At most one audit exists per (promotion, project, group); a second insert
/// for the same triple fails with [`AuditError::Conflict`].
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, audit: &NewAudit) -> Result<Audit, AuditError>;

    /// Overwrites summary and warnings and replaces the whole result set.
    async fn replace_audit(&self, id: Uuid, update: &AuditUpdate) -> Result<Audit, AuditError>;

    async fn audit(&self, id: Uuid) -> Result<Option<Audit>, AuditError>;

    async fn audits_for_promotion(
        &self,
        promotion_id: &str,
        track: Option<Track>,
    ) -> Result<Vec<Audit>, AuditError>;

    /// Number of result rows per student in the promotion, keyed by lowercase login.
    async fn audit_counts(&self, promotion_id: &str) -> Result<HashMap<String, usize>, AuditError>;

    async fn recent_audits(&self, limit: i64) -> Result<Vec<Audit>, AuditError>;

    async fn clear_audits(&self, promotion_id: Option<&str>) -> Result<u64, AuditError>;

    async fn recent_promotions(&self, limit: i64) -> Result<Vec<Promotion>, AuditError>;
}

/// Source of withdrawn students.
#[async_trait]
pub trait DropoutRegistry: Send + Sync {
    /// Lowercase logins of the students marked withdrawn in the promotion.
    async fn dropouts(&self, promotion_id: &str) -> Result<HashSet<String>, AuditError>;
}
