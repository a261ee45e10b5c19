//! In-memory collaborators and fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::curriculum::Track;
use crate::error::AuditError;
use crate::models::{Audit, AuditResult, AuditUpdate, NewAudit, Promotion, StudentResultInput};
use crate::progression::{
    FeedError, GroupMember, ProgressionFeed, ProjectGroup, ProjectProgress, StudentProgress,
};
use crate::store::{AuditStore, DropoutRegistry};

pub fn student(login: &str, projects: &[(&str, &str, &str)]) -> StudentProgress {
    StudentProgress {
        login: login.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        projects: projects
            .iter()
            .map(|(project, group_id, status)| ProjectProgress {
                project: project.to_string(),
                group_id: group_id.to_string(),
                status: status.to_string(),
            })
            .collect(),
    }
}

pub fn group(project: &str, group_id: &str, status: &str, logins: &[&str]) -> ProjectGroup {
    ProjectGroup {
        project: project.to_string(),
        group_id: group_id.to_string(),
        status: status.to_string(),
        members: logins
            .iter()
            .map(|login| GroupMember {
                login: login.to_string(),
                display_name: login.to_string(),
            })
            .collect(),
    }
}

pub fn result_for(login: &str) -> StudentResultInput {
    StudentResultInput {
        student_login: login.to_string(),
        validated: true,
        feedback: String::new(),
        warnings: Vec::new(),
    }
}

pub fn new_audit(
    promotion_id: &str,
    track: Track,
    project: &str,
    group_id: &str,
    logins: &[&str],
) -> NewAudit {
    NewAudit {
        promotion_id: promotion_id.to_string(),
        track,
        project: project.to_string(),
        group_id: group_id.to_string(),
        summary: String::new(),
        warnings: Vec::new(),
        auditor: "staff".to_string(),
        results: logins.iter().map(|login| result_for(login)).collect(),
    }
}

pub fn audit_for(
    promotion_id: &str,
    track: Track,
    project: &str,
    group_id: &str,
    logins: &[&str],
) -> Audit {
    materialize(Uuid::new_v4(), &new_audit(promotion_id, track, project, group_id, logins))
}

fn to_results(results: &[StudentResultInput]) -> Vec<AuditResult> {
    results
        .iter()
        .map(|result| AuditResult {
            student_login: result.student_login.clone(),
            validated: result.validated,
            feedback: result.feedback.clone(),
            warnings: result.warnings.clone(),
        })
        .collect()
}

fn materialize(id: Uuid, audit: &NewAudit) -> Audit {
    let now = Utc::now();
    Audit {
        id,
        promotion_id: audit.promotion_id.clone(),
        track: audit.track,
        project: audit.project.clone(),
        group_id: audit.group_id.clone(),
        summary: audit.summary.clone(),
        warnings: audit.warnings.clone(),
        auditor: audit.auditor.clone(),
        created_at: now,
        updated_at: now,
        results: to_results(&audit.results),
    }
}

/// Progression feed backed by a fixed map; promotions listed in `failing`
/// answer with a network error.
#[derive(Default)]
pub struct FakeFeed {
    pub promotions: HashMap<String, Vec<StudentProgress>>,
    pub failing: HashSet<String>,
}

impl FakeFeed {
    pub fn with(mut self, promotion_id: &str, students: Vec<StudentProgress>) -> Self {
        self.promotions.insert(promotion_id.to_string(), students);
        self
    }

    pub fn failing(mut self, promotion_id: &str) -> Self {
        self.failing.insert(promotion_id.to_string());
        self
    }
}

#[async_trait]
impl ProgressionFeed for FakeFeed {
    async fn fetch_progress(&self, promotion_id: &str) -> Result<Vec<StudentProgress>, FeedError> {
        if self.failing.contains(promotion_id) {
            return Err(FeedError::Network("connection refused".to_string()));
        }
        Ok(self.promotions.get(promotion_id).cloned().unwrap_or_default())
    }
}

/// Store with the same uniqueness and replacement rules as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    audits: Mutex<Vec<Audit>>,
    promotions: Mutex<Vec<Promotion>>,
    dropouts: Mutex<HashMap<String, HashSet<String>>>,
    recent_fails: AtomicBool,
}

impl MemoryStore {
    pub fn add_promotion(&self, id: &str, start_date: NaiveDate) {
        self.promotions.lock().unwrap().push(Promotion {
            id: id.to_string(),
            name: id.to_string(),
            start_date,
        });
    }

    pub fn add_dropout(&self, promotion_id: &str, login: &str) {
        self.dropouts
            .lock()
            .unwrap()
            .entry(promotion_id.to_string())
            .or_default()
            .insert(login.to_lowercase());
    }

    /// Makes `recent_audits` answer with a pool timeout.
    pub fn fail_recent_audits(&self) {
        self.recent_fails.store(true, Ordering::SeqCst);
    }

    pub fn audit_count(&self) -> usize {
        self.audits.lock().unwrap().len()
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit(&self, audit: &NewAudit) -> Result<Audit, AuditError> {
        let mut audits = self.audits.lock().unwrap();
        let duplicate = audits.iter().any(|existing| {
            existing.promotion_id == audit.promotion_id
                && existing.project == audit.project
                && existing.group_id == audit.group_id
        });
        if duplicate {
            return Err(AuditError::Conflict {
                promotion_id: audit.promotion_id.clone(),
                project: audit.project.clone(),
                group_id: audit.group_id.clone(),
            });
        }

        let stored = materialize(Uuid::new_v4(), audit);
        audits.push(stored.clone());
        Ok(stored)
    }

    async fn replace_audit(&self, id: Uuid, update: &AuditUpdate) -> Result<Audit, AuditError> {
        let mut audits = self.audits.lock().unwrap();
        let audit = audits
            .iter_mut()
            .find(|audit| audit.id == id)
            .ok_or(AuditError::NotFound(id))?;

        audit.summary = update.summary.clone();
        audit.warnings = update.warnings.clone();
        audit.results = to_results(&update.results);
        audit.updated_at = Utc::now();
        Ok(audit.clone())
    }

    async fn audit(&self, id: Uuid) -> Result<Option<Audit>, AuditError> {
        Ok(self
            .audits
            .lock()
            .unwrap()
            .iter()
            .find(|audit| audit.id == id)
            .cloned())
    }

    async fn audits_for_promotion(
        &self,
        promotion_id: &str,
        track: Option<Track>,
    ) -> Result<Vec<Audit>, AuditError> {
        Ok(self
            .audits
            .lock()
            .unwrap()
            .iter()
            .filter(|audit| audit.promotion_id == promotion_id)
            .filter(|audit| track.map_or(true, |track| audit.track == track))
            .cloned()
            .collect())
    }

    async fn audit_counts(&self, promotion_id: &str) -> Result<HashMap<String, usize>, AuditError> {
        let mut counts = HashMap::new();
        for audit in self
            .audits
            .lock()
            .unwrap()
            .iter()
            .filter(|audit| audit.promotion_id == promotion_id)
        {
            for result in &audit.results {
                *counts.entry(result.student_login.to_lowercase()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn recent_audits(&self, limit: i64) -> Result<Vec<Audit>, AuditError> {
        if self.recent_fails.load(Ordering::SeqCst) {
            return Err(AuditError::Database(sqlx::Error::PoolTimedOut));
        }
        let audits = self.audits.lock().unwrap();
        Ok(audits
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn clear_audits(&self, promotion_id: Option<&str>) -> Result<u64, AuditError> {
        let mut audits = self.audits.lock().unwrap();
        let before = audits.len();
        match promotion_id {
            Some(promotion_id) => audits.retain(|audit| audit.promotion_id != promotion_id),
            None => audits.clear(),
        }
        Ok((before - audits.len()) as u64)
    }

    async fn recent_promotions(&self, limit: i64) -> Result<Vec<Promotion>, AuditError> {
        let mut promotions = self.promotions.lock().unwrap().clone();
        promotions.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        promotions.truncate(limit.max(0) as usize);
        Ok(promotions)
    }
}

#[async_trait]
impl DropoutRegistry for MemoryStore {
    async fn dropouts(&self, promotion_id: &str) -> Result<HashSet<String>, AuditError> {
        Ok(self
            .dropouts
            .lock()
            .unwrap()
            .get(promotion_id)
            .cloned()
            .unwrap_or_default())
    }
}
