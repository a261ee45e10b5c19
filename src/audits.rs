use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::coverage::{resolve_track, TrackCoverage, TrackResolution};
use crate::curriculum::{projects_for, track_of, Track};
use crate::error::AuditError;
use crate::models::{Audit, AuditUpdate, NewAudit, StudentResultInput};
use crate::priority::{rank, score_group, summarize, PriorityGroup, PrioritySummary, ScoringWeights};
use crate::progression::{
    find_group, group_by_project, ProgressionFeed, ProjectGroup, StudentProgress,
};
use crate::store::{AuditStore, DropoutRegistry};

#[derive(Debug, Clone, Serialize)]
pub struct PromotionPending {
    pub promotion_id: String,
    pub groups: Vec<PriorityGroup>,
    pub summary: PrioritySummary,
    pub coverage: Vec<TrackCoverage>,
}

fn validate_results(results: &[StudentResultInput]) -> Result<(), AuditError> {
    if results.is_empty() {
        return Err(AuditError::EmptyResults);
    }

    let mut seen = HashSet::new();
    for result in results {
        if !seen.insert(result.student_login.to_lowercase()) {
            return Err(AuditError::DuplicateStudent(result.student_login.clone()));
        }
    }
    Ok(())
}

/// Records a review for a finished group after checking it against the feed.
pub async fn create_audit(
    feed: &dyn ProgressionFeed,
    store: &dyn AuditStore,
    audit: &NewAudit,
) -> Result<Audit, AuditError> {
    if track_of(&audit.project) != Some(audit.track) {
        return Err(AuditError::ProjectOutsideTrack {
            project: audit.project.clone(),
            track: audit.track,
        });
    }
    validate_results(&audit.results)?;

    let entries = feed.fetch_progress(&audit.promotion_id).await?;
    let group = find_group(&entries, &audit.project, &audit.group_id).ok_or_else(|| {
        AuditError::GroupNotFound {
            project: audit.project.clone(),
            group_id: audit.group_id.clone(),
        }
    })?;

    if !group.is_finished() {
        return Err(AuditError::GroupNotFinished {
            group_id: group.group_id,
            status: group.status,
        });
    }

    ensure_members(&group, &audit.results)?;

    let stored = store.insert_audit(audit).await?;
    info!(
        audit_id = %stored.id,
        promotion_id = %stored.promotion_id,
        project = %stored.project,
        group_id = %stored.group_id,
        "audit recorded"
    );
    Ok(stored)
}

/// Rewrites an audit's feedback; the previous result set is discarded.
///
/// Every listed student must still belong to the audited group in the feed.
pub async fn update_audit(
    feed: &dyn ProgressionFeed,
    store: &dyn AuditStore,
    id: Uuid,
    update: &AuditUpdate,
) -> Result<Audit, AuditError> {
    validate_results(&update.results)?;

    let existing = store.audit(id).await?.ok_or(AuditError::NotFound(id))?;
    let entries = feed.fetch_progress(&existing.promotion_id).await?;
    let group = find_group(&entries, &existing.project, &existing.group_id).ok_or_else(|| {
        AuditError::GroupNotFound {
            project: existing.project.clone(),
            group_id: existing.group_id.clone(),
        }
    })?;
    ensure_members(&group, &update.results)?;

    let stored = store.replace_audit(id, update).await?;
    info!(audit_id = %id, results = stored.results.len(), "audit updated");
    Ok(stored)
}

fn ensure_members(group: &ProjectGroup, results: &[StudentResultInput]) -> Result<(), AuditError> {
    match results
        .iter()
        .find(|result| !group.has_member(&result.student_login))
    {
        Some(stranger) => Err(AuditError::NotAMember(stranger.student_login.clone())),
        None => Ok(()),
    }
}

fn resolve_tracks(
    tracks: &[Track],
    entries: &[StudentProgress],
    audits: &[Audit],
    dropouts: &HashSet<String>,
) -> Vec<TrackResolution> {
    tracks
        .iter()
        .map(|track| {
            let groups: Vec<_> = projects_for(*track)
                .iter()
                .flat_map(|project| group_by_project(entries, project))
                .collect();
            resolve_track(*track, &groups, audits, dropouts)
        })
        .collect()
}

/// Ranks every pending group of the promotion across all tracks.
pub async fn pending_for_promotion(
    feed: &dyn ProgressionFeed,
    store: &dyn AuditStore,
    registry: &dyn DropoutRegistry,
    promotion_id: &str,
    weights: &ScoringWeights,
) -> Result<PromotionPending, AuditError> {
    let (entries, audits, history, dropouts) = tokio::try_join!(
        async { feed.fetch_progress(promotion_id).await.map_err(AuditError::from) },
        store.audits_for_promotion(promotion_id, None),
        store.audit_counts(promotion_id),
        registry.dropouts(promotion_id),
    )?;

    Ok(rank_pending(promotion_id, &entries, &audits, &history, &dropouts, weights))
}

fn rank_pending(
    promotion_id: &str,
    entries: &[StudentProgress],
    audits: &[Audit],
    history: &HashMap<String, usize>,
    dropouts: &HashSet<String>,
    weights: &ScoringWeights,
) -> PromotionPending {
    let resolutions = resolve_tracks(&Track::ALL, entries, audits, dropouts);

    let mut groups: Vec<PriorityGroup> = resolutions
        .iter()
        .flat_map(|resolution| {
            resolution
                .pending
                .iter()
                .map(move |pending| score_group(resolution.coverage.track, pending, history, weights))
        })
        .collect();
    rank(&mut groups);

    let summary = summarize(&groups);
    debug!(
        promotion_id,
        pending = summary.total,
        urgent = summary.urgent,
        "pending audits ranked"
    );

    PromotionPending {
        promotion_id: promotion_id.to_string(),
        groups,
        summary,
        coverage: resolutions
            .into_iter()
            .map(|resolution| resolution.coverage)
            .collect(),
    }
}

/// Audited versus pending counts per track, optionally for a single track.
pub async fn coverage_for_promotion(
    feed: &dyn ProgressionFeed,
    store: &dyn AuditStore,
    registry: &dyn DropoutRegistry,
    promotion_id: &str,
    track: Option<Track>,
) -> Result<Vec<TrackCoverage>, AuditError> {
    let (entries, audits, dropouts) = tokio::try_join!(
        async { feed.fetch_progress(promotion_id).await.map_err(AuditError::from) },
        store.audits_for_promotion(promotion_id, track),
        registry.dropouts(promotion_id),
    )?;

    let tracks: Vec<Track> = match track {
        Some(track) => vec![track],
        None => Track::ALL.to_vec(),
    };

    Ok(resolve_tracks(&tracks, &entries, &audits, &dropouts)
        .into_iter()
        .map(|resolution| resolution.coverage)
        .collect())
}
