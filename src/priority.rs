//! Urgency scoring of pending audit groups.
//!
//! Points accumulate additively per rule and every rule that fires leaves a
//! reason behind. Tiering is a hard cut on the final score.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::coverage::PendingGroup;
use crate::curriculum::Track;
use crate::progression::GroupMember;

/// Point values and tier thresholds. Any field missing from a weights file
/// keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub never_audited_member: u32,
    pub all_new_group: u32,
    pub mostly_new_group: u32,
    pub very_low_average: u32,
    pub low_average: u32,
    pub golang_bonus: u32,
    pub javascript_bonus: u32,
    pub rust_bonus: u32,
    pub java_bonus: u32,
    pub large_group_bonus: u32,
    pub large_group_size: usize,
    pub urgent_threshold: u32,
    pub warning_threshold: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            never_audited_member: 25,
            all_new_group: 30,
            mostly_new_group: 15,
            very_low_average: 20,
            low_average: 10,
            golang_bonus: 5,
            javascript_bonus: 10,
            rust_bonus: 15,
            java_bonus: 15,
            large_group_bonus: 5,
            large_group_size: 3,
            urgent_threshold: 50,
            warning_threshold: 25,
        }
    }
}

impl ScoringWeights {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read weights file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("invalid weights file {}", path.display()))
    }

    pub fn track_bonus(&self, track: Track) -> u32 {
        match track {
            Track::Golang => self.golang_bonus,
            Track::Javascript => self.javascript_bonus,
            Track::Rust => self.rust_bonus,
            Track::Java => self.java_bonus,
        }
    }

    pub fn tier(&self, score: u32) -> Tier {
        if score >= self.urgent_threshold {
            Tier::Urgent
        } else if score >= self.warning_threshold {
            Tier::Warning
        } else {
            Tier::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Urgent,
    Warning,
    Normal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityGroup {
    pub track: Track,
    pub project: String,
    pub group_id: String,
    pub members: Vec<GroupMember>,
    pub active_members: usize,
    pub members_never_audited: usize,
    pub average_prior_audits: f64,
    pub score: u32,
    pub tier: Tier,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrioritySummary {
    pub total: usize,
    pub urgent: usize,
    pub warning: usize,
    pub normal: usize,
    pub average_score: f64,
}

/// Scores one pending group against the promotion's audit history.
///
/// `history` maps lowercase logins to their number of prior audit results.
pub fn score_group(
    track: Track,
    pending: &PendingGroup,
    history: &HashMap<String, usize>,
    weights: &ScoringWeights,
) -> PriorityGroup {
    let members = &pending.active_members;
    let active = members.len();
    // Scores saturate at u32::MAX.
    let mut score = 0u32;
    let mut reasons = Vec::new();

    let prior: Vec<usize> = members
        .iter()
        .map(|member| {
            history
                .get(&member.login.to_lowercase())
                .copied()
                .unwrap_or(0)
        })
        .collect();
    let never_audited = prior.iter().filter(|count| **count == 0).count();

    if never_audited > 0 {
        let per_member = u32::try_from(never_audited).unwrap_or(u32::MAX);
        score = score.saturating_add(weights.never_audited_member.saturating_mul(per_member));
        reasons.push(format!("{never_audited} membre(s) jamais audité(s)"));
    }

    if active > 0 && never_audited == active {
        score = score.saturating_add(weights.all_new_group);
        reasons.push("Groupe entièrement nouveau".to_string());
    } else if active > 0 && never_audited * 2 >= active {
        score = score.saturating_add(weights.mostly_new_group);
        reasons.push("Majorité de membres jamais audités".to_string());
    }

    let average = if active == 0 {
        0.0
    } else {
        prior.iter().sum::<usize>() as f64 / active as f64
    };
    if average < 1.0 {
        score = score.saturating_add(weights.very_low_average);
        reasons.push(format!("Moyenne d'audits très faible ({average:.1})"));
    } else if average < 2.0 {
        score = score.saturating_add(weights.low_average);
        reasons.push(format!("Moyenne d'audits faible ({average:.1})"));
    }

    let bonus = weights.track_bonus(track);
    if bonus > 0 {
        score = score.saturating_add(bonus);
        reasons.push(format!("Projet {track}"));
    }

    if active >= weights.large_group_size {
        score = score.saturating_add(weights.large_group_bonus);
        reasons.push(format!("Groupe de {active} membres"));
    }

    PriorityGroup {
        track,
        project: pending.group.project.clone(),
        group_id: pending.group.group_id.clone(),
        members: members.clone(),
        active_members: active,
        members_never_audited: never_audited,
        average_prior_audits: average,
        score,
        tier: weights.tier(score),
        reasons,
    }
}

/// Highest score first; equal scores fall back to group id, then project.
pub fn rank(groups: &mut [PriorityGroup]) {
    groups.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.group_id.cmp(&b.group_id))
            .then_with(|| a.project.cmp(&b.project))
    });
}

pub fn summarize(groups: &[PriorityGroup]) -> PrioritySummary {
    let mut summary = PrioritySummary {
        total: groups.len(),
        ..PrioritySummary::default()
    };

    for group in groups {
        match group.tier {
            Tier::Urgent => summary.urgent += 1,
            Tier::Warning => summary.warning += 1,
            Tier::Normal => summary.normal += 1,
        }
    }

    if !groups.is_empty() {
        let total: u64 = groups.iter().map(|group| u64::from(group.score)).sum();
        let average = total as f64 / groups.len() as f64;
        summary.average_score = (average * 10.0).round() / 10.0;
    }

    summary
}
