use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::curriculum::Track;
use crate::models::Audit;
use crate::progression::{GroupMember, ProjectGroup};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCoverage {
    pub track: Track,
    pub total_groups: usize,
    pub audited_groups: usize,
    pub pending_groups: usize,
    pub total_students: usize,
    pub audited_students: usize,
    pub pending_students: usize,
    pub progress_percent: u32,
}

/// A finished group with no audit yet, reduced to its active members.
#[derive(Debug, Clone)]
pub struct PendingGroup {
    pub group: ProjectGroup,
    pub active_members: Vec<GroupMember>,
}

#[derive(Debug, Clone)]
pub struct TrackResolution {
    pub coverage: TrackCoverage,
    pub pending: Vec<PendingGroup>,
}

pub fn progress_percent(audited: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (audited as f64 / total as f64 * 100.0).round() as u32
}

/// Members whose login is not in the dropout set. `dropouts` holds lowercase logins.
pub fn active_members(group: &ProjectGroup, dropouts: &HashSet<String>) -> Vec<GroupMember> {
    group
        .members
        .iter()
        .filter(|member| !dropouts.contains(&member.login.to_lowercase()))
        .cloned()
        .collect()
}

/// Splits the finished groups of a track into audited and pending.
///
/// Groups left without active members are dropped from every count.
pub fn resolve_track(
    track: Track,
    groups: &[ProjectGroup],
    audits: &[Audit],
    dropouts: &HashSet<String>,
) -> TrackResolution {
    let audited: HashMap<(&str, &str), &Audit> = audits
        .iter()
        .filter(|audit| audit.track == track)
        .map(|audit| ((audit.project.as_str(), audit.group_id.as_str()), audit))
        .collect();

    let mut coverage = TrackCoverage {
        track,
        total_groups: 0,
        audited_groups: 0,
        pending_groups: 0,
        total_students: 0,
        audited_students: 0,
        pending_students: 0,
        progress_percent: 0,
    };
    let mut pending = Vec::new();

    for group in groups.iter().filter(|group| group.is_finished()) {
        let active = active_members(group, dropouts);
        if active.is_empty() {
            continue;
        }

        coverage.total_groups += 1;
        coverage.total_students += active.len();

        let key = (group.project.as_str(), group.group_id.as_str());
        if audited.contains_key(&key) {
            coverage.audited_groups += 1;
            coverage.audited_students += active.len();
        } else {
            coverage.pending_groups += 1;
            coverage.pending_students += active.len();
            pending.push(PendingGroup {
                group: group.clone(),
                active_members: active,
            });
        }
    }

    coverage.progress_percent = progress_percent(coverage.audited_groups, coverage.total_groups);

    TrackResolution { coverage, pending }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{audit_for, group};

    fn dropouts(logins: &[&str]) -> HashSet<String> {
        logins.iter().map(|login| login.to_string()).collect()
    }

    #[test]
    fn percentage_rounds_and_guards_zero() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13);
        assert_eq!(progress_percent(4, 4), 100);
    }

    #[test]
    fn groups_without_audit_are_pending() {
        let groups = vec![
            group("forum", "g1", "finished", &["alice", "bob"]),
            group("forum", "g2", "finished", &["carol"]),
            group("lem-in", "g3", "working", &["dave"]),
        ];
        let audits = vec![audit_for("promo", Track::Golang, "forum", "g1", &["alice", "bob"])];

        let resolution = resolve_track(Track::Golang, &groups, &audits, &HashSet::new());
        assert_eq!(resolution.coverage.total_groups, 2);
        assert_eq!(resolution.coverage.audited_groups, 1);
        assert_eq!(resolution.coverage.pending_groups, 1);
        assert_eq!(resolution.coverage.total_students, 3);
        assert_eq!(resolution.coverage.audited_students, 2);
        assert_eq!(resolution.coverage.pending_students, 1);
        assert_eq!(resolution.coverage.progress_percent, 50);
        assert_eq!(resolution.pending.len(), 1);
        assert_eq!(resolution.pending[0].group.group_id, "g2");
    }

    #[test]
    fn fully_withdrawn_groups_are_excluded() {
        let groups = vec![
            group("forum", "g1", "finished", &["Alice", "bob"]),
            group("forum", "g2", "finished", &["carol", "dave"]),
        ];

        let resolution = resolve_track(
            Track::Golang,
            &groups,
            &[],
            &dropouts(&["alice", "bob", "carol"]),
        );
        assert_eq!(resolution.coverage.total_groups, 1);
        assert_eq!(resolution.pending.len(), 1);
        assert_eq!(resolution.pending[0].group.group_id, "g2");
        assert_eq!(resolution.pending[0].active_members.len(), 1);
        assert_eq!(resolution.pending[0].active_members[0].login, "dave");
    }

    #[test]
    fn audit_lookup_is_scoped_to_the_project() {
        let groups = vec![group("forum", "g1", "finished", &["alice"])];
        let audits = vec![audit_for("promo", Track::Golang, "lem-in", "g1", &["alice"])];

        let resolution = resolve_track(Track::Golang, &groups, &audits, &HashSet::new());
        assert_eq!(resolution.coverage.pending_groups, 1);
    }

    #[test]
    fn empty_track_reports_zero_progress() {
        let resolution = resolve_track(Track::Java, &[], &[], &HashSet::new());
        assert_eq!(resolution.coverage.total_groups, 0);
        assert_eq!(resolution.coverage.progress_percent, 0);
        assert!(resolution.pending.is_empty());
    }
}
