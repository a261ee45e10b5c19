use std::fmt::Write;

use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::audits::{pending_for_promotion, PromotionPending};
use crate::error::AuditError;
use crate::models::Audit;
use crate::priority::{ScoringWeights, Tier};
use crate::progression::ProgressionFeed;
use crate::store::{AuditStore, DropoutRegistry};

/// Promotions shown on the dashboard, newest first.
pub const DASHBOARD_PROMOTIONS: i64 = 3;
pub const RECENT_AUDITS: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    pub name: String,
    #[serde(flatten)]
    pub pending: PromotionPending,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub promotions: Vec<DashboardEntry>,
    pub total_pending: usize,
    pub skipped: Vec<String>,
    pub recent_audits: Vec<Audit>,
}

/// Pending audits for the most recent promotions.
///
/// A promotion that fails to resolve is logged and left out; the others
/// still make it into the dashboard.
pub async fn build_dashboard(
    feed: &dyn ProgressionFeed,
    store: &dyn AuditStore,
    registry: &dyn DropoutRegistry,
    weights: &ScoringWeights,
    promotion_limit: i64,
) -> Result<Dashboard, AuditError> {
    let promotions = store.recent_promotions(promotion_limit).await?;

    let outcomes = join_all(
        promotions
            .iter()
            .map(|promotion| pending_for_promotion(feed, store, registry, &promotion.id, weights)),
    )
    .await;

    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    for (promotion, outcome) in promotions.into_iter().zip(outcomes) {
        match outcome {
            Ok(pending) => entries.push(DashboardEntry {
                name: promotion.name,
                pending,
            }),
            Err(err) => {
                warn!(promotion_id = %promotion.id, error = %err, "skipping promotion");
                skipped.push(promotion.id);
            }
        }
    }

    let total_pending = entries.iter().map(|entry| entry.pending.summary.total).sum();
    let recent_audits = match store.recent_audits(RECENT_AUDITS).await {
        Ok(audits) => audits,
        Err(err) => {
            warn!(error = %err, "recent audits unavailable");
            Vec::new()
        }
    };

    Ok(Dashboard {
        promotions: entries,
        total_pending,
        skipped,
        recent_audits,
    })
}

/// Line reported for a promotion left out of the dashboard.
pub fn skipped_notice(promotion_id: &str) -> String {
    format!("Skipped {promotion_id}: could not be processed.")
}

fn tier_label(tier: Tier) -> &'static str {
    match tier {
        Tier::Urgent => "URGENT",
        Tier::Warning => "warning",
        Tier::Normal => "normal",
    }
}

pub fn render_markdown(dashboard: &Dashboard) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Pending Audits");
    let _ = writeln!(
        output,
        "{} groups waiting for review across {} promotions",
        dashboard.total_pending,
        dashboard.promotions.len()
    );

    for skipped in &dashboard.skipped {
        let _ = writeln!(output, "{}", skipped_notice(skipped));
    }

    for entry in &dashboard.promotions {
        let summary = &entry.pending.summary;
        let _ = writeln!(output);
        let _ = writeln!(output, "## {} ({})", entry.name, entry.pending.promotion_id);
        let _ = writeln!(
            output,
            "{} pending: {} urgent, {} warning, {} normal (avg score {:.1})",
            summary.total, summary.urgent, summary.warning, summary.normal, summary.average_score
        );

        let _ = writeln!(output);
        let _ = writeln!(output, "### Coverage");
        for coverage in &entry.pending.coverage {
            let _ = writeln!(
                output,
                "- {}: {}/{} groups audited ({}%), {} students waiting",
                coverage.track,
                coverage.audited_groups,
                coverage.total_groups,
                coverage.progress_percent,
                coverage.pending_students
            );
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "### Queue");
        if entry.pending.groups.is_empty() {
            let _ = writeln!(output, "Nothing left to audit.");
        } else {
            for group in entry.pending.groups.iter().take(10) {
                let _ = writeln!(
                    output,
                    "- [{}] {} / {} score {} ({})",
                    tier_label(group.tier),
                    group.project,
                    group.group_id,
                    group.score,
                    group.reasons.join("; ")
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Audits");
    if dashboard.recent_audits.is_empty() {
        let _ = writeln!(output, "No audits recorded yet.");
    } else {
        for audit in &dashboard.recent_audits {
            let validated = audit.results.iter().filter(|r| r.validated).count();
            let _ = writeln!(
                output,
                "- {} {} / {} by {} on {}: {}/{} validated",
                audit.promotion_id,
                audit.project,
                audit.group_id,
                audit.auditor,
                audit.created_at.date_naive(),
                validated,
                audit.results.len()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::testing::{student, FakeFeed, MemoryStore};

    fn store_with_promotions() -> MemoryStore {
        let store = MemoryStore::default();
        let dates = [
            ("promo-2023", (2023, 1, 9)),
            ("promo-2024", (2024, 1, 8)),
            ("promo-2025", (2025, 1, 13)),
            ("promo-2026", (2026, 1, 12)),
        ];
        for (id, (y, m, d)) in dates {
            store.add_promotion(id, NaiveDate::from_ymd_opt(y, m, d).unwrap());
        }
        store
    }

    #[tokio::test]
    async fn dashboard_limits_to_recent_promotions_and_skips_failures() {
        let store = store_with_promotions();
        let feed = FakeFeed::default()
            .with("promo-2026", vec![student("alice", &[("forum", "g1", "finished")])])
            .with("promo-2024", vec![student("bob", &[("rt", "g2", "finished")])])
            .with("promo-2023", vec![student("carol", &[("rt", "g3", "finished")])])
            .failing("promo-2025");

        let dashboard = build_dashboard(
            &feed,
            &store,
            &store,
            &ScoringWeights::default(),
            DASHBOARD_PROMOTIONS,
        )
        .await
        .unwrap();

        let ids: Vec<&str> = dashboard
            .promotions
            .iter()
            .map(|entry| entry.pending.promotion_id.as_str())
            .collect();
        assert_eq!(ids, vec!["promo-2026", "promo-2024"]);
        assert_eq!(dashboard.skipped, vec!["promo-2025".to_string()]);
        assert_eq!(dashboard.total_pending, 2);
    }

    #[tokio::test]
    async fn dashboard_survives_recent_audit_failure() {
        let store = store_with_promotions();
        store.fail_recent_audits();
        let feed = FakeFeed::default()
            .with("promo-2026", vec![student("alice", &[("forum", "g1", "finished")])])
            .with("promo-2025", vec![])
            .failing("promo-2024");

        let dashboard = build_dashboard(
            &feed,
            &store,
            &store,
            &ScoringWeights::default(),
            DASHBOARD_PROMOTIONS,
        )
        .await
        .unwrap();

        assert!(dashboard.recent_audits.is_empty());
        assert_eq!(dashboard.promotions.len(), 2);
        assert_eq!(dashboard.total_pending, 1);

        let markdown = render_markdown(&dashboard);
        assert!(markdown.contains("Skipped promo-2024: could not be processed."));
        assert!(!markdown.contains("progression unavailable"));
    }

    #[tokio::test]
    async fn markdown_lists_queue_and_coverage() {
        let store = store_with_promotions();
        let feed = FakeFeed::default()
            .with("promo-2026", vec![student("alice", &[("forum", "g1", "finished")])]);

        let dashboard = build_dashboard(&feed, &store, &store, &ScoringWeights::default(), 1)
            .await
            .unwrap();
        let markdown = render_markdown(&dashboard);

        assert!(markdown.contains("# Pending Audits"));
        assert!(markdown.contains("## promo-2026 (promo-2026)"));
        assert!(markdown.contains("- [URGENT] forum / g1 score 80"));
        assert!(markdown.contains("- Golang: 0/1 groups audited (0%), 1 students waiting"));
        assert!(markdown.contains("No audits recorded yet."));
    }
}
