use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

mod api;
mod audits;
mod config;
mod coverage;
mod curriculum;
mod db;
mod error;
mod models;
mod priority;
mod progression;
mod report;
mod store;
#[cfg(test)]
mod testing;

use crate::curriculum::Track;
use crate::db::PgStore;
use crate::models::NewAudit;
use crate::store::AuditStore;

#[derive(Parser)]
#[command(name = "audit-priority")]
#[command(about = "Audit coverage and review priority for Zone01 promotions", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: config::Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import withdrawn students from a CSV file (login,promotion_id,reason)
    ImportDropouts {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank groups waiting for an audit
    Pending {
        /// Single promotion; defaults to the most recent ones
        #[arg(long)]
        promotion: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show audited versus pending groups per track
    Coverage {
        #[arg(long)]
        promotion: String,
        #[arg(long)]
        track: Option<Track>,
    },
    /// Record an audit described in a JSON file
    CreateAudit {
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete stored audits and their results
    ClearAudits {
        #[arg(long)]
        promotion: Option<String>,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Generate a markdown report of pending audits
    Report {
        #[arg(long, default_value = "pending-audits.md")]
        out: PathBuf,
        #[arg(long, default_value_t = report::DASHBOARD_PROMOTIONS)]
        promotions: i64,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "AUDIT_PRIORITY_BIND", default_value = "127.0.0.1:5730")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let pool = settings.connect().await?;
    let store = PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportDropouts { csv } => {
            let imported = db::import_dropouts(&pool, &csv).await?;
            println!("Imported {imported} dropouts from {}.", csv.display());
        }
        Commands::Pending { promotion, limit } => {
            let feed = settings.feed();
            let weights = settings.scoring_weights()?;

            let promotions = match promotion {
                Some(promotion_id) => vec![
                    audits::pending_for_promotion(
                        feed.as_ref(),
                        &store,
                        &store,
                        &promotion_id,
                        &weights,
                    )
                    .await?,
                ],
                None => {
                    let dashboard = report::build_dashboard(
                        feed.as_ref(),
                        &store,
                        &store,
                        &weights,
                        report::DASHBOARD_PROMOTIONS,
                    )
                    .await?;
                    for skipped in &dashboard.skipped {
                        println!("{}", report::skipped_notice(skipped));
                    }
                    dashboard
                        .promotions
                        .into_iter()
                        .map(|entry| entry.pending)
                        .collect()
                }
            };

            for pending in promotions {
                let summary = &pending.summary;
                println!(
                    "{}: {} pending ({} urgent, {} warning, {} normal, avg {:.1})",
                    pending.promotion_id,
                    summary.total,
                    summary.urgent,
                    summary.warning,
                    summary.normal,
                    summary.average_score
                );
                for group in pending.groups.iter().take(limit) {
                    println!(
                        "- {:?} {} {} / {} score {}: {}",
                        group.tier,
                        group.track,
                        group.project,
                        group.group_id,
                        group.score,
                        group.reasons.join("; ")
                    );
                }
            }
        }
        Commands::Coverage { promotion, track } => {
            let feed = settings.feed();
            let coverage =
                audits::coverage_for_promotion(feed.as_ref(), &store, &store, &promotion, track)
                    .await?;

            println!("Audit progress for {promotion}:");
            for track in coverage {
                println!(
                    "- {}: {}/{} groups ({}%), {} students pending",
                    track.track,
                    track.audited_groups,
                    track.total_groups,
                    track.progress_percent,
                    track.pending_students
                );
            }
        }
        Commands::CreateAudit { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let audit: NewAudit = serde_json::from_str(&raw)
                .with_context(|| format!("invalid audit in {}", file.display()))?;
            let feed = settings.feed();
            let stored = audits::create_audit(feed.as_ref(), &store, &audit).await?;
            println!(
                "Audit {} recorded for {} / {} ({} results).",
                stored.id,
                stored.project,
                stored.group_id,
                stored.results.len()
            );
        }
        Commands::ClearAudits { promotion, yes } => {
            if !yes {
                anyhow::bail!("refusing to delete audits without --yes");
            }
            let deleted = store.clear_audits(promotion.as_deref()).await?;
            info!(promotion_id = ?promotion, deleted, "audits cleared");
            println!("Deleted {deleted} audits.");
        }
        Commands::Report { out, promotions } => {
            let feed = settings.feed();
            let weights = settings.scoring_weights()?;
            let dashboard =
                report::build_dashboard(feed.as_ref(), &store, &store, &weights, promotions)
                    .await?;
            std::fs::write(&out, report::render_markdown(&dashboard))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { bind } => {
            let state = api::AppState {
                feed: settings.feed(),
                store: Arc::new(store.clone()),
                dropouts: Arc::new(store),
                weights: Arc::new(settings.scoring_weights()?),
            };
            api::serve(state, bind).await?;
        }
    }

    Ok(())
}
