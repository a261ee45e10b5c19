use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::priority::ScoringWeights;
use crate::progression::{HttpProgressionFeed, ProgressionFeed, UnconfiguredFeed};

/// Connection settings shared by every subcommand.
#[derive(Debug, Args)]
pub struct Settings {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Base URL of the Zone01 progression API
    #[arg(long, env = "ZONE01_API_URL", global = true)]
    pub feed_url: Option<String>,

    /// Bearer token for the progression API
    #[arg(long, env = "ZONE01_API_TOKEN", global = true, hide_env_values = true)]
    pub feed_token: Option<String>,

    /// TOML file overriding scoring weights and tier thresholds
    #[arg(long, env = "AUDIT_PRIORITY_WEIGHTS", global = true)]
    pub weights: Option<PathBuf>,

    #[arg(long, default_value_t = 5, global = true)]
    pub max_connections: u32,
}

impl Settings {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let database_url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")?;

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")
    }

    pub fn feed(&self) -> Arc<dyn ProgressionFeed> {
        match &self.feed_url {
            Some(url) => {
                info!(url = %url, "using progression feed");
                Arc::new(HttpProgressionFeed::new(url.clone(), self.feed_token.clone()))
            }
            None => {
                warn!("ZONE01_API_URL is not set, progression lookups will fail");
                Arc::new(UnconfiguredFeed)
            }
        }
    }

    pub fn scoring_weights(&self) -> anyhow::Result<ScoringWeights> {
        match &self.weights {
            Some(path) => {
                let weights = ScoringWeights::from_file(path)?;
                info!(path = %path.display(), "loaded scoring weights");
                Ok(weights)
            }
            None => Ok(ScoringWeights::default()),
        }
    }
}
