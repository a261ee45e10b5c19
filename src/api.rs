//! HTTP API for the audit dashboard.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::audits::{self, PromotionPending};
use crate::coverage::TrackCoverage;
use crate::curriculum::Track;
use crate::error::AuditError;
use crate::models::{Audit, AuditUpdate, NewAudit};
use crate::priority::ScoringWeights;
use crate::progression::ProgressionFeed;
use crate::report::{self, Dashboard, DASHBOARD_PROMOTIONS};
use crate::store::{AuditStore, DropoutRegistry};

const DEFAULT_RECENT_LIMIT: i64 = 20;
const MAX_RECENT_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<dyn ProgressionFeed>,
    pub store: Arc<dyn AuditStore>,
    pub dropouts: Arc<dyn DropoutRegistry>,
    pub weights: Arc<ScoringWeights>,
}

impl IntoResponse for AuditError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuditError::Feed(_) => (StatusCode::BAD_GATEWAY, "FEED_UNAVAILABLE"),
            AuditError::NotFound(_) | AuditError::GroupNotFound { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            AuditError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            err if err.is_invalid_submission() => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PromotionQuery {
    pub promotion_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoverageQuery {
    pub promotion_id: String,
    pub track: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PendingResponse {
    Promotion(PromotionPending),
    Dashboard(Dashboard),
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/audits",
            axum::routing::post(create_audit).delete(clear_audits),
        )
        .route("/api/audits/recent", get(recent_audits))
        .route("/api/audits/:id", get(get_audit).put(update_audit))
        .route("/api/pending-audits", get(pending_audits))
        .route("/api/coverage", get(coverage))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("audit-priority listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_audit(
    State(state): State<AppState>,
    Json(payload): Json<NewAudit>,
) -> Result<(StatusCode, Json<Audit>), AuditError> {
    let audit = audits::create_audit(state.feed.as_ref(), state.store.as_ref(), &payload).await?;
    Ok((StatusCode::CREATED, Json(audit)))
}

async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Audit>, AuditError> {
    state
        .store
        .audit(id)
        .await?
        .map(Json)
        .ok_or(AuditError::NotFound(id))
}

async fn update_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AuditUpdate>,
) -> Result<Json<Audit>, AuditError> {
    let audit = audits::update_audit(state.feed.as_ref(), state.store.as_ref(), id, &payload).await?;
    Ok(Json(audit))
}

async fn recent_audits(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Audit>>, AuditError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    Ok(Json(state.store.recent_audits(limit).await?))
}

async fn clear_audits(
    State(state): State<AppState>,
    Query(query): Query<PromotionQuery>,
) -> Result<Json<serde_json::Value>, AuditError> {
    let deleted = state
        .store
        .clear_audits(query.promotion_id.as_deref())
        .await?;
    info!(promotion_id = ?query.promotion_id, deleted, "audits cleared");
    Ok(Json(json!({ "deleted": deleted })))
}

async fn pending_audits(
    State(state): State<AppState>,
    Query(query): Query<PromotionQuery>,
) -> Result<Json<PendingResponse>, AuditError> {
    let response = match query.promotion_id {
        Some(promotion_id) => PendingResponse::Promotion(
            audits::pending_for_promotion(
                state.feed.as_ref(),
                state.store.as_ref(),
                state.dropouts.as_ref(),
                &promotion_id,
                &state.weights,
            )
            .await?,
        ),
        None => PendingResponse::Dashboard(
            report::build_dashboard(
                state.feed.as_ref(),
                state.store.as_ref(),
                state.dropouts.as_ref(),
                &state.weights,
                DASHBOARD_PROMOTIONS,
            )
            .await?,
        ),
    };
    Ok(Json(response))
}

async fn coverage(
    State(state): State<AppState>,
    Query(query): Query<CoverageQuery>,
) -> Result<Json<Vec<TrackCoverage>>, AuditError> {
    let track = query
        .track
        .as_deref()
        .map(str::parse::<Track>)
        .transpose()
        .map_err(AuditError::BadRequest)?;

    let coverage = audits::coverage_for_promotion(
        state.feed.as_ref(),
        state.store.as_ref(),
        state.dropouts.as_ref(),
        &query.promotion_id,
        track,
    )
    .await?;
    Ok(Json(coverage))
}
