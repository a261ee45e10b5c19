use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::curriculum::Track;
use crate::error::AuditError;
use crate::models::{
    Audit, AuditResult, AuditUpdate, DropoutRecord, NewAudit, Promotion, StudentResultInput,
};
use crate::store::{AuditStore, DropoutRegistry};

const AUDIT_UNIQUE_CONSTRAINT: &str = "audits_promotion_project_group_key";

const AUDIT_COLUMNS: &str = "id, promotion_id, track, project, group_id, summary, warnings, \
     auditor, created_at, updated_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let promotions = vec![
        (
            "madere-2024",
            "Madère 2024",
            NaiveDate::from_ymd_opt(2024, 3, 4).context("invalid date")?,
        ),
        (
            "rouen-2025",
            "Rouen 2025",
            NaiveDate::from_ymd_opt(2025, 1, 13).context("invalid date")?,
        ),
        (
            "rouen-2026",
            "Rouen 2026",
            NaiveDate::from_ymd_opt(2026, 1, 12).context("invalid date")?,
        ),
    ];

    for (id, name, start_date) in promotions {
        sqlx::query(
            r#"
            INSERT INTO audit_priority.promotions (id, name, start_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, start_date = EXCLUDED.start_date
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(start_date)
        .execute(pool)
        .await?;
    }

    let dropouts = vec![
        ("rouen-2025", "jmoreno", "Left the programme in March"),
        ("rouen-2026", "kpatel", "Moved abroad"),
    ];

    for (promotion_id, login, reason) in dropouts {
        upsert_dropout(pool, promotion_id, login, reason).await?;
    }

    let store = PgStore::new(pool.clone());
    let audit = NewAudit {
        promotion_id: "rouen-2025".to_string(),
        track: Track::Golang,
        project: "groupie-tracker".to_string(),
        group_id: "seed-group-1".to_string(),
        summary: "Clean API layer, tests are thin".to_string(),
        warnings: vec![],
        auditor: "staff.seed".to_string(),
        results: vec![
            StudentResultInput {
                student_login: "alee".to_string(),
                validated: true,
                feedback: "Solid handling of the artists endpoint".to_string(),
                warnings: vec![],
            },
            StudentResultInput {
                student_login: "tnguyen".to_string(),
                validated: true,
                feedback: String::new(),
                warnings: vec!["Explain the caching choice next time".to_string()],
            },
        ],
    };

    match store.insert_audit(&audit).await {
        Ok(_) | Err(AuditError::Conflict { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    Ok(())
}

async fn upsert_dropout(
    pool: &PgPool,
    promotion_id: &str,
    login: &str,
    reason: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_priority.dropouts (promotion_id, login, reason)
        VALUES ($1, $2, $3)
        ON CONFLICT (promotion_id, login) DO UPDATE
        SET reason = EXCLUDED.reason
        "#,
    )
    .bind(promotion_id)
    .bind(login.to_lowercase())
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Loads `login,promotion_id,reason` rows into the dropout registry.
pub async fn import_dropouts(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for result in reader.deserialize::<DropoutRecord>() {
        let row = result?;
        if row.login.trim().is_empty() {
            continue;
        }
        if upsert_dropout(pool, &row.promotion_id, row.login.trim(), &row.reason).await? > 0 {
            imported += 1;
        }
    }

    Ok(imported)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_results(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<AuditResult>>, AuditError> {
        let mut results: HashMap<Uuid, Vec<AuditResult>> = HashMap::new();
        if ids.is_empty() {
            return Ok(results);
        }

        let rows = sqlx::query(
            r#"
            SELECT audit_id, student_login, validated, feedback, warnings
            FROM audit_priority.audit_results
            WHERE audit_id = ANY($1)
            ORDER BY student_login
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            results
                .entry(row.get("audit_id"))
                .or_default()
                .push(AuditResult {
                    student_login: row.get("student_login"),
                    validated: row.get("validated"),
                    feedback: row.get("feedback"),
                    warnings: row.get("warnings"),
                });
        }

        Ok(results)
    }

    async fn with_results(&self, rows: Vec<PgRow>) -> Result<Vec<Audit>, AuditError> {
        let mut audits = rows
            .iter()
            .map(audit_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = audits.iter().map(|audit| audit.id).collect();
        let mut results = self.load_results(&ids).await?;

        for audit in audits.iter_mut() {
            audit.results = results.remove(&audit.id).unwrap_or_default();
        }

        Ok(audits)
    }
}

fn audit_from_row(row: &PgRow) -> Result<Audit, AuditError> {
    let track: String = row.get("track");
    Ok(Audit {
        id: row.get("id"),
        promotion_id: row.get("promotion_id"),
        track: track.parse().map_err(|e: String| anyhow!(e))?,
        project: row.get("project"),
        group_id: row.get("group_id"),
        summary: row.get("summary"),
        warnings: row.get("warnings"),
        auditor: row.get("auditor"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        results: Vec::new(),
    })
}

async fn insert_results(
    tx: &mut Transaction<'_, Postgres>,
    audit_id: Uuid,
    results: &[StudentResultInput],
) -> Result<(), sqlx::Error> {
    for result in results {
        sqlx::query(
            r#"
            INSERT INTO audit_priority.audit_results
            (id, audit_id, student_login, validated, feedback, warnings)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(audit_id)
        .bind(&result.student_login)
        .bind(result.validated)
        .bind(&result.feedback)
        .bind(&result.warnings)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn map_insert_error(err: sqlx::Error, audit: &NewAudit) -> AuditError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some(AUDIT_UNIQUE_CONSTRAINT) {
            return AuditError::Conflict {
                promotion_id: audit.promotion_id.clone(),
                project: audit.project.clone(),
                group_id: audit.group_id.clone(),
            };
        }
    }
    AuditError::Database(err)
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit(&self, audit: &NewAudit) -> Result<Audit, AuditError> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO audit_priority.audits
            (id, promotion_id, track, project, group_id, summary, warnings, auditor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(&audit.promotion_id)
        .bind(audit.track.as_str())
        .bind(&audit.project)
        .bind(&audit.group_id)
        .bind(&audit.summary)
        .bind(&audit.warnings)
        .bind(&audit.auditor)
        .execute(&mut *tx)
        .await
        .map_err(|err| map_insert_error(err, audit))?;

        insert_results(&mut tx, id, &audit.results).await?;
        tx.commit().await?;

        self.audit(id).await?.ok_or(AuditError::NotFound(id))
    }

    async fn replace_audit(&self, id: Uuid, update: &AuditUpdate) -> Result<Audit, AuditError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE audit_priority.audits
            SET summary = $2, warnings = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.summary)
        .bind(&update.warnings)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AuditError::NotFound(id));
        }

        sqlx::query("DELETE FROM audit_priority.audit_results WHERE audit_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_results(&mut tx, id, &update.results).await?;
        tx.commit().await?;

        self.audit(id).await?.ok_or(AuditError::NotFound(id))
    }

    async fn audit(&self, id: Uuid) -> Result<Option<Audit>, AuditError> {
        let query = format!("SELECT {AUDIT_COLUMNS} FROM audit_priority.audits WHERE id = $1");
        let rows = sqlx::query(&query).bind(id).fetch_all(&self.pool).await?;
        Ok(self.with_results(rows).await?.into_iter().next())
    }

    async fn audits_for_promotion(
        &self,
        promotion_id: &str,
        track: Option<Track>,
    ) -> Result<Vec<Audit>, AuditError> {
        let mut query = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_priority.audits WHERE promotion_id = $1"
        );
        if track.is_some() {
            query.push_str(" AND track = $2");
        }
        query.push_str(" ORDER BY created_at");

        let mut rows = sqlx::query(&query).bind(promotion_id);
        if let Some(track) = track {
            rows = rows.bind(track.as_str());
        }

        let rows = rows.fetch_all(&self.pool).await?;
        self.with_results(rows).await
    }

    async fn audit_counts(&self, promotion_id: &str) -> Result<HashMap<String, usize>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT lower(r.student_login) AS login, COUNT(*) AS audits
            FROM audit_priority.audit_results r
            JOIN audit_priority.audits a ON a.id = r.audit_id
            WHERE a.promotion_id = $1
            GROUP BY lower(r.student_login)
            "#,
        )
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let count: i64 = row.get("audits");
                (row.get("login"), count.max(0) as usize)
            })
            .collect())
    }

    async fn recent_audits(&self, limit: i64) -> Result<Vec<Audit>, AuditError> {
        let query = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_priority.audits ORDER BY created_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        self.with_results(rows).await
    }

    async fn clear_audits(&self, promotion_id: Option<&str>) -> Result<u64, AuditError> {
        let result = match promotion_id {
            Some(promotion_id) => {
                sqlx::query("DELETE FROM audit_priority.audits WHERE promotion_id = $1")
                    .bind(promotion_id)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM audit_priority.audits")
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn recent_promotions(&self, limit: i64) -> Result<Vec<Promotion>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, start_date
            FROM audit_priority.promotions
            ORDER BY start_date DESC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Promotion {
                id: row.get("id"),
                name: row.get("name"),
                start_date: row.get("start_date"),
            })
            .collect())
    }
}

#[async_trait]
impl DropoutRegistry for PgStore {
    async fn dropouts(&self, promotion_id: &str) -> Result<HashSet<String>, AuditError> {
        let rows = sqlx::query(
            "SELECT lower(login) AS login FROM audit_priority.dropouts WHERE promotion_id = $1",
        )
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("login")).collect())
    }
}
