//! SQLite-backed [`Store`] implementation.
//!
//! A record is one `pull_requests` row plus its `file_changes` rows. An
//! upsert replaces both inside a single transaction so a record and its
//! files never disagree.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{ChangeStatus, EnrichmentResult, FileChangeRecord, PullRequestRecord};

use super::{Store, UpsertOutcome};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn files_for(&self, number: u64) -> Result<Vec<FileChangeRecord>> {
        let rows = sqlx::query(
            "SELECT pr_number, file_path, additions, deletions, status, previous_path \
             FROM file_changes WHERE pr_number = ? ORDER BY file_path",
        )
        .bind(number as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_file).collect()
    }
}

const PR_COLUMNS: &str = "number, title, body, author, created_at, merged_at, base_branch, \
    head_branch, url, additions, deletions, changed_files, why, business_impact, \
    technical_changes, enrichment_areas, confidence_score, enrichment_model";

fn ts_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("invalid timestamp: {}", ts))
}

fn row_to_file(row: &SqliteRow) -> Result<FileChangeRecord> {
    let status: String = row.try_get("status")?;
    Ok(FileChangeRecord {
        pr_number: row.try_get::<i64, _>("pr_number")? as u64,
        file_path: row.try_get("file_path")?,
        additions: row.try_get::<i64, _>("additions")? as u64,
        deletions: row.try_get::<i64, _>("deletions")? as u64,
        status: ChangeStatus::parse(&status),
        previous_path: row.try_get("previous_path")?,
    })
}

fn row_to_record(row: &SqliteRow, files: Vec<FileChangeRecord>) -> Result<PullRequestRecord> {
    let merged_at: Option<i64> = row.try_get("merged_at")?;
    let why: Option<String> = row.try_get("why")?;
    let model: Option<String> = row.try_get("enrichment_model")?;

    let enrichment = match (why, model) {
        (Some(why), Some(model)) => {
            let areas_json: Option<String> = row.try_get("enrichment_areas")?;
            let areas: Vec<String> = match areas_json {
                Some(json) => serde_json::from_str(&json)?,
                None => Vec::new(),
            };
            Some(EnrichmentResult {
                why,
                business_impact: row
                    .try_get::<Option<String>, _>("business_impact")?
                    .unwrap_or_default(),
                technical_changes: row
                    .try_get::<Option<String>, _>("technical_changes")?
                    .unwrap_or_default(),
                areas,
                confidence_score: row
                    .try_get::<Option<f64>, _>("confidence_score")?
                    .unwrap_or_default(),
                model,
            })
        }
        _ => None,
    };

    Ok(PullRequestRecord {
        number: row.try_get::<i64, _>("number")? as u64,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        author: row.try_get("author")?,
        created_at: ts_to_datetime(row.try_get("created_at")?)?,
        merged_at: merged_at.map(ts_to_datetime).transpose()?,
        base_branch: row.try_get("base_branch")?,
        head_branch: row.try_get("head_branch")?,
        url: row.try_get("url")?,
        additions: row.try_get::<i64, _>("additions")? as u64,
        deletions: row.try_get::<i64, _>("deletions")? as u64,
        changed_files: row.try_get::<i64, _>("changed_files")? as u64,
        enrichment,
        files,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_pr(&self, number: u64) -> Result<Option<PullRequestRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pull_requests WHERE number = ?",
            PR_COLUMNS
        ))
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let files = self.files_for(number).await?;
                Ok(Some(row_to_record(&row, files)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_pr(&self, record: &PullRequestRecord) -> Result<UpsertOutcome> {
        let number = record.number as i64;
        let mut tx = self.pool.begin().await?;

        let existed: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM pull_requests WHERE number = ?")
                .bind(number)
                .fetch_one(&mut *tx)
                .await?;

        let enrichment = record.enrichment.as_ref();
        let areas_json = enrichment
            .map(|e| serde_json::to_string(&e.areas))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO pull_requests (number, title, body, author, created_at, merged_at,
                                       base_branch, head_branch, url, additions, deletions,
                                       changed_files, why, business_impact, technical_changes,
                                       enrichment_areas, confidence_score, enrichment_model,
                                       synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(number) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                author = excluded.author,
                created_at = excluded.created_at,
                merged_at = excluded.merged_at,
                base_branch = excluded.base_branch,
                head_branch = excluded.head_branch,
                url = excluded.url,
                additions = excluded.additions,
                deletions = excluded.deletions,
                changed_files = excluded.changed_files,
                why = excluded.why,
                business_impact = excluded.business_impact,
                technical_changes = excluded.technical_changes,
                enrichment_areas = excluded.enrichment_areas,
                confidence_score = excluded.confidence_score,
                enrichment_model = excluded.enrichment_model,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(number)
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.author)
        .bind(record.created_at.timestamp())
        .bind(record.merged_at.map(|d| d.timestamp()))
        .bind(&record.base_branch)
        .bind(&record.head_branch)
        .bind(&record.url)
        .bind(record.additions as i64)
        .bind(record.deletions as i64)
        .bind(record.changed_files as i64)
        .bind(enrichment.map(|e| e.why.as_str()))
        .bind(enrichment.map(|e| e.business_impact.as_str()))
        .bind(enrichment.map(|e| e.technical_changes.as_str()))
        .bind(areas_json)
        .bind(enrichment.map(|e| e.confidence_score))
        .bind(enrichment.map(|e| e.model.as_str()))
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM file_changes WHERE pr_number = ?")
            .bind(number)
            .execute(&mut *tx)
            .await?;

        for file in &record.files {
            sqlx::query(
                "INSERT OR REPLACE INTO file_changes \
                 (pr_number, file_path, additions, deletions, status, previous_path) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(number)
            .bind(&file.file_path)
            .bind(file.additions as i64)
            .bind(file.deletions as i64)
            .bind(file.status.as_str())
            .bind(&file.previous_path)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    async fn list_prs(&self) -> Result<Vec<PullRequestRecord>> {
        let file_rows = sqlx::query(
            "SELECT pr_number, file_path, additions, deletions, status, previous_path \
             FROM file_changes ORDER BY pr_number, file_path",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut files_by_pr: HashMap<u64, Vec<FileChangeRecord>> = HashMap::new();
        for row in &file_rows {
            let file = row_to_file(row)?;
            files_by_pr.entry(file.pr_number).or_default().push(file);
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM pull_requests ORDER BY COALESCE(merged_at, created_at) DESC, number DESC",
            PR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let number = row.try_get::<i64, _>("number")? as u64;
                row_to_record(row, files_by_pr.remove(&number).unwrap_or_default())
            })
            .collect()
    }

    async fn list_unenriched(&self, limit: Option<usize>) -> Result<Vec<u64>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let numbers: Vec<i64> = sqlx::query_scalar(
            "SELECT number FROM pull_requests WHERE why IS NULL \
             ORDER BY COALESCE(merged_at, created_at) DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(numbers.into_iter().map(|n| n as u64).collect())
    }

    async fn count_prs(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pull_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
