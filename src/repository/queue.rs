//! The import queue: lease-based claiming and exactly-once completion.
//!
//! A claim stamps `claimed_by` and `claim_expires_at` on up to N pending rows.
//! Rows stay `PENDING` while leased; other claimers skip them until the lease
//! expires. Completion is guarded by the claim token, so a row can only leave
//! `PENDING` through the worker that holds it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Type, ValueRef};
use rusqlite::{params, Row};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{format_datetime, parse_datetime_opt, with_sqlite, RepositoryError, Result};
use crate::models::{ImportRow, MatchResult, RowStatus};

/// Rows reserved by one claim.
#[derive(Debug, Clone)]
pub struct ClaimedBatch {
    /// Token written to `claimed_by`; required to complete a row.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Rows in claim order.
    pub rows: Vec<ImportRow>,
}

impl ClaimedBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Row counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    /// Pending rows currently held under an unexpired lease.
    pub leased: u64,
    pub matched: u64,
    pub needs_review: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.matched + self.needs_review
    }

    pub(crate) fn add(&mut self, status: RowStatus, count: u64, leased: u64) {
        match status {
            RowStatus::Pending | RowStatus::Processing => {
                self.pending += count;
                self.leased += leased;
            }
            RowStatus::Matched => self.matched += count,
            RowStatus::NeedsReview => self.needs_review += count,
        }
    }
}

/// Shared work queue of import rows.
#[async_trait]
pub trait ImportQueue: Send + Sync {
    /// Reserve up to `limit` pending rows that nobody else holds.
    ///
    /// Never waits for rows held by another claimer; they are skipped.
    async fn claim_pending(
        &self,
        claimant: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<ClaimedBatch>;

    /// Write a terminal outcome onto a claimed row and drop its lease.
    ///
    /// Fails with [`RepositoryError::ClaimLost`] if `token` no longer holds the row.
    async fn complete(&self, token: &str, row_id: &str, result: &MatchResult) -> Result<()>;

    /// Fetch one row.
    async fn get(&self, row_id: &str) -> Result<Option<ImportRow>>;

    async fn status_counts(&self) -> Result<QueueCounts>;
}

/// New claim token, unique per claim even for the same claimant.
pub(crate) fn claim_token(claimant: &str) -> String {
    format!("{}/{}", claimant, Uuid::new_v4())
}

pub(crate) fn lease_expiry(now: DateTime<Utc>, lease: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_add_signed(lease))
        .ok_or_else(|| {
            RepositoryError::InvalidData(format!("lease of {:?} is out of range", lease))
        })
}

/// Values written by [`ImportQueue::complete`].
///
/// The target is dropped unless the row is `MATCHED`.
pub(crate) fn completion_fields(
    result: &MatchResult,
) -> Result<(RowStatus, Option<String>, serde_json::Value)> {
    let status = match result.status {
        RowStatus::Matched => RowStatus::Matched,
        _ => RowStatus::NeedsReview,
    };
    let target = match status {
        RowStatus::Matched => result.target_product_id.clone(),
        _ => None,
    };
    let evidence = serde_json::to_value(&result.evidence)?;
    Ok((status, target, evidence))
}

impl FromSql for RowStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        RowStatus::from_str(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown row status '{}'", s).into()))
    }
}

const ROW_COLUMNS: &str = "id, raw_title, raw_sku, raw_branch, raw_lab, raw_regulatory_code, \
     raw_barcodes, status, target_product_id, confidence_score, match_suggestion, processed_at";

fn row_to_import_row(row: &Row<'_>) -> rusqlite::Result<ImportRow> {
    let suggestion = row
        .get::<_, Option<String>>(10)?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    Ok(ImportRow {
        id: row.get(0)?,
        raw_title: row.get(1)?,
        raw_sku: row.get(2)?,
        raw_branch: row.get(3)?,
        raw_lab: row.get(4)?,
        raw_regulatory_code: row.get(5)?,
        raw_barcodes: row.get(6)?,
        status: row.get(7)?,
        target_product_id: row.get(8)?,
        confidence_score: row.get(9)?,
        match_suggestion: suggestion,
        processed_at: parse_datetime_opt(row.get(11)?),
    })
}

/// SQLite-backed import queue.
///
/// `BEGIN IMMEDIATE` serializes claimers for the length of the claim
/// statement only; leased rows are filtered out, so concurrent claimers
/// receive disjoint batches.
#[derive(Debug, Clone)]
pub struct SqliteImportQueue {
    db_path: PathBuf,
}

impl SqliteImportQueue {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ImportQueue for SqliteImportQueue {
    async fn claim_pending(
        &self,
        claimant: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<ClaimedBatch> {
        let token = claim_token(claimant);
        let now = Utc::now();
        let expires_at = lease_expiry(now, lease)?;
        if limit == 0 {
            return Ok(ClaimedBatch {
                token,
                expires_at,
                rows: Vec::new(),
            });
        }

        let claim_token = token.clone();
        let rows = with_sqlite(&self.db_path, move |conn| {
            conn.execute("BEGIN IMMEDIATE", [])?;

            let result: Result<Vec<ImportRow>> = (|| {
                let mut stmt = conn.prepare(&format!(
                    r#"
                    SELECT {ROW_COLUMNS} FROM import_rows
                    WHERE status = 'PENDING'
                      AND (claimed_by IS NULL OR claim_expires_at IS NULL OR claim_expires_at < ?1)
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?2
                    "#
                ))?;
                let rows = stmt
                    .query_map(params![format_datetime(now), limit as i64], row_to_import_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                for row in &rows {
                    conn.execute(
                        "UPDATE import_rows SET claimed_by = ?1, claim_expires_at = ?2 WHERE id = ?3",
                        params![claim_token, format_datetime(expires_at), row.id],
                    )?;
                }
                Ok(rows)
            })();

            if result.is_ok() {
                conn.execute("COMMIT", [])?;
            } else {
                let _ = conn.execute("ROLLBACK", []);
            }
            result
        })
        .await?;

        debug!("Claim {} reserved {} rows", token, rows.len());
        Ok(ClaimedBatch {
            token,
            expires_at,
            rows,
        })
    }

    async fn complete(&self, token: &str, row_id: &str, result: &MatchResult) -> Result<()> {
        let (status, target, evidence) = completion_fields(result)?;
        let evidence = serde_json::to_string(&evidence)?;
        let confidence = result.confidence;
        let token = token.to_string();
        let row_id = row_id.to_string();

        with_sqlite(&self.db_path, move |conn| {
            let updated = conn.execute(
                r#"
                UPDATE import_rows
                SET status = ?1,
                    target_product_id = ?2,
                    confidence_score = ?3,
                    match_suggestion = ?4,
                    processed_at = ?5,
                    claimed_by = NULL,
                    claim_expires_at = NULL
                WHERE id = ?6 AND claimed_by = ?7 AND status = 'PENDING'
                "#,
                params![
                    status.as_str(),
                    target,
                    confidence,
                    evidence,
                    format_datetime(Utc::now()),
                    row_id,
                    token
                ],
            )?;
            if updated == 0 {
                return Err(RepositoryError::ClaimLost { row_id });
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, row_id: &str) -> Result<Option<ImportRow>> {
        let row_id = row_id.to_string();
        with_sqlite(&self.db_path, move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ROW_COLUMNS} FROM import_rows WHERE id = ?"))?;
            let mut rows = stmt.query_map(params![row_id], row_to_import_row)?;
            let row = rows.next().transpose()?;
            Ok(row)
        })
        .await
    }

    async fn status_counts(&self) -> Result<QueueCounts> {
        with_sqlite(&self.db_path, |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT status,
                       COUNT(*),
                       SUM(CASE WHEN claimed_by IS NOT NULL AND claim_expires_at >= ?1 THEN 1 ELSE 0 END)
                FROM import_rows
                GROUP BY status
                "#,
            )?;
            let mut counts = QueueCounts::default();
            let rows = stmt.query_map(params![format_datetime(Utc::now())], |row| {
                Ok((
                    row.get::<_, RowStatus>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?;
            for row in rows {
                let (status, count, leased) = row?;
                counts.add(status, count, leased);
            }
            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogProduct, MatchResult, SkipReason};
    use crate::repository::{connect, init_sqlite_schema};

    const LEASE: Duration = Duration::from_secs(600);

    fn queue_with_rows(ids: &[&str]) -> (tempfile::TempDir, PathBuf, SqliteImportQueue) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erp.db");
        init_sqlite_schema(&path).unwrap();
        let conn = connect(&path).unwrap();
        for (i, id) in ids.iter().enumerate() {
            conn.execute(
                "INSERT INTO import_rows (id, raw_title, created_at) VALUES (?1, ?2, ?3)",
                params![id, format!("TITLE {}", id), format!("2025-01-01T00:00:{:02}.000Z", i)],
            )
            .unwrap();
        }
        let queue = SqliteImportQueue::new(&path);
        (dir, path, queue)
    }

    fn matched() -> MatchResult {
        MatchResult::barcode(
            CatalogProduct {
                id: "p-42".to_string(),
                name: "ACICLOVIR".to_string(),
                barcode: "7801234567890".to_string(),
            },
            vec!["7801234567890".to_string()],
            vec![],
        )
    }

    #[tokio::test]
    async fn test_claim_respects_limit_and_order() {
        let (_dir, _path, queue) = queue_with_rows(&["r-3", "r-1", "r-2"]);
        let batch = queue.claim_pending("w1", 2, LEASE).await.unwrap();
        let ids: Vec<_> = batch.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-3", "r-1"]);
        assert!(batch.token.starts_with("w1/"));
    }

    #[tokio::test]
    async fn test_leased_rows_are_skipped() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1", "r-2", "r-3"]);
        let first = queue.claim_pending("w1", 2, LEASE).await.unwrap();
        let second = queue.claim_pending("w2", 5, LEASE).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second.rows[0].id, "r-3");

        let third = queue.claim_pending("w3", 5, LEASE).await.unwrap();
        assert!(third.is_empty());

        let counts = queue.status_counts().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.leased, 3);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimable() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1"]);
        let first = queue.claim_pending("w1", 1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = queue.claim_pending("w2", 1, LEASE).await.unwrap();
        assert_eq!(second.len(), 1);

        // The first claimant lost the row
        let err = queue.complete(&first.token, "r-1", &matched()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ClaimLost { .. }));
        queue.complete(&second.token, "r-1", &matched()).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_writes_outcome_once() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1"]);
        let batch = queue.claim_pending("w1", 1, LEASE).await.unwrap();
        queue.complete(&batch.token, "r-1", &matched()).await.unwrap();

        let row = queue.get("r-1").await.unwrap().unwrap();
        assert_eq!(row.status, RowStatus::Matched);
        assert_eq!(row.target_product_id.as_deref(), Some("p-42"));
        assert_eq!(row.confidence_score, Some(1.0));
        assert!(row.processed_at.is_some());
        assert_eq!(row.match_suggestion.unwrap()["tier"], "BARCODE");

        let err = queue.complete(&batch.token, "r-1", &matched()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ClaimLost { .. }));

        assert!(queue.claim_pending("w2", 10, LEASE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_review_outcome_never_stores_target() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1"]);
        let batch = queue.claim_pending("w1", 1, LEASE).await.unwrap();
        let mut result = MatchResult::ai_skipped(SkipReason::NoCandidates, None);
        result.target_product_id = Some("p-1".to_string());
        queue.complete(&batch.token, "r-1", &result).await.unwrap();

        let row = queue.get("r-1").await.unwrap().unwrap();
        assert_eq!(row.status, RowStatus::NeedsReview);
        assert!(row.target_product_id.is_none());
        assert_eq!(row.confidence_score, Some(0.0));
    }

    #[tokio::test]
    async fn test_corrupt_evidence_is_an_error() {
        let (_dir, path, queue) = queue_with_rows(&["r-1"]);
        connect(&path)
            .unwrap()
            .execute(
                "UPDATE import_rows SET status = 'NEEDS_REVIEW', match_suggestion = '{not json' WHERE id = 'r-1'",
                [],
            )
            .unwrap();

        let err = queue.get("r-1").await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Sqlite(rusqlite::Error::FromSqlConversionFailure(10, _, _))
        ));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1", "r-2", "r-3"]);
        let batch = queue.claim_pending("w1", 2, LEASE).await.unwrap();
        queue.complete(&batch.token, "r-1", &matched()).await.unwrap();
        queue
            .complete(
                &batch.token,
                "r-2",
                &MatchResult::unresolved("classifier unavailable"),
            )
            .await
            .unwrap();

        let counts = queue.status_counts().await.unwrap();
        assert_eq!(
            counts,
            QueueCounts {
                pending: 1,
                leased: 0,
                matched: 1,
                needs_review: 1,
            }
        );
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_claims_nothing() {
        let (_dir, _path, queue) = queue_with_rows(&["r-1"]);
        assert!(queue.claim_pending("w1", 0, LEASE).await.unwrap().is_empty());
        assert_eq!(queue.status_counts().await.unwrap().leased, 0);
    }
}
