//! PostgreSQL backend.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` inside a single statement, so a
//! concurrent claimer never blocks on, or receives, a row another claimer is
//! taking. The lease columns keep the reservation after that statement
//! commits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, Row};
use tracing::debug;

use super::queue::{claim_token, completion_fields, lease_expiry};
use super::util::escape_like;
use super::{ClaimedBatch, ImportQueue, QueueCounts, RegistryLookup, RepositoryError, Result};
use crate::models::{CatalogProduct, ImportRow, MatchResult, RegulatoryRecord, RowStatus};

const ROW_COLUMNS: &str = "id, raw_title, raw_sku, raw_branch, raw_lab, raw_regulatory_code, \
     raw_barcodes, status, target_product_id, confidence_score, match_suggestion, processed_at";

fn parse_status(value: &str) -> Result<RowStatus> {
    RowStatus::from_str(value)
        .ok_or_else(|| RepositoryError::InvalidData(format!("unknown row status '{}'", value)))
}

fn row_to_import_row(row: &Row) -> Result<ImportRow> {
    let status: String = row.try_get("status")?;
    Ok(ImportRow {
        id: row.try_get("id")?,
        raw_title: row.try_get("raw_title")?,
        raw_sku: row.try_get("raw_sku")?,
        raw_branch: row.try_get("raw_branch")?,
        raw_lab: row.try_get("raw_lab")?,
        raw_regulatory_code: row.try_get("raw_regulatory_code")?,
        raw_barcodes: row.try_get("raw_barcodes")?,
        status: parse_status(&status)?,
        target_product_id: row.try_get("target_product_id")?,
        confidence_score: row.try_get("confidence_score")?,
        match_suggestion: row.try_get("match_suggestion")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn row_to_record(row: &Row) -> Result<RegulatoryRecord> {
    Ok(RegulatoryRecord {
        registration_number: row.try_get("registration_number")?,
        product_name: row.try_get("product_name")?,
        active_component: row.try_get("active_component")?,
        holder_name: row.try_get("holder_name")?,
    })
}

/// PostgreSQL-backed registry lookup.
#[derive(Clone)]
pub struct PgRegistry {
    client: Arc<Client>,
}

impl PgRegistry {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistryLookup for PgRegistry {
    async fn find_by_registration(&self, code: &str) -> Result<Option<RegulatoryRecord>> {
        let row = self
            .client
            .query_opt(
                "SELECT registration_number, product_name, active_component, holder_name \
                 FROM regulatory_records WHERE registration_number = $1",
                &[&code],
            )
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_by_barcodes(&self, barcodes: &[String]) -> Result<Vec<CatalogProduct>> {
        if barcodes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(
                "SELECT id, name, barcode FROM catalog_products WHERE barcode = ANY($1) ORDER BY id",
                &[&barcodes],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(CatalogProduct {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    barcode: row.try_get("barcode")?,
                })
            })
            .collect()
    }

    async fn search_registry(
        &self,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<RegulatoryRecord>> {
        if fragment.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(fragment.trim()));
        let rows = self
            .client
            .query(
                r#"
                SELECT registration_number, product_name, active_component, holder_name
                FROM regulatory_records
                WHERE product_name ILIKE $1 ESCAPE '\'
                   OR active_component ILIKE $1 ESCAPE '\'
                ORDER BY registration_number
                LIMIT $2
                "#,
                &[&pattern, &(limit as i64)],
            )
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}

/// PostgreSQL-backed import queue.
#[derive(Clone)]
pub struct PgImportQueue {
    client: Arc<Client>,
}

impl PgImportQueue {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImportQueue for PgImportQueue {
    async fn claim_pending(
        &self,
        claimant: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<ClaimedBatch> {
        let token = claim_token(claimant);
        // Checked here so the SQL interval cannot overflow
        let expires_at = lease_expiry(Utc::now(), lease)?;
        if limit == 0 {
            return Ok(ClaimedBatch {
                token,
                expires_at,
                rows: Vec::new(),
            });
        }

        let rows = self
            .client
            .query(
                r#"
                WITH claimable AS (
                    SELECT id FROM import_rows
                    WHERE status = 'PENDING'
                      AND (claimed_by IS NULL OR claim_expires_at IS NULL OR claim_expires_at < now())
                    ORDER BY created_at, id
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                UPDATE import_rows r
                SET claimed_by = $1,
                    claim_expires_at = now() + make_interval(secs => $3)
                FROM claimable
                WHERE r.id = claimable.id
                RETURNING r.id, r.raw_title, r.raw_sku, r.raw_branch, r.raw_lab,
                          r.raw_regulatory_code, r.raw_barcodes, r.status, r.target_product_id,
                          r.confidence_score, r.match_suggestion, r.processed_at,
                          r.created_at, r.claim_expires_at
                "#,
                &[&token, &(limit as i64), &lease.as_secs_f64()],
            )
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        let mut expires_at = expires_at;
        for row in &rows {
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            expires_at = row.try_get("claim_expires_at")?;
            claimed.push((created_at, row_to_import_row(row)?));
        }
        // RETURNING order is unspecified
        claimed.sort_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| a.id.cmp(&b.id)));

        debug!("Claim {} reserved {} rows", token, claimed.len());
        Ok(ClaimedBatch {
            token,
            expires_at,
            rows: claimed.into_iter().map(|(_, row)| row).collect(),
        })
    }

    async fn complete(&self, token: &str, row_id: &str, result: &MatchResult) -> Result<()> {
        let (status, target, evidence) = completion_fields(result)?;
        let updated = self
            .client
            .execute(
                r#"
                UPDATE import_rows
                SET status = $1,
                    target_product_id = $2,
                    confidence_score = $3,
                    match_suggestion = $4,
                    processed_at = now(),
                    claimed_by = NULL,
                    claim_expires_at = NULL
                WHERE id = $5 AND claimed_by = $6 AND status = 'PENDING'
                "#,
                &[
                    &status.as_str(),
                    &target,
                    &result.confidence,
                    &evidence,
                    &row_id,
                    &token,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(RepositoryError::ClaimLost {
                row_id: row_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, row_id: &str) -> Result<Option<ImportRow>> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {ROW_COLUMNS} FROM import_rows WHERE id = $1"),
                &[&row_id],
            )
            .await?;
        row.as_ref().map(row_to_import_row).transpose()
    }

    async fn status_counts(&self) -> Result<QueueCounts> {
        let rows = self
            .client
            .query(
                r#"
                SELECT status,
                       COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE claimed_by IS NOT NULL AND claim_expires_at >= now()) AS leased
                FROM import_rows
                GROUP BY status
                "#,
                &[],
            )
            .await?;
        let mut counts = QueueCounts::default();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let leased: i64 = row.try_get("leased")?;
            counts.add(parse_status(&status)?, total as u64, leased as u64);
        }
        Ok(counts)
    }
}
