//! Read-only lookups against the regulatory registry and the product catalog.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Row};

use super::util::escape_like;
use super::{with_sqlite, Result, FOLD_FN};
use crate::models::{CatalogProduct, RegulatoryRecord};

/// Cap on free-text search results.
pub const FREE_TEXT_LIMIT: usize = 5;

/// Reference data needed by the matching tiers. Implementations never write.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Exact lookup by registration number.
    async fn find_by_registration(&self, code: &str) -> Result<Option<RegulatoryRecord>>;

    /// Catalog products whose barcode is one of `barcodes`, ordered by id.
    async fn find_by_barcodes(&self, barcodes: &[String]) -> Result<Vec<CatalogProduct>>;

    /// Records whose product name or active component contains `fragment`,
    /// case-insensitive, ordered by registration number.
    async fn search_registry(&self, fragment: &str, limit: usize)
        -> Result<Vec<RegulatoryRecord>>;
}

const RECORD_COLUMNS: &str =
    "registration_number, product_name, active_component, holder_name";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RegulatoryRecord> {
    Ok(RegulatoryRecord {
        registration_number: row.get(0)?,
        product_name: row.get(1)?,
        active_component: row.get(2)?,
        holder_name: row.get(3)?,
    })
}

/// SQLite-backed registry lookup.
#[derive(Debug, Clone)]
pub struct SqliteRegistry {
    db_path: PathBuf,
}

impl SqliteRegistry {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl RegistryLookup for SqliteRegistry {
    async fn find_by_registration(&self, code: &str) -> Result<Option<RegulatoryRecord>> {
        let code = code.to_string();
        with_sqlite(&self.db_path, move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM regulatory_records WHERE registration_number = ?"
            ))?;
            let mut rows = stmt.query_map(params![code], row_to_record)?;
            let record = rows.next().transpose()?;
            Ok(record)
        })
        .await
    }

    async fn find_by_barcodes(&self, barcodes: &[String]) -> Result<Vec<CatalogProduct>> {
        if barcodes.is_empty() {
            return Ok(Vec::new());
        }
        let barcodes = barcodes.to_vec();
        with_sqlite(&self.db_path, move |conn| {
            let placeholders = vec!["?"; barcodes.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, barcode FROM catalog_products WHERE barcode IN ({placeholders}) ORDER BY id"
            ))?;
            let products = stmt
                .query_map(params_from_iter(barcodes.iter()), |row| {
                    Ok(CatalogProduct {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        barcode: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(products)
        })
        .await
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
        with_sqlite(&self.db_path, move |conn| {
            let mut stmt = conn.prepare(&format!(
                r#"
                SELECT {RECORD_COLUMNS} FROM regulatory_records
                WHERE {FOLD_FN}(product_name) LIKE {FOLD_FN}(?1) ESCAPE '\'
                   OR {FOLD_FN}(active_component) LIKE {FOLD_FN}(?1) ESCAPE '\'
                ORDER BY registration_number
                LIMIT ?2
                "#
            ))?;
            let records = stmt
                .query_map(params![pattern, limit as i64], row_to_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }
}
