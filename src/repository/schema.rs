//! Table definitions for the reference data and the import queue.
//!
//! Both scripts are idempotent.

/// SQLite schema. Timestamps are RFC 3339 text in UTC.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS regulatory_records (
    registration_number TEXT PRIMARY KEY,
    product_name TEXT NOT NULL,
    active_component TEXT,
    holder_name TEXT
);

CREATE TABLE IF NOT EXISTS catalog_products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    barcode TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_catalog_products_barcode ON catalog_products(barcode);

CREATE TABLE IF NOT EXISTS import_rows (
    id TEXT PRIMARY KEY,
    raw_title TEXT NOT NULL DEFAULT '',
    raw_sku TEXT,
    raw_branch TEXT,
    raw_lab TEXT,
    raw_regulatory_code TEXT,
    raw_barcodes TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    target_product_id TEXT,
    confidence_score REAL,
    match_suggestion TEXT,
    processed_at TEXT,
    -- Lease held by a worker while the row is being matched
    claimed_by TEXT,
    claim_expires_at TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_import_rows_pending ON import_rows(status, created_at);
"#;

/// PostgreSQL schema.
#[cfg(feature = "postgres")]
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS regulatory_records (
    registration_number TEXT PRIMARY KEY,
    product_name TEXT NOT NULL,
    active_component TEXT,
    holder_name TEXT
);

CREATE TABLE IF NOT EXISTS catalog_products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    barcode TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_catalog_products_barcode ON catalog_products(barcode);

CREATE TABLE IF NOT EXISTS import_rows (
    id TEXT PRIMARY KEY,
    raw_title TEXT NOT NULL DEFAULT '',
    raw_sku TEXT,
    raw_branch TEXT,
    raw_lab TEXT,
    raw_regulatory_code TEXT,
    raw_barcodes TEXT,
    status TEXT NOT NULL DEFAULT 'PENDING',
    target_product_id TEXT,
    confidence_score DOUBLE PRECISION,
    match_suggestion JSONB,
    processed_at TIMESTAMPTZ,
    claimed_by TEXT,
    claim_expires_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT import_rows_status_check
        CHECK (status IN ('PENDING', 'MATCHED', 'NEEDS_REVIEW')),
    CONSTRAINT import_rows_target_only_when_matched
        CHECK (target_product_id IS NULL OR status = 'MATCHED')
);
CREATE INDEX IF NOT EXISTS idx_import_rows_pending ON import_rows(status, created_at);
"#;
