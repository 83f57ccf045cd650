//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tempfile::TempDir;

use rxreconcile::llm::{Classifier, LlmError};
use rxreconcile::repository::DbContext;

/// A file-backed SQLite database with the schema applied.
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
    pub ctx: DbContext,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.db");
        let url = format!("sqlite:{}", path.display());
        let ctx = DbContext::connect(&url, false).await.unwrap();
        ctx.init_schema().await.unwrap();
        Self {
            _dir: dir,
            path,
            ctx,
        }
    }

    fn conn(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }

    pub fn add_record(&self, number: &str, name: &str, component: Option<&str>) {
        self.conn()
            .execute(
                "INSERT INTO regulatory_records (registration_number, product_name, active_component, holder_name) \
                 VALUES (?1, ?2, ?3, 'LABORATORIO CHILE S.A.')",
                params![number, name, component],
            )
            .unwrap();
    }

    pub fn add_product(&self, id: &str, name: &str, barcode: &str) {
        self.conn()
            .execute(
                "INSERT INTO catalog_products (id, name, barcode) VALUES (?1, ?2, ?3)",
                params![id, name, barcode],
            )
            .unwrap();
    }

    pub fn add_row(&self, row: NewRow<'_>) {
        self.conn()
            .execute(
                "INSERT INTO import_rows (id, raw_title, raw_lab, raw_branch, raw_regulatory_code, raw_barcodes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![row.id, row.title, row.lab, row.branch, row.code, row.barcodes],
            )
            .unwrap();
    }

    /// Insert `n` pending rows whose titles match nothing.
    pub fn add_unmatched_rows(&self, n: usize) {
        let conn = self.conn();
        for i in 0..n {
            conn.execute(
                "INSERT INTO import_rows (id, raw_title) VALUES (?1, ?2)",
                params![format!("row-{:03}", i), format!("ZZUNKNOWN{} 10 MG", i)],
            )
            .unwrap();
        }
    }
}

#[derive(Default)]
pub struct NewRow<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub lab: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub code: Option<&'a str>,
    pub barcodes: Option<&'a str>,
}

/// Classifier double that records prompts and replays a scripted answer.
///
/// Prompts mentioning `fail_on` get a connection error instead.
pub struct RecordingClassifier {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    answer: String,
    fail_on: Option<String>,
}

impl RecordingClassifier {
    pub fn answering(answer: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            answer: answer.to_string(),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.fail_on {
            Some(ref marker) if prompt.contains(marker.as_str()) => {
                Err(LlmError::Connection("connection reset by peer".to_string()))
            }
            _ => Ok(self.answer.clone()),
        }
    }

    fn source(&self) -> String {
        "recording:test".to_string()
    }
}
