//! Batch worker over the import queue.
//!
//! One invocation claims up to `batch_size` rows, resolves them one at a
//! time and writes each outcome as soon as it is known. Concurrent
//! invocations receive disjoint rows.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::matching::MatchOrchestrator;
use crate::repository::{ImportQueue, RepositoryError};

/// Default rows per invocation.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default claim lease; rows abandoned by a failed run become claimable after this.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(90 * 60);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage failure: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Rows that reached a terminal status in this invocation.
    pub processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchSummary {
    fn nothing_pending() -> Self {
        Self {
            processed: 0,
            message: Some("nothing pending".to_string()),
        }
    }
}

pub struct ImportWorker<'a> {
    queue: &'a dyn ImportQueue,
    orchestrator: MatchOrchestrator<'a>,
    worker_id: String,
    lease: Duration,
}

impl<'a> ImportWorker<'a> {
    pub fn new(
        queue: &'a dyn ImportQueue,
        orchestrator: MatchOrchestrator<'a>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            worker_id: worker_id.into(),
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and resolve up to `batch_size` pending rows.
    ///
    /// Only storage failures are returned as errors. Rows completed before
    /// the failure keep their outcome; the rest stay leased until the lease
    /// runs out.
    pub async fn process_import_batch(
        &self,
        batch_size: usize,
    ) -> Result<BatchSummary, WorkerError> {
        let batch = self
            .queue
            .claim_pending(&self.worker_id, batch_size, self.lease)
            .await
            .inspect_err(|e| error!("Claim failed for {}: {}", self.worker_id, e))?;

        if batch.is_empty() {
            info!("Nothing pending for {}", self.worker_id);
            return Ok(BatchSummary::nothing_pending());
        }

        info!(
            "Claimed {} row(s) as {} (lease until {})",
            batch.len(),
            batch.token,
            batch.expires_at
        );

        let mut processed = 0;
        for row in &batch.rows {
            let input = row.to_match_input();

            let result = self
                .orchestrator
                .resolve(&input)
                .await
                .inspect_err(|e| error!("Matching row {} failed: {}", row.id, e))?;

            self.queue
                .complete(&batch.token, &row.id, &result)
                .await
                .inspect_err(|e| error!("Writing outcome of row {} failed: {}", row.id, e))?;

            debug!(
                "Row {} -> {} ({}, confidence {:.2})",
                row.id,
                result.status.as_str(),
                result.tier.map(|t| t.as_str()).unwrap_or("UNRESOLVED"),
                result.confidence
            );
            processed += 1;
        }

        info!(
            "Batch {} finished: {} of {} row(s) processed",
            batch.token,
            processed,
            batch.len()
        );
        Ok(BatchSummary {
            processed,
            message: None,
        })
    }
}
