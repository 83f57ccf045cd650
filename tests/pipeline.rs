//! End-to-end tests of the reconciliation pipeline against SQLite.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use common::{NewRow, RecordingClassifier, TestDb};
use rxreconcile::matching::MatchOrchestrator;
use rxreconcile::models::{
    ImportRow, MatchEvidence, MatchResult, MatchTier, RowStatus, SkipReason,
};
use rxreconcile::repository::{
    ClaimedBatch, ImportQueue, QueueCounts, RepositoryError, Result as RepoResult,
};
use rxreconcile::worker::{ImportWorker, WorkerError};

const AI_MATCH: &str = r#"{"match_found": true, "registration_number": "F-1234/05", "suggested_name": "ACICLOVIR 200 MG COMPRIMIDOS", "confidence": 0.93, "reason": "same molecule and dose"}"#;

async fn seeded() -> TestDb {
    let db = TestDb::new().await;
    db.add_record("F-1234/05", "ACICLOVIR 200 MG COMPRIMIDOS", Some("ACICLOVIR"));
    db.add_record("F-2200/11", "ZOVIRAX CREMA 5%", Some("ACICLOVIR"));
    db.add_record("F-9000/01", "KITADOL 500 MG", Some("PARACETAMOL"));
    db.add_product("p-42", "ACICLOVIR 200MG X25 COMP", "7801234567890");
    db.add_product("p-77", "KITADOL 500MG X16", "7800000000016");
    db
}

async fn row(db: &TestDb, id: &str) -> ImportRow {
    db.ctx.queue().get(id).await.unwrap().unwrap()
}

/// Run batches until the worker finds nothing; return rows processed.
async fn drain(worker: &ImportWorker<'_>, batch_size: usize) -> usize {
    let mut total = 0;
    loop {
        let summary = worker.process_import_batch(batch_size).await.unwrap();
        if summary.processed == 0 {
            return total;
        }
        total += summary.processed;
    }
}

#[tokio::test]
async fn registry_code_goes_to_review_with_full_confidence() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "ACICLOVIR 200",
        code: Some("F-1234/05"),
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let classifier = RecordingClassifier::answering(AI_MATCH);
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), Some(&classifier)),
        "w1",
    );

    let summary = worker.process_import_batch(50).await.unwrap();
    assert_eq!(summary.processed, 1);

    let r1 = row(&db, "r1").await;
    assert_eq!(r1.status, RowStatus::NeedsReview);
    assert_eq!(r1.confidence_score, Some(1.0));
    assert!(r1.target_product_id.is_none());
    assert!(r1.processed_at.is_some());
    let suggestion = r1.match_suggestion.unwrap();
    assert_eq!(suggestion["tier"], "REGISTRY");
    assert_eq!(suggestion["record"]["registration_number"], "F-1234/05");
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn first_matching_barcode_sets_target() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "ACICLOVIR 200",
        barcodes: Some("7801234567890,7809999999999"),
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), None),
        "w1",
    );
    worker.process_import_batch(50).await.unwrap();

    let r1 = row(&db, "r1").await;
    assert_eq!(r1.status, RowStatus::Matched);
    assert_eq!(r1.confidence_score, Some(1.0));
    assert_eq!(r1.target_product_id.as_deref(), Some("p-42"));
    assert_eq!(r1.match_suggestion.unwrap()["tier"], "BARCODE");
}

#[tokio::test]
async fn no_candidates_means_no_classifier_call() {
    let db = seeded().await;
    let registry = db.ctx.registry();
    let classifier = RecordingClassifier::answering(AI_MATCH);
    let orchestrator = MatchOrchestrator::new(registry.as_ref(), Some(&classifier));

    let input = rxreconcile::models::MatchInput {
        title: "AMOXICILINA 500".to_string(),
        ..Default::default()
    };
    let result = orchestrator.resolve(&input).await.unwrap();

    assert_eq!(result.tier, Some(MatchTier::AiSkipped));
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.status, RowStatus::NeedsReview);
    assert_eq!(
        result.evidence,
        MatchEvidence::AiSkipped {
            reason: SkipReason::NoCandidates,
            fragment: Some("AMOXICILINA".to_string()),
        }
    );
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn ai_match_is_never_auto_accepted() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "ACICLOVIR 200 MG X25 COMP LAB CHILE.",
        branch: Some("SUC-07"),
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let classifier = RecordingClassifier::answering(AI_MATCH);
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), Some(&classifier)),
        "w1",
    );
    worker.process_import_batch(50).await.unwrap();

    let r1 = row(&db, "r1").await;
    assert_eq!(r1.status, RowStatus::NeedsReview);
    assert_eq!(r1.confidence_score, Some(0.93));
    assert!(r1.target_product_id.is_none());

    let suggestion = r1.match_suggestion.unwrap();
    assert_eq!(suggestion["tier"], "AI_SUGGESTION");
    assert_eq!(suggestion["source"], "recording:test");
    assert_eq!(suggestion["response"]["registration_number"], "F-1234/05");
    assert_eq!(suggestion["candidates"].as_array().unwrap().len(), 2);

    // The request carries the dirty fields and every candidate
    let prompt = &classifier.prompts()[0];
    assert!(prompt.contains("ACICLOVIR 200 MG X25 COMP LAB CHILE."));
    assert!(prompt.contains("SUC-07"));
    assert!(prompt.contains("CHILE."));
    assert!(prompt.contains("F-2200/11"));
}

#[tokio::test]
async fn terminal_rows_are_never_reselected() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "KITADOL 500",
        barcodes: Some("7800000000016"),
        ..Default::default()
    });
    db.add_row(NewRow {
        id: "r2",
        title: "AMOXICILINA 500",
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), None),
        "w1",
    );

    assert_eq!(worker.process_import_batch(50).await.unwrap().processed, 2);
    let first = row(&db, "r1").await;

    let again = worker.process_import_batch(50).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.message.as_deref(), Some("nothing pending"));
    assert_eq!(row(&db, "r1").await.processed_at, first.processed_at);
}

#[tokio::test]
async fn registry_tier_wins_over_barcode() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "ACICLOVIR 200",
        code: Some("F-1234/05"),
        barcodes: Some("7801234567890"),
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), None),
        "w1",
    );
    worker.process_import_batch(50).await.unwrap();

    let r1 = row(&db, "r1").await;
    assert_eq!(r1.match_suggestion.unwrap()["tier"], "REGISTRY");
    assert_eq!(r1.status, RowStatus::NeedsReview);
    assert!(r1.target_product_id.is_none());
}

#[tokio::test]
async fn classifier_failure_only_affects_its_row() {
    let db = seeded().await;
    db.add_row(NewRow {
        id: "r1",
        title: "KITADOL 500 MG",
        ..Default::default()
    });
    db.add_row(NewRow {
        id: "r2",
        title: "ACICLOVIR 200 MG",
        ..Default::default()
    });
    db.add_row(NewRow {
        id: "r3",
        title: "ACICLOVIR 400",
        barcodes: Some("7801234567890"),
        ..Default::default()
    });

    let registry = db.ctx.registry();
    let queue = db.ctx.queue();
    let classifier = RecordingClassifier::answering(AI_MATCH).failing_on("KITADOL");
    let worker = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), Some(&classifier)),
        "w1",
    );

    let summary = worker.process_import_batch(50).await.unwrap();
    assert_eq!(summary.processed, 3);

    let r1 = row(&db, "r1").await;
    assert_eq!(r1.status, RowStatus::NeedsReview);
    assert!(r1.target_product_id.is_none());
    assert_eq!(r1.confidence_score, Some(0.0));
    assert_eq!(r1.match_suggestion.unwrap()["tier"], "UNRESOLVED");

    let r2 = row(&db, "r2").await;
    assert_eq!(r2.match_suggestion.unwrap()["tier"], "AI_SUGGESTION");
    let r3 = row(&db, "r3").await;
    assert_eq!(r3.status, RowStatus::Matched);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_share_a_row() {
    const ROWS: usize = 60;
    let db = seeded().await;
    db.add_unmatched_rows(ROWS);

    let registry_a = db.ctx.registry();
    let registry_b = db.ctx.registry();
    let queue_a = db.ctx.queue();
    let queue_b = db.ctx.queue();
    let worker_a = ImportWorker::new(
        queue_a.as_ref(),
        MatchOrchestrator::new(registry_a.as_ref(), None),
        "worker-a",
    );
    let worker_b = ImportWorker::new(
        queue_b.as_ref(),
        MatchOrchestrator::new(registry_b.as_ref(), None),
        "worker-b",
    );

    let (a, b) = tokio::join!(drain(&worker_a, 7), drain(&worker_b, 7));
    assert_eq!(a + b, ROWS);

    let counts = db.ctx.queue().status_counts().await.unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.needs_review as usize, ROWS);
}

/// Queue wrapper whose `complete` fails after a number of successful writes.
struct FailingQueue {
    inner: Box<dyn ImportQueue>,
    writes_before_failure: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl ImportQueue for FailingQueue {
    async fn claim_pending(
        &self,
        claimant: &str,
        limit: usize,
        lease: Duration,
    ) -> RepoResult<ClaimedBatch> {
        self.inner.claim_pending(claimant, limit, lease).await
    }

    async fn complete(&self, token: &str, row_id: &str, result: &MatchResult) -> RepoResult<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.writes_before_failure {
            return Err(RepositoryError::InvalidData("disk full".to_string()));
        }
        self.inner.complete(token, row_id, result).await
    }

    async fn get(&self, row_id: &str) -> RepoResult<Option<ImportRow>> {
        self.inner.get(row_id).await
    }

    async fn status_counts(&self) -> RepoResult<QueueCounts> {
        self.inner.status_counts().await
    }
}

#[tokio::test]
async fn storage_failure_aborts_batch_and_keeps_progress() {
    let db = seeded().await;
    db.add_unmatched_rows(4);

    let registry = db.ctx.registry();
    let failing = FailingQueue {
        inner: db.ctx.queue(),
        writes_before_failure: 2,
        writes: AtomicUsize::new(0),
    };
    let worker = ImportWorker::new(
        &failing,
        MatchOrchestrator::new(registry.as_ref(), None),
        "crashy",
    )
    .with_lease(Duration::from_millis(500));

    let err = worker.process_import_batch(10).await.unwrap_err();
    assert!(matches!(err, WorkerError::Repository(_)));

    let counts = db.ctx.queue().status_counts().await.unwrap();
    assert_eq!(counts.needs_review, 2);
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.leased, 2);

    // Abandoned rows are invisible until the lease runs out
    let queue = db.ctx.queue();
    let retry = ImportWorker::new(
        queue.as_ref(),
        MatchOrchestrator::new(registry.as_ref(), None),
        "retry",
    );
    assert_eq!(retry.process_import_batch(10).await.unwrap().processed, 0);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(retry.process_import_batch(10).await.unwrap().processed, 2);
    assert_eq!(db.ctx.queue().status_counts().await.unwrap().needs_review, 4);
}

#[tokio::test]
async fn lost_lease_is_fatal_to_the_holder() {
    let db = seeded().await;
    db.add_unmatched_rows(1);
    let queue = db.ctx.queue();

    let stale = queue
        .claim_pending("slow", 10, Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fresh = queue
        .claim_pending("fast", 10, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(fresh.len(), 1);

    let result = MatchResult::unresolved("test");
    let err = queue
        .complete(&stale.token, &stale.rows[0].id, &result)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ClaimLost { .. }));

    queue
        .complete(&fresh.token, &fresh.rows[0].id, &result)
        .await
        .unwrap();
}
