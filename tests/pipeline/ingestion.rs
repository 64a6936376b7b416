use std::sync::Arc;

use fake::faker::lorem::en::Sentences;
use fake::Fake;

use policy_rag_service::domain::entities::ingestion_batch::DocumentSource;
use policy_rag_service::domain::entities::ingestion_job::IngestionJobStatus;
use policy_rag_service::domain::entities::policy_chunk::{ChunkContext, ChunkFilters};
use policy_rag_service::domain::services::rag_service::RagServiceError;
use policy_rag_service::ports::object_storage::ObjectStoragePort;
use policy_rag_service::ports::policy_chunk_repository::PolicyChunkRepositoryPort;

use crate::helpers::{
    spawn_service, wait_until_terminal, FakeCompletionsProvider, FakeEmbeddingsProvider,
    FakeObjectStorage, FakeUrlFetcher,
};

fn acme_auto_context() -> ChunkContext {
    ChunkContext {
        insurer: Some("Acme".to_string()),
        product: Some("Auto".to_string()),
        ..ChunkContext::default()
    }
}

/// A plaintext policy of roughly 2000 characters
fn auto_policy_document() -> String {
    (0..25)
        .map(|i| {
            format!(
                "Clause {} of the auto policy describes the covered perils in plain language.",
                i
            )
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[tokio::test]
async fn ingesting_an_uploaded_document_stores_tagged_chunks() {
    let object_storage = Arc::new(FakeObjectStorage::new());
    object_storage
        .put(
            "requests/ingest/1_policy.txt",
            auto_policy_document().as_bytes(),
            "text/plain",
        )
        .await
        .unwrap();

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        object_storage,
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let job_id = harness
        .rag_service
        .ingest(
            vec!["requests/ingest/1_policy.txt".to_string()],
            DocumentSource::Upload,
            acme_auto_context(),
        )
        .await
        .expect("Failed to submit the batch");

    let job = wait_until_terminal(&harness, job_id).await;
    assert_eq!(job.status, IngestionJobStatus::Completed);
    assert_eq!(job.processed_items, 1);
    assert_eq!(job.progress(), 100.0);
    assert!(job.errors.is_empty());

    let stats = harness.rag_service.chunk_stats().await.unwrap();
    assert!(stats.total >= 1);
    assert_eq!(stats.by_insurer.get("Acme"), Some(&stats.total));

    // Every stored chunk respects the token budget and carries the shared context
    let stored = harness
        .chunk_repository
        .search(&[0.0; 8], &ChunkFilters::default(), 100)
        .await
        .unwrap();
    assert_eq!(stored.len() as u64, stats.total);
    for (chunk, _) in stored {
        assert!(chunk.token_estimate <= 800 + 120);
        assert_eq!(chunk.insurer, "Acme");
        assert_eq!(chunk.product, "Auto");
        assert!(!chunk.content.trim().is_empty());
    }
}

#[tokio::test]
async fn a_failing_url_does_not_abort_the_rest_of_the_batch() {
    let policy: Vec<String> = Sentences(10..15).fake();
    let policy = policy.join(" ");

    let url_fetcher = Arc::new(
        FakeUrlFetcher::new()
            .serving("https://insurers.example/acme/auto.txt", &policy)
            .serving("https://insurers.example/acme/home.txt", &policy),
    );

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        Arc::new(FakeObjectStorage::new()),
        url_fetcher,
    )
    .await;

    let job_id = harness
        .rag_service
        .ingest(
            vec![
                "https://insurers.example/acme/auto.txt".to_string(),
                "https://insurers.example/acme/missing.txt".to_string(),
                "https://insurers.example/acme/home.txt".to_string(),
            ],
            DocumentSource::Url,
            acme_auto_context(),
        )
        .await
        .unwrap();

    let job = wait_until_terminal(&harness, job_id).await;
    assert_eq!(job.status, IngestionJobStatus::CompletedWithErrors);
    assert_eq!(job.processed_items, 3);
    assert_eq!(job.progress(), 100.0);
    assert_eq!(job.errors.len(), 1);
    assert!(
        job.errors[0].contains("https://insurers.example/acme/missing.txt"),
        "the error should name the failed URL: {}",
        job.errors[0]
    );

    // The two reachable documents still made it to the store
    let stats = harness.rag_service.chunk_stats().await.unwrap();
    assert!(stats.total >= 2);
}

#[tokio::test]
async fn an_embedding_failure_is_fatal_for_its_item_only() {
    let object_storage = Arc::new(FakeObjectStorage::new());
    object_storage
        .put("docs/clean.txt", auto_policy_document().as_bytes(), "text/plain")
        .await
        .unwrap();
    object_storage
        .put(
            "docs/poisoned.txt",
            b"This clause mentions UNEMBEDDABLE terms on purpose.",
            "text/plain",
        )
        .await
        .unwrap();

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8).failing_on("UNEMBEDDABLE")),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        object_storage,
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let job_id = harness
        .rag_service
        .ingest(
            vec!["docs/clean.txt".to_string(), "docs/poisoned.txt".to_string()],
            DocumentSource::Upload,
            acme_auto_context(),
        )
        .await
        .unwrap();

    let job = wait_until_terminal(&harness, job_id).await;
    assert_eq!(job.status, IngestionJobStatus::CompletedWithErrors);
    assert_eq!(job.processed_items, 2);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("docs/poisoned.txt"));

    // Only the clean document was stored
    let stats = harness.rag_service.chunk_stats().await.unwrap();
    assert!(stats.total >= 1);
}

#[tokio::test]
async fn polling_a_settled_job_returns_identical_snapshots() {
    let object_storage = Arc::new(FakeObjectStorage::new());
    object_storage
        .put("docs/policy.txt", b"A single short policy sentence.", "text/plain")
        .await
        .unwrap();

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        object_storage,
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let job_id = harness
        .rag_service
        .ingest(
            vec!["docs/policy.txt".to_string()],
            DocumentSource::Upload,
            ChunkContext::default(),
        )
        .await
        .unwrap();

    let settled = wait_until_terminal(&harness, job_id).await;

    let first = harness.rag_service.get_ingestion_status(job_id).await.unwrap();
    let second = harness.rag_service.get_ingestion_status(job_id).await.unwrap();
    assert_eq!(first, Some(settled));
    assert_eq!(first, second);

    // An unknown job is a None, not an error
    let unknown = harness
        .rag_service
        .get_ingestion_status(uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn an_empty_or_blank_batch_is_rejected() {
    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let empty = harness
        .rag_service
        .ingest(Vec::new(), DocumentSource::Upload, ChunkContext::default())
        .await;
    assert!(matches!(empty, Err(RagServiceError::Validation(_))));

    let blank = harness
        .rag_service
        .ingest(
            vec!["  ".to_string()],
            DocumentSource::Upload,
            ChunkContext::default(),
        )
        .await;
    assert!(matches!(blank, Err(RagServiceError::Validation(_))));
}

#[tokio::test]
async fn cancellation_marks_the_job_failed_instead_of_hanging() {
    let object_storage = Arc::new(FakeObjectStorage::new());
    object_storage
        .put("docs/policy.txt", b"A single short policy sentence.", "text/plain")
        .await
        .unwrap();

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(8)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        object_storage,
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    // Cancelled before the batch is even submitted: the worker must still
    // settle the job instead of leaving it pending forever
    harness.cancellation.cancel();

    let job_id = harness
        .rag_service
        .ingest(
            vec!["docs/policy.txt".to_string()],
            DocumentSource::Upload,
            ChunkContext::default(),
        )
        .await
        .unwrap();

    let job = wait_until_terminal(&harness, job_id).await;
    assert_eq!(job.status, IngestionJobStatus::Failed);
    assert!(job.errors[0].contains("cancelled"));
}
