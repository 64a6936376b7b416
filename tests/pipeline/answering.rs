use std::sync::Arc;

use serde_json::json;

use policy_rag_service::domain::entities::policy_chunk::ChunkContext;
use policy_rag_service::domain::services::answer_composer::{
    ADVISORY_DISCLAIMER, NO_CONTEXT_ANSWER,
};
use policy_rag_service::domain::services::rag_service::RagServiceError;
use policy_rag_service::ports::policy_chunk_repository::PolicyChunkRepositoryPort;

use crate::helpers::{
    spawn_service, FakeCompletionsProvider, FakeEmbeddingsProvider, FakeObjectStorage,
    FakeUrlFetcher,
};

const DEDUCTIBLE_QUERY: &str = "What is the deductible?";

fn acme_auto_context() -> ChunkContext {
    ChunkContext {
        insurer: Some("Acme".to_string()),
        product: Some("Auto".to_string()),
        ..ChunkContext::default()
    }
}

#[tokio::test]
async fn querying_an_empty_store_states_the_absence_instead_of_fabricating() {
    let completions = Arc::new(FakeCompletionsProvider::answering(
        "The deductible is $500. Confidence: 0.99",
    ));

    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(4)),
        completions.clone(),
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let answer = harness
        .rag_service
        .answer_query(DEDUCTIBLE_QUERY, &json!({}), None)
        .await
        .unwrap();

    assert!(answer.content.contains(NO_CONTEXT_ANSWER));
    assert!(answer.content.contains(ADVISORY_DISCLAIMER));
    assert!(!answer.content.contains("$500"));
    assert!(answer.citations.is_empty());
    assert_eq!(answer.confidence, 0.0);
    // With an empty context the model was never consulted: nothing to fabricate from
    assert_eq!(completions.nb_calls(), 0);
}

#[tokio::test]
async fn answers_resolve_citations_to_the_retrieved_chunks() {
    let embeddings = Arc::new(
        FakeEmbeddingsProvider::new(4)
            .with_vector(DEDUCTIBLE_QUERY, vec![1.0, 0.0, 0.0, 0.0]),
    );
    let completions = Arc::new(FakeCompletionsProvider::answering(
        "The deductible is 500 EUR per claim [1], and glass breakage is covered in full [2]. \
         Also see [7]. Confidence: 0.85",
    ));

    let harness = spawn_service(
        embeddings,
        completions,
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    // The first chunk points in the query direction, the second is orthogonal:
    // the retrieval order is deterministic
    harness
        .chunk_repository
        .insert(
            &[
                "The deductible is 500 EUR per claim.".to_string(),
                "Glass breakage is covered in full.".to_string(),
            ],
            &[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
            &acme_auto_context(),
        )
        .await
        .unwrap();

    let answer = harness
        .rag_service
        .answer_query(DEDUCTIBLE_QUERY, &json!({"insurer": "Acme"}), Some(5))
        .await
        .unwrap();

    assert_eq!(answer.confidence, 0.85);
    assert!(!answer.content.to_lowercase().contains("confidence"));
    assert!(answer.content.contains(ADVISORY_DISCLAIMER));

    // [1] and [2] resolve, the out-of-range [7] is dropped
    assert_eq!(answer.citations.len(), 2);
    assert_eq!(
        answer.citations[0].content,
        "The deductible is 500 EUR per claim."
    );
    assert_eq!(answer.citations[0].provenance.insurer, "Acme");
    assert_eq!(
        answer.citations[1].content,
        "Glass breakage is covered in full."
    );
}

#[tokio::test]
async fn a_provider_failure_surfaces_instead_of_a_fabricated_answer() {
    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(4)),
        Arc::new(FakeCompletionsProvider::failing()),
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    harness
        .chunk_repository
        .insert(
            &["Some policy clause.".to_string()],
            &[vec![1.0, 0.0, 0.0, 0.0]],
            &acme_auto_context(),
        )
        .await
        .unwrap();

    let result = harness
        .rag_service
        .answer_query(DEDUCTIBLE_QUERY, &json!({}), None)
        .await;

    assert!(matches!(result, Err(RagServiceError::Composition(_))));
}

#[tokio::test]
async fn invalid_queries_and_filters_are_rejected() {
    let harness = spawn_service(
        Arc::new(FakeEmbeddingsProvider::new(4)),
        Arc::new(FakeCompletionsProvider::answering("unused")),
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    let blank_query = harness.rag_service.answer_query("   ", &json!({}), None).await;
    assert!(matches!(blank_query, Err(RagServiceError::Validation(_))));

    let zero_top_k = harness
        .rag_service
        .answer_query(DEDUCTIBLE_QUERY, &json!({}), Some(0))
        .await;
    assert!(matches!(zero_top_k, Err(RagServiceError::Validation(_))));

    let blank_filter = harness
        .rag_service
        .delete_chunks(&policy_rag_service::domain::entities::policy_chunk::ChunkFilters {
            insurer: Some("  ".to_string()),
            ..Default::default()
        })
        .await;
    assert!(matches!(blank_filter, Err(RagServiceError::Validation(_))));
}

#[tokio::test]
async fn request_context_filters_narrow_the_retrieval() {
    let embeddings = Arc::new(
        FakeEmbeddingsProvider::new(4)
            .with_vector(DEDUCTIBLE_QUERY, vec![1.0, 0.0, 0.0, 0.0]),
    );
    let completions = Arc::new(FakeCompletionsProvider::answering(
        "Covered as stated [1]. Confidence: 0.8",
    ));

    let harness = spawn_service(
        embeddings,
        completions,
        Arc::new(FakeObjectStorage::new()),
        Arc::new(FakeUrlFetcher::new()),
    )
    .await;

    harness
        .chunk_repository
        .insert(
            &["Acme auto deductible clause.".to_string()],
            &[vec![1.0, 0.0, 0.0, 0.0]],
            &acme_auto_context(),
        )
        .await
        .unwrap();
    harness
        .chunk_repository
        .insert(
            &["Zenith home deductible clause.".to_string()],
            &[vec![1.0, 0.0, 0.0, 0.0]],
            &ChunkContext {
                insurer: Some("Zenith".to_string()),
                product: Some("Home".to_string()),
                ..ChunkContext::default()
            },
        )
        .await
        .unwrap();

    let answer = harness
        .rag_service
        .answer_query(DEDUCTIBLE_QUERY, &json!({"insurer": "Zenith"}), None)
        .await
        .unwrap();

    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].provenance.insurer, "Zenith");
    assert_eq!(
        answer.citations[0].content,
        "Zenith home deductible clause."
    );
}
