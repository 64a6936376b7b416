use std::sync::Arc;

use tokio::time::{sleep, Duration};

use policy_rag_service::domain::entities::policy_chunk::{ChunkContext, ChunkFilters};
use policy_rag_service::domain::services::retriever::Retriever;
use policy_rag_service::ports::policy_chunk_repository::{
    PolicyChunkRepositoryError, PolicyChunkRepositoryPort,
};
use policy_rag_service::repositories::policy_chunk_memory_repository::PolicyChunkInMemoryRepository;

use crate::helpers::FakeEmbeddingsProvider;

fn context_for(insurer: &str, product: &str) -> ChunkContext {
    ChunkContext {
        insurer: Some(insurer.to_string()),
        product: Some(product.to_string()),
        ..ChunkContext::default()
    }
}

#[tokio::test]
async fn searching_an_empty_store_returns_an_empty_list() {
    let repository = PolicyChunkInMemoryRepository::new();

    let hits = repository
        .search(&[1.0, 0.0, 0.0, 0.0], &ChunkFilters::default(), 10)
        .await
        .unwrap();

    assert!(hits.is_empty());
}

#[tokio::test]
async fn the_retriever_ranks_by_similarity_with_scores_in_the_unit_interval() {
    let repository = Arc::new(PolicyChunkInMemoryRepository::new());
    repository
        .insert(
            &[
                "The deductible for collision damage is fixed per claim.".to_string(),
                "Trip cancellation must be notified within ten days.".to_string(),
                "Collision damage above the deductible is reimbursed.".to_string(),
            ],
            &[
                vec![1.0, 0.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0, 0.0],
                vec![0.9, 0.1, 0.0, 0.0],
            ],
            &context_for("Acme", "Auto"),
        )
        .await
        .unwrap();

    let embeddings = Arc::new(
        FakeEmbeddingsProvider::new(4)
            .with_vector("What is the deductible?", vec![1.0, 0.0, 0.0, 0.0]),
    );
    let retriever = Retriever::new(embeddings, repository);

    let results = retriever
        .retrieve("What is the deductible?", &ChunkFilters::default(), 3)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].content.starts_with("The deductible"));
    assert!(results[1].content.starts_with("Collision damage"));
    assert!(results[2].content.starts_with("Trip cancellation"));

    for result in &results {
        assert!((0.0..=1.0).contains(&result.score));
    }
    assert!(results[0].score > results[1].score);
    assert!(results[1].score > results[2].score);
    // An identical direction means a perfect score
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn search_honors_filters_and_top_k() {
    let repository = PolicyChunkInMemoryRepository::new();
    repository
        .insert(
            &["Acme auto clause.".to_string(), "Acme second auto clause.".to_string()],
            &[vec![1.0, 0.0], vec![0.8, 0.2]],
            &context_for("Acme", "Auto"),
        )
        .await
        .unwrap();
    repository
        .insert(
            &["Zenith home clause.".to_string()],
            &[vec![1.0, 0.0]],
            &context_for("Zenith", "Home"),
        )
        .await
        .unwrap();

    let acme_only = ChunkFilters {
        insurer: Some("Acme".to_string()),
        ..ChunkFilters::default()
    };

    let hits = repository.search(&[1.0, 0.0], &acme_only, 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.insurer, "Acme");

    let all_acme = repository.search(&[1.0, 0.0], &acme_only, 10).await.unwrap();
    assert_eq!(all_acme.len(), 2);
    assert!(all_acme.iter().all(|(chunk, _)| chunk.insurer == "Acme"));

    let nobody = ChunkFilters {
        insurer: Some("Nonexistent".to_string()),
        ..ChunkFilters::default()
    };
    assert!(repository.search(&[1.0, 0.0], &nobody, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn equal_distances_are_broken_by_recency() {
    let repository = PolicyChunkInMemoryRepository::new();

    repository
        .insert(
            &["The older clause.".to_string()],
            &[vec![1.0, 0.0]],
            &context_for("Acme", "Auto"),
        )
        .await
        .unwrap();
    // Guarantees distinct creation timestamps
    sleep(Duration::from_millis(5)).await;
    repository
        .insert(
            &["The newer clause.".to_string()],
            &[vec![1.0, 0.0]],
            &context_for("Acme", "Auto"),
        )
        .await
        .unwrap();

    let hits = repository
        .search(&[1.0, 0.0], &ChunkFilters::default(), 2)
        .await
        .unwrap();

    assert_eq!(hits[0].0.content, "The newer clause.");
    assert_eq!(hits[1].0.content, "The older clause.");
}

#[tokio::test]
async fn a_mismatched_insert_batch_stores_nothing() {
    let repository = PolicyChunkInMemoryRepository::new();

    let result = repository
        .insert(
            &["One chunk.".to_string(), "Another chunk.".to_string()],
            &[vec![1.0, 0.0]],
            &context_for("Acme", "Auto"),
        )
        .await;

    assert!(matches!(
        result,
        Err(PolicyChunkRepositoryError::Validation(_))
    ));
    assert_eq!(repository.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn deleting_by_filters_removes_only_the_matching_chunks() {
    let repository = PolicyChunkInMemoryRepository::new();
    repository
        .insert(
            &["Acme auto clause.".to_string(), "Acme second clause.".to_string()],
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
            &context_for("Acme", "Auto"),
        )
        .await
        .unwrap();
    repository
        .insert(
            &["Zenith home clause.".to_string()],
            &[vec![1.0, 0.0]],
            &context_for("Zenith", "Home"),
        )
        .await
        .unwrap();

    let removed = repository
        .delete(&ChunkFilters {
            insurer: Some("Acme".to_string()),
            ..ChunkFilters::default()
        })
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let stats = repository.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_insurer.get("Zenith"), Some(&1));
    assert!(stats.by_insurer.get("Acme").is_none());
}

/// Concurrent searches during inserts must never observe a half-written
/// chunk: whatever comes back is fully formed, vector and metadata included.
#[tokio::test]
async fn concurrent_search_and_insert_never_expose_a_half_written_chunk() {
    let repository = Arc::new(PolicyChunkInMemoryRepository::new());
    let dimension = 8;

    let mut tasks = Vec::new();

    for writer in 0..4 {
        let repository = repository.clone();
        tasks.push(tokio::spawn(async move {
            for batch in 0..5 {
                let chunks: Vec<String> = (0..5)
                    .map(|i| format!("Writer {} batch {} clause {}.", writer, batch, i))
                    .collect();
                let vectors: Vec<Vec<f32>> = chunks
                    .iter()
                    .map(|chunk| crate::helpers::deterministic_vector(chunk, dimension))
                    .collect();
                repository
                    .insert(&chunks, &vectors, &context_for("Acme", "Auto"))
                    .await
                    .unwrap();
            }
        }));
    }

    for _ in 0..4 {
        let repository = repository.clone();
        tasks.push(tokio::spawn(async move {
            let query = vec![0.5; dimension];
            for _ in 0..20 {
                let hits = repository
                    .search(&query, &ChunkFilters::default(), 50)
                    .await
                    .unwrap();
                for (chunk, distance) in hits {
                    assert_eq!(chunk.embedding.len(), dimension);
                    assert!(!chunk.content.is_empty());
                    assert_eq!(chunk.insurer, "Acme");
                    assert!(distance.is_finite());
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(repository.stats().await.unwrap().total, 4 * 5 * 5);
}
