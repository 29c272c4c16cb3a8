//! End-to-end tests for the vector layer over the in-memory backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use scribe_vector::backend::VectorBackend;
use scribe_vector::connection::{BackendFactory, ConnectionManager};
use scribe_vector::error::Result;
use scribe_vector::filter::{Filter, SearchScope};
use scribe_vector::memory::MemoryBackend;
use scribe_vector::payload::Payload;
use scribe_vector::search::SearchOptions;
use scribe_vector::store::VectorLayer;
use scribe_vector::{VectorConfig, schema};

const DIM: usize = 3;

/// Factory handing out one shared in-memory backend.
struct MemoryFactory {
    backend: Arc<MemoryBackend>,
}

#[async_trait]
impl BackendFactory for MemoryFactory {
    async fn connect(&self, _config: &VectorConfig) -> Result<Arc<dyn VectorBackend>> {
        Ok(self.backend.clone())
    }
}

fn config() -> VectorConfig {
    VectorConfig::builder()
        .url("http://localhost:6333")
        .api_key("test-key")
        .build()
        .unwrap()
}

fn setup() -> (VectorLayer, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let factory = MemoryFactory { backend: backend.clone() };
    let manager = Arc::new(ConnectionManager::with_factory(config(), Box::new(factory)));
    (VectorLayer::with_manager(manager, DIM), backend)
}

#[tokio::test]
async fn indexing_the_same_chunk_twice_overwrites() {
    let (layer, backend) = setup();

    let chunks =
        vec![(vec![1.0, 0.0, 0.0], Payload::web_content("https://a.test/page", 0, "v1", "u-1"))];
    layer.index(schema::WEB_CONTENT, "https://a.test/page", chunks).await.unwrap();

    let chunks =
        vec![(vec![0.0, 1.0, 0.0], Payload::web_content("https://a.test/page", 0, "v2", "u-1"))];
    layer.index(schema::WEB_CONTENT, "https://a.test/page", chunks).await.unwrap();

    assert_eq!(backend.point_count(schema::WEB_CONTENT).await, 1);

    let hits = layer
        .search(
            schema::WEB_CONTENT,
            vec![0.0, 1.0, 0.0],
            &SearchScope::new(),
            &SearchOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.get("text").and_then(|v| v.as_str()), Some("v2"));
}

#[tokio::test]
async fn search_is_scoped_to_the_tenant() {
    let (layer, _backend) = setup();

    for (user, vector) in [("u-1", vec![1.0, 0.0, 0.0]), ("u-2", vec![0.9, 0.1, 0.0])] {
        let doc_id = format!("doc-{user}");
        let chunks = vec![(
            vector,
            Payload::document_chunk(doc_id.clone(), 0, format!("text of {user}"), user, None),
        )];
        layer.index(schema::DOCUMENTS, &doc_id, chunks).await.unwrap();
    }

    let hits = layer
        .search(
            schema::DOCUMENTS,
            vec![1.0, 0.0, 0.0],
            &SearchScope::new().user("u-2"),
            &SearchOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload.get("user_id").and_then(|v| v.as_str()), Some("u-2"));
}

#[tokio::test]
async fn score_threshold_drops_irrelevant_hits() {
    let (layer, _backend) = setup();

    let chunks = vec![
        (vec![1.0, 0.0, 0.0], Payload::document_chunk("d", 0, "on axis", "u-1", None)),
        (vec![0.0, 0.0, 1.0], Payload::document_chunk("d", 1, "orthogonal", "u-1", None)),
    ];
    layer.index(schema::DOCUMENTS, "d", chunks).await.unwrap();

    let hits = layer
        .search(
            schema::DOCUMENTS,
            vec![1.0, 0.0, 0.0],
            &SearchScope::new(),
            &SearchOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1, "orthogonal chunk should fall under the 0.3 threshold");

    let browsing = SearchOptions { score_threshold: None, ..SearchOptions::default() };
    let all = layer
        .search(schema::DOCUMENTS, vec![1.0, 0.0, 0.0], &SearchScope::new(), &browsing)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn first_chunk_index_returns_one_record_per_url() {
    let (layer, _backend) = setup();

    for (url, chunk_count) in [("https://a.test", 5u64), ("https://b.test", 3u64)] {
        let chunks = (0..chunk_count)
            .map(|i| {
                (
                    vec![1.0, 0.0, 0.0],
                    Payload::web_content(url, i, format!("chunk {i} of {url}"), "u-1"),
                )
            })
            .collect();
        layer.index(schema::WEB_CONTENT, url, chunks).await.unwrap();
    }

    let records = layer.first_chunk_index(schema::WEB_CONTENT, "url").await.unwrap();
    assert_eq!(records.len(), 2);
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert!(urls.contains(&"https://a.test"));
    assert!(urls.contains(&"https://b.test"));
    for record in &records {
        // The record must come from the chunk-0 point: its hash is the
        // hash of that chunk's text.
        let expected = scribe_vector::ids::content_hash(&format!("chunk 0 of {}", record.url));
        assert_eq!(record.content_hash.as_deref(), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn unique_values_respects_the_bound() {
    let (layer, _backend) = setup();

    for i in 0..20 {
        let doc_id = format!("doc-{i}");
        let chunks = vec![(
            vec![1.0, 0.0, 0.0],
            Payload::document_chunk(doc_id.clone(), 0, "text", "u-1", Some(format!("cat-{i}"))),
        )];
        layer.index(schema::DOCUMENTS, &doc_id, chunks).await.unwrap();
    }

    let values = layer.unique_values(schema::DOCUMENTS, "category", 5).await.unwrap();
    assert_eq!(values.len(), 5);
}

#[tokio::test]
async fn value_counts_sort_descending_and_honor_base_filter() {
    let (layer, _backend) = setup();

    for (i, category) in ["a", "a", "a", "b", "b", "c"].iter().enumerate() {
        let doc_id = format!("doc-{i}");
        let user = if i < 4 { "u-1" } else { "u-2" };
        let chunks = vec![(
            vec![1.0, 0.0, 0.0],
            Payload::document_chunk(doc_id.clone(), 0, "text", user, Some(category.to_string())),
        )];
        layer.index(schema::DOCUMENTS, &doc_id, chunks).await.unwrap();
    }

    let counts = layer.value_counts(schema::DOCUMENTS, "category", 10, None).await.unwrap();
    let pairs: Vec<(&str, u64)> = counts.iter().map(|c| (c.value.as_str(), c.count)).collect();
    assert_eq!(pairs, vec![("a", 3), ("b", 2), ("c", 1)]);

    let scoped = layer
        .value_counts(schema::DOCUMENTS, "category", 10, Some(Filter::field_equals("user_id", "u-1")))
        .await
        .unwrap();
    let pairs: Vec<(&str, u64)> = scoped.iter().map(|c| (c.value.as_str(), c.count)).collect();
    assert_eq!(pairs, vec![("a", 3), ("b", 1)]);
}

#[tokio::test]
async fn date_range_tracks_min_and_max() {
    let (layer, _backend) = setup();

    for i in 1..=5 {
        let doc_id = format!("doc-{i}");
        let chunks = vec![(
            vec![1.0, 0.0, 0.0],
            Payload::document_chunk(doc_id.clone(), 0, "text", "u-1", None),
        )];
        layer.index(schema::DOCUMENTS, &doc_id, chunks).await.unwrap();
    }

    let range = layer.date_range(schema::DOCUMENTS, "created_at").await.unwrap().unwrap();
    assert!(range.0 <= range.1);
}

#[tokio::test]
async fn aggregates_treat_missing_collections_as_empty() {
    let (layer, _backend) = setup();
    layer.init().await.unwrap();

    assert!(layer.unique_values("never_created", "field", 10).await.unwrap().is_empty());
    assert!(layer.value_counts("never_created", "field", 10, None).await.unwrap().is_empty());
    assert_eq!(layer.date_range("never_created", "field").await.unwrap(), None);
    assert!(layer.first_chunk_index("never_created", "url").await.unwrap().is_empty());
    assert!(layer.sample("never_created", None, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_on_missing_collection_is_a_hard_error() {
    let (layer, _backend) = setup();
    layer.init().await.unwrap();

    let err = layer
        .search("never_created", vec![1.0, 0.0, 0.0], &SearchScope::new(), &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, scribe_vector::VectorError::CollectionNotFound { .. }));
}

#[tokio::test]
async fn sampling_a_small_set_returns_every_member() {
    let (layer, _backend) = setup();

    for i in 0..3 {
        let post_id = format!("post-{i}");
        let chunks = vec![(
            vec![1.0, 0.0, 0.0],
            Payload::social_example(post_id.clone(), "text", "linkedin", "u-1", None),
        )];
        layer.index(schema::SOCIAL_POSTS, &post_id, chunks).await.unwrap();
    }

    let sampled = layer.sample(schema::SOCIAL_POSTS, None, 5).await.unwrap();
    assert_eq!(sampled.len(), 3);
}

#[tokio::test]
async fn sampling_a_large_set_returns_varying_subsets() {
    let (layer, _backend) = setup();

    let chunks: Vec<_> = (0..1000u64)
        .map(|i| {
            (
                vec![1.0, 0.0, 0.0],
                Payload::web_content("https://big.test", i, format!("chunk {i}"), "u-1"),
            )
        })
        .collect();
    layer.index(schema::WEB_CONTENT, "https://big.test", chunks).await.unwrap();

    let mut subsets: BTreeSet<Vec<String>> = BTreeSet::new();
    for _ in 0..5 {
        let sampled = layer.sample(schema::WEB_CONTENT, None, 5).await.unwrap();
        assert_eq!(sampled.len(), 5);
        let mut texts: Vec<String> = sampled
            .iter()
            .map(|p| p.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string())
            .collect();
        texts.sort();
        subsets.insert(texts);
    }
    assert!(subsets.len() > 1, "five draws from 1000 points should not all be identical");
}

#[tokio::test]
async fn user_delete_reports_per_collection_outcomes() {
    let (layer, backend) = setup();

    let chunks = vec![(
        vec![1.0, 0.0, 0.0],
        Payload::document_chunk("doc-1", 0, "text", "u-1", None),
    )];
    layer.index(schema::DOCUMENTS, "doc-1", chunks).await.unwrap();
    let chunks = vec![(
        vec![1.0, 0.0, 0.0],
        Payload::social_example("post-1", "text", "x", "u-1", None),
    )];
    layer.index(schema::SOCIAL_POSTS, "post-1", chunks).await.unwrap();

    let report = layer
        .delete_user_data(&[schema::DOCUMENTS, schema::SOCIAL_POSTS, "never_created"], "u-1")
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(backend.point_count(schema::DOCUMENTS).await, 0);
    assert_eq!(backend.point_count(schema::SOCIAL_POSTS).await, 0);
}

#[tokio::test]
async fn delete_url_removes_only_that_source() {
    let (layer, backend) = setup();

    for url in ["https://a.test", "https://b.test"] {
        let chunks = (0..3u64)
            .map(|i| (vec![1.0, 0.0, 0.0], Payload::web_content(url, i, "text", "u-1")))
            .collect();
        layer.index(schema::WEB_CONTENT, url, chunks).await.unwrap();
    }

    layer.delete_url(schema::WEB_CONTENT, "https://a.test").await.unwrap();
    assert_eq!(backend.point_count(schema::WEB_CONTENT).await, 3);
}
