//! SQLite store behavior against a real (temporary) database file.

use chrono::Utc;
use tempfile::TempDir;

use pdfrag::error::Error;
use pdfrag::models::{ChunkDraft, EmbeddedChunk, NewDocument};
use pdfrag::store::{SqliteStore, Store};

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let store = SqliteStore::connect(&tmp.path().join("data").join("test.sqlite"))
        .await
        .unwrap();
    store.migrate().await.unwrap();
    store
}

fn doc(filename: &str) -> NewDocument {
    NewDocument {
        title: filename.trim_end_matches(".pdf").to_string(),
        filename: filename.to_string(),
        total_pages: 1,
    }
}

fn embedded(index: i64, page: i64, content: &str, vector: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk {
        draft: ChunkDraft {
            page_number: page,
            chunk_index: index,
            content: content.to_string(),
        },
        vector,
    }
}

#[tokio::test]
async fn health_check_reflects_migration_state() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::connect(&tmp.path().join("fresh.sqlite"))
        .await
        .unwrap();
    assert!(!store.health_check().await.unwrap());

    store.migrate().await.unwrap();
    assert!(store.health_check().await.unwrap());
    // idempotent
    store.migrate().await.unwrap();
    assert!(store.health_check().await.unwrap());
}

#[tokio::test]
async fn duplicate_filename_is_rejected_and_leaves_original_intact() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let id = store
        .insert_document(
            &doc("report.pdf"),
            &[embedded(0, 1, "original content", vec![1.0, 0.0])],
        )
        .await
        .unwrap();

    let err = store
        .insert_document(
            &doc("report.pdf"),
            &[embedded(0, 1, "replacement content", vec![0.0, 1.0])],
        )
        .await
        .unwrap_err();
    match err {
        Error::DuplicateDocument { filename } => assert_eq!(filename, "report.pdf"),
        other => panic!("expected DuplicateDocument, got {other:?}"),
    }

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, id);
    assert_eq!(docs[0].chunk_count, 1);

    let results = store.search(&[1.0, 0.0], 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "original content");
}

#[tokio::test]
async fn failed_insert_leaves_no_document_behind() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    // the second chunk violates UNIQUE(document_id, chunk_index), so the
    // whole document must roll back, filename included
    let chunks = vec![
        embedded(0, 1, "first", vec![1.0, 0.0]),
        embedded(0, 1, "collides", vec![0.0, 1.0]),
    ];
    assert!(store.insert_document(&doc("doc.pdf"), &chunks).await.is_err());
    assert!(
        store.list_documents().await.unwrap().is_empty(),
        "partial insert became visible"
    );

    // the filename is free to retry with good chunks
    let id = store
        .insert_document(&doc("doc.pdf"), &[embedded(0, 1, "first", vec![1.0, 0.0])])
        .await
        .unwrap();
    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, id);
    assert_eq!(docs[0].chunk_count, 1);
}

#[tokio::test]
async fn list_documents_reports_counts_and_creation_time() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let before = Utc::now().timestamp();

    store
        .insert_document(
            &doc("listed.pdf"),
            &[
                embedded(0, 1, "one", vec![1.0, 0.0]),
                embedded(1, 1, "two", vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].total_pages, 1);
    assert_eq!(docs[0].chunk_count, 2);
    assert!(
        docs[0].created_at >= before && docs[0].created_at <= Utc::now().timestamp(),
        "created_at not a plausible unix timestamp: {}",
        docs[0].created_at
    );
}

#[tokio::test]
async fn search_ranks_by_similarity_and_respects_top_k() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .insert_document(
            &doc("doc.pdf"),
            &[
                embedded(0, 1, "exact match", vec![1.0, 0.0]),
                embedded(1, 1, "close match", vec![0.9, 0.4]),
                embedded(2, 2, "opposite", vec![-1.0, 0.0]),
                embedded(3, 2, "orthogonal", vec![0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let results = store.search(&[1.0, 0.0], 3).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].content, "exact match");
    assert!((results[0].similarity - 1.0).abs() < 1e-6);
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    // similarity is rescaled into [0, 1], so "opposite" would score ~0
    assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.similarity)));
    assert!(results.iter().all(|r| r.content != "opposite"));
    assert_eq!(results[0].document_title, "doc");
}

#[tokio::test]
async fn search_breaks_similarity_ties_deterministically() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    // identical vectors everywhere: ordering must fall back to chunk_index,
    // then document id
    let v = vec![0.5, 0.5];
    let id_a = store
        .insert_document(
            &doc("a.pdf"),
            &[
                embedded(0, 1, "a0", v.clone()),
                embedded(1, 1, "a1", v.clone()),
            ],
        )
        .await
        .unwrap();
    let id_b = store
        .insert_document(&doc("b.pdf"), &[embedded(0, 1, "b0", v.clone())])
        .await
        .unwrap();

    let first = store.search(&v, 10).await.unwrap();
    let second = store.search(&v, 10).await.unwrap();
    let order =
        |results: &[pdfrag::models::RetrievedChunk]| -> Vec<String> {
            results.iter().map(|r| r.content.clone()).collect()
        };
    assert_eq!(order(&first), order(&second));

    // chunk_index 0 entries precede index 1, and equal indexes order by
    // document id
    assert_eq!(first[2].content, "a1");
    let (lo, hi) = if id_a < id_b { ("a0", "b0") } else { ("b0", "a0") };
    assert_eq!(first[0].content, lo);
    assert_eq!(first[1].content, hi);
}

#[tokio::test]
async fn empty_store_returns_no_results() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    assert!(store.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
    assert!(store.list_documents().await.unwrap().is_empty());
}
