//! Index build, persistence, and every retriever variant over one corpus.

use routeqa_common::embeddings::{Embedder, MockEmbedder};
use routeqa_common::llm::MockLanguageModel;
use routeqa_search::chunker::{split_children, split_parents, ChunkingConfig};
use routeqa_search::retrieval::{
    DenseRetriever, EnsembleRetriever, HierarchyMode, ParentChildRetriever, SparseRetriever,
};
use routeqa_search::summary::build_summaries;
use routeqa_search::{Document, RetrievalMode, Retriever, VectorIndex};
use std::collections::HashSet;
use std::sync::Arc;

fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "Article 1. Enrollment. Students must enroll every semester. \
             Late enrollment requires approval of the dean.",
        ),
        Document::new(
            "Article 2. Leave of absence. A student may take a leave of absence \
             for up to two semesters. Military service leave is separate.",
        ),
        Document::new(
            "Article 3. Graduation. Graduation requires 130 credits and a thesis. \
             Early graduation is possible with honors.",
        ),
    ]
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(MockEmbedder::new(512))
}

#[tokio::test]
async fn dense_and_sparse_fuse_over_shared_index() {
    let embedder = embedder();
    let index = Arc::new(VectorIndex::build(corpus(), embedder.as_ref()).await.unwrap());

    let dense: Arc<dyn Retriever> = Arc::new(DenseRetriever::new(index.clone(), embedder, 3));
    let sparse: Arc<dyn Retriever> = Arc::new(SparseRetriever::from_index(&index, 3));
    let ensemble = EnsembleRetriever::new(vec![dense, sparse], vec![0.5, 0.5], 2).unwrap();

    let chunks = ensemble.retrieve("leave of absence").await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].content.starts_with("Article 2"));
    assert_eq!(chunks[0].retrieval_mode, RetrievalMode::Ensemble);
}

#[tokio::test]
async fn parent_child_index_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regulations.json");
    let embedder = embedder();

    let parents = split_parents(&corpus(), &ChunkingConfig::new(300, 100)).unwrap();
    let children = split_children(&parents, &ChunkingConfig::new(40, 10)).unwrap();
    VectorIndex::build(children, embedder.as_ref())
        .await
        .unwrap()
        .with_parents(parents)
        .save(&path)
        .unwrap();

    let index = Arc::new(VectorIndex::load(&path).unwrap());
    assert!(index.has_parents());

    let children: Arc<dyn Retriever> = Arc::new(DenseRetriever::new(index.clone(), embedder, 8));
    let retriever = ParentChildRetriever::new(children, index, HierarchyMode::ParentChild, 3);

    let results = retriever.retrieve("graduation credits thesis").await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].content.starts_with("Article 3"));
    assert!(!results[0].sub_chunks.is_empty());

    let unique: HashSet<_> = results.iter().map(|r| r.parent_id.clone()).collect();
    assert_eq!(unique.len(), results.len());
}

#[tokio::test]
async fn summary_index_returns_parents() {
    let embedder = embedder();
    let parents = corpus();
    let model = MockLanguageModel::new(|prompt| {
        // First sentence stands in for a summary
        let doc = prompt.rsplit("\n\n").next().unwrap_or_default();
        Ok(doc.split(". ").take(2).collect::<Vec<_>>().join(". "))
    });

    let summaries = build_summaries(&parents, &model, 2).await.unwrap();
    let index = Arc::new(
        VectorIndex::build(summaries, embedder.as_ref())
            .await
            .unwrap()
            .with_parents(parents.clone()),
    );

    let search: Arc<dyn Retriever> = Arc::new(DenseRetriever::new(index.clone(), embedder, 4));
    let retriever = ParentChildRetriever::new(search, index, HierarchyMode::Summary, 1);

    let results = retriever.retrieve("leave of absence").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, parents[1].content);
    assert_eq!(results[0].retrieval_mode, RetrievalMode::Summary);
}
