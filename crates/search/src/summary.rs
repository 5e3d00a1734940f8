//! Summary generation for summary-indexed retrieval
//!
//! Summaries are requested concurrently but collected in parent order.

use crate::retrieval::Document;
use futures::stream::{self, StreamExt, TryStreamExt};
use routeqa_common::errors::Result;
use routeqa_common::llm::LanguageModel;
use tracing::info;

/// Prompt used to summarize one parent
pub const SUMMARY_PROMPT: &str = "Summarize the following document:\n\n{doc}";

/// Default number of in-flight summary requests
pub const DEFAULT_SUMMARY_CONCURRENCY: usize = 5;

/// Summarize each parent; the i-th summary belongs to the i-th parent.
///
/// The first failed request fails the whole build.
pub async fn build_summaries(
    parents: &[Document],
    model: &dyn LanguageModel,
    max_concurrency: usize,
) -> Result<Vec<Document>> {
    let summaries: Vec<Document> = stream::iter(parents)
        .map(|parent| async move {
            let prompt = SUMMARY_PROMPT.replace("{doc}", &parent.content);
            let summary = model.generate(&prompt).await?;
            Ok::<_, routeqa_common::AppError>(Document::child_of(parent, summary.trim()))
        })
        .buffered(max_concurrency.max(1))
        .try_collect()
        .await?;

    info!(
        parents = parents.len(),
        model = model.model_name(),
        "Summaries built"
    );
    Ok(summaries)
}
