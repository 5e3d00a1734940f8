//! Answer generation
//!
//! Provides:
//! - `AnswerResult`, the value threaded through the safeguard stages
//! - `Answerer`, one model call per answer
//! - `Destination`, a named retriever + prompt pair

use crate::options::ChoiceOption;
use crate::prompt::{join_context, PromptTemplate};
use routeqa_common::errors::Result;
use routeqa_common::llm::LanguageModel;
use routeqa_search::{RetrievedChunk, Retriever};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Answer produced by one stage
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    /// Model output, possibly rewritten by the option matcher
    pub raw_text: String,

    /// Chunks the answer was generated from, in retrieval order
    pub source_chunks: Vec<RetrievedChunk>,

    /// Canonical option, filled in when the pipeline finishes
    pub extracted_option: Option<ChoiceOption>,
}

impl AnswerResult {
    pub fn new(raw_text: impl Into<String>, source_chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            raw_text: raw_text.into(),
            source_chunks,
            extracted_option: None,
        }
    }

    /// Same sources, new text
    pub fn with_text(self, raw_text: String) -> Self {
        Self {
            raw_text,
            source_chunks: self.source_chunks,
            extracted_option: None,
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.source_chunks.is_empty()
    }

    /// Sources rendered the way the answer prompt saw them
    pub fn context(&self) -> String {
        join_context(&self.source_chunks)
    }
}

/// Renders a prompt and calls the model exactly once
pub struct Answerer {
    model: Arc<dyn LanguageModel>,
}

impl Answerer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// No retries here; escalation belongs to the safeguard pipeline
    pub async fn answer(
        &self,
        question: &str,
        context: Vec<RetrievedChunk>,
        prompt: &PromptTemplate,
    ) -> Result<AnswerResult> {
        let rendered = prompt.render_answer(question, &context);
        let raw_text = self.model.generate(&rendered).await?;
        Ok(AnswerResult::new(raw_text, context))
    }
}

/// Named (retriever, prompt) pair the router can select
pub struct Destination {
    pub name: String,
    pub description: String,
    /// `None` for context-free chains
    retriever: Option<Arc<dyn Retriever>>,
    prompt: PromptTemplate,
}

impl Destination {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        retriever: Arc<dyn Retriever>,
        prompt: PromptTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            retriever: Some(retriever),
            prompt,
        }
    }

    /// Destination that answers from the question alone
    pub fn context_free(name: impl Into<String>, prompt: PromptTemplate) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            retriever: None,
            prompt,
        }
    }

    /// Retrieve (when bound to a retriever) and answer
    pub async fn run(&self, answerer: &Answerer, query: &str) -> Result<AnswerResult> {
        let chunks = match &self.retriever {
            Some(retriever) => retriever.retrieve(query).await?,
            None => Vec::new(),
        };
        debug!(destination = %self.name, chunk_count = chunks.len(), "Context retrieved");
        answerer.answer(query, chunks, &self.prompt).await
    }
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("retrieval_mode", &self.retriever.as_ref().map(|r| r.mode()))
            .finish()
    }
}
