//! Pipeline assembly
//!
//! Builds every client once from `AppConfig`, loads each index once, and
//! wires destinations, router, and safeguards into a `SafeguardPipeline`.

use crate::answer::{Answerer, Destination};
use crate::catalog::builtin_destinations;
use crate::options::OptionMatcher;
use crate::prompt::PromptTemplate;
use crate::router::{DestinationRegistry, Router, DEFAULT_SENTINEL};
use crate::safeguard::SafeguardPipeline;
use crate::validator::AnswerValidator;
use routeqa_common::config::{AppConfig, DestinationConfig, RetrieverKind};
use routeqa_common::embeddings::{create_embedder, Embedder};
use routeqa_common::errors::{AppError, Result};
use routeqa_common::llm::{ChatClient, GroundednessChecker, LanguageModel, UpstageGroundednessChecker};
use routeqa_search::retrieval::{
    DenseRetriever, EnsembleRetriever, HierarchyMode, ParentChildRetriever, SparseRetriever,
};
use routeqa_search::{Retriever, VectorIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Child hits fetched per parent slot in hierarchical retrieval
const CHILD_FANOUT: usize = 4;

/// External clients shared by every destination
pub struct Components {
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub grounding: Option<Arc<dyn GroundednessChecker>>,
}

/// Build the real clients from configuration
pub fn create_components(config: &AppConfig) -> Result<Components> {
    let client = Arc::new(ChatClient::new(&config.llm)?);
    let embedder = create_embedder(&config.embedding, config.embedding_api_key())?;

    let grounding = if config.grounding.enabled {
        let checker: Arc<dyn GroundednessChecker> = Arc::new(UpstageGroundednessChecker::new(
            client.clone(),
            config.grounding.model.clone(),
        ));
        Some(checker)
    } else {
        None
    };

    Ok(Components {
        model: client,
        embedder,
        grounding,
    })
}

/// Indices loaded at most once per path
#[derive(Default)]
struct IndexCache {
    loaded: HashMap<PathBuf, Arc<VectorIndex>>,
}

impl IndexCache {
    fn get(&mut self, path: &Path, embedder: &dyn Embedder) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.loaded.get(path) {
            return Ok(index.clone());
        }

        let index = Arc::new(VectorIndex::load(path)?);
        if index.model() != embedder.model_name() {
            warn!(
                path = %path.display(),
                index_model = index.model(),
                embedder_model = embedder.model_name(),
                "Index was built with a different embedding model"
            );
        }
        self.loaded.insert(path.to_path_buf(), index.clone());
        Ok(index)
    }
}

/// Assemble the pipeline.
///
/// Fails on any configuration problem: missing or corrupt index, unknown
/// primary destination, duplicate names, or invalid ensemble weights.
pub fn build_pipeline(config: &AppConfig, components: Components) -> Result<SafeguardPipeline> {
    let destinations = if config.destinations.is_empty() {
        builtin_destinations()
    } else {
        config.destinations.clone()
    };

    let primary = destinations
        .iter()
        .find(|d| d.name == config.pipeline.primary_destination)
        .ok_or_else(|| AppError::Configuration {
            message: format!(
                "Primary destination '{}' is not among the configured destinations",
                config.pipeline.primary_destination
            ),
        })?;

    let mut cache = IndexCache::default();
    let mut registry = DestinationRegistry::new();

    for destination in &destinations {
        let default_threshold = if destination.name == primary.name {
            config.retrieval.primary_threshold
        } else {
            config.retrieval.domain_threshold
        };
        let threshold = destination.threshold.unwrap_or(default_threshold);
        let retriever = build_retriever(config, destination, Some(threshold), &mut cache, &components)?;

        registry.register(Destination::new(
            destination.name.clone(),
            destination.description.clone(),
            retriever,
            PromptTemplate::for_kind(destination.prompt),
        ))?;
    }

    // Default: primary index, default threshold, primary prompt
    let default_retriever = build_retriever(
        config,
        primary,
        Some(config.retrieval.default_threshold),
        &mut cache,
        &components,
    )?;
    registry.set_default(Destination::new(
        DEFAULT_SENTINEL,
        "Fallback when no destination fits",
        default_retriever,
        PromptTemplate::for_kind(primary.prompt),
    ));

    let primary_safeguard = Destination::new(
        "primary_safeguard",
        format!("{} without threshold", primary.name),
        build_retriever(config, primary, None, &mut cache, &components)?,
        PromptTemplate::for_kind(primary.prompt),
    );
    let secondary_safeguard = Destination::context_free("secondary_safeguard", PromptTemplate::safeguard());

    let validator = match &components.grounding {
        Some(checker) => AnswerValidator::with_groundedness(checker.clone()),
        None => AnswerValidator::structural(),
    };

    info!(
        destinations = registry.len(),
        indices = cache.loaded.len(),
        primary = %primary.name,
        grounding = components.grounding.is_some(),
        "Pipeline assembled"
    );

    Ok(SafeguardPipeline::new(
        Router::new(
            components.model.clone(),
            Arc::new(registry),
            config.pipeline.unknown_destination,
        ),
        Answerer::new(components.model.clone()),
        validator,
        OptionMatcher::new()?,
        Arc::new(primary_safeguard),
        Arc::new(secondary_safeguard),
    ))
}

fn build_retriever(
    config: &AppConfig,
    destination: &DestinationConfig,
    threshold: Option<f32>,
    cache: &mut IndexCache,
    components: &Components,
) -> Result<Arc<dyn Retriever>> {
    let top_k = destination.top_k.unwrap_or(config.retrieval.top_k);
    let path = config.index_path(&destination.index_path);
    let index = cache.get(&path, components.embedder.as_ref())?;

    let dense = |k: usize| {
        let retriever = DenseRetriever::new(index.clone(), components.embedder.clone(), k);
        match threshold {
            Some(min_score) => retriever.with_threshold(min_score),
            None => retriever,
        }
    };

    let retriever: Arc<dyn Retriever> = match destination.kind {
        RetrieverKind::Dense => Arc::new(dense(top_k)),
        RetrieverKind::Sparse => Arc::new(SparseRetriever::from_index(&index, top_k)),
        RetrieverKind::Ensemble => {
            let dense: Arc<dyn Retriever> = Arc::new(dense(top_k));
            let sparse: Arc<dyn Retriever> = Arc::new(SparseRetriever::from_index(&index, top_k));
            Arc::new(EnsembleRetriever::new(
                vec![dense, sparse],
                config.retrieval.ensemble_weights.clone(),
                top_k,
            )?)
        }
        RetrieverKind::Hierarchical | RetrieverKind::Summary => {
            if !index.has_parents() {
                return Err(AppError::Configuration {
                    message: format!(
                        "Destination '{}' needs an index with a parent docstore: {}",
                        destination.name,
                        path.display()
                    ),
                });
            }
            let mode = if destination.kind == RetrieverKind::Summary {
                HierarchyMode::Summary
            } else {
                HierarchyMode::ParentChild
            };
            let children: Arc<dyn Retriever> = Arc::new(dense(top_k * CHILD_FANOUT));
            Arc::new(ParentChildRetriever::new(children, index.clone(), mode, top_k))
        }
    };

    Ok(retriever)
}
