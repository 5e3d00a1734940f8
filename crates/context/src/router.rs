//! Destination routing
//!
//! The router asks the model which destination fits a question. Resolving
//! its answer against the registry is a pure lookup; the one place an
//! unregistered name is handled is [`Router::resolve`].

use crate::answer::Destination;
use crate::prompt::{render, ROUTER_TEMPLATE};
use routeqa_common::config::UnknownDestinationPolicy;
use routeqa_common::errors::{AppError, Result};
use routeqa_common::llm::LanguageModel;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name the router uses for "no destination fits"
pub const DEFAULT_SENTINEL: &str = "DEFAULT";

/// Outcome of looking up a router-chosen name
#[derive(Debug)]
pub enum Resolution<'a> {
    Registered(&'a Arc<Destination>),
    /// No name, or the sentinel
    Default(&'a Arc<Destination>),
    /// Well-formed name with no registered destination
    Unregistered(String),
    /// Nothing to fall back to
    NoDefault,
}

/// Ordered, immutable-after-startup name → destination mapping
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    destinations: Vec<Arc<Destination>>,
    default: Option<Arc<Destination>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a routable destination. The sentinel name (any case) is reserved
    /// for the default slot.
    pub fn register(&mut self, destination: Destination) -> Result<()> {
        if destination.name.trim().eq_ignore_ascii_case(DEFAULT_SENTINEL) {
            return Err(AppError::Configuration {
                message: format!(
                    "Destination name '{}' is reserved for the default destination",
                    destination.name
                ),
            });
        }
        if self.get(&destination.name).is_some() {
            return Err(AppError::DuplicateDestination {
                name: destination.name,
            });
        }
        self.destinations.push(Arc::new(destination));
        Ok(())
    }

    pub fn set_default(&mut self, destination: Destination) {
        self.default = Some(Arc::new(destination));
    }

    pub fn with_default(mut self, destination: Destination) -> Self {
        self.set_default(destination);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Destination>> {
        self.destinations.iter().find(|d| d.name == name)
    }

    pub fn default_destination(&self) -> Option<&Arc<Destination>> {
        self.default.as_ref()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.destinations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// `name: description` lines for the router prompt
    pub fn descriptions(&self) -> String {
        self.destinations
            .iter()
            .map(|d| format!("{}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Never fails; the caller decides what an unregistered name means
    pub fn resolve(&self, name: Option<&str>) -> Resolution<'_> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case(DEFAULT_SENTINEL));

        match name {
            Some(name) => match self.get(name) {
                Some(destination) => Resolution::Registered(destination),
                None => Resolution::Unregistered(name.to_string()),
            },
            None => match &self.default {
                Some(destination) => Resolution::Default(destination),
                None => Resolution::NoDefault,
            },
        }
    }
}

/// Parsed router output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterDecision {
    /// `None` means the default destination
    pub destination: Option<String>,
    /// Query handed to the destination
    pub forwarded_query: String,
}

impl RouterDecision {
    pub fn default_for(question: &str) -> Self {
        Self {
            destination: None,
            forwarded_query: question.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RawDecision {
    destination: Option<String>,
    next_inputs: Option<Value>,
}

/// Parse the model's routing reply.
///
/// Accepts a fenced ```json block or the first `{...}` span. Anything that
/// does not parse routes to the default destination with the question
/// forwarded unchanged.
pub fn parse_router_output(text: &str, question: &str) -> RouterDecision {
    let Some(raw) = json_span(text).and_then(|span| serde_json::from_str::<RawDecision>(span).ok())
    else {
        debug!("Router output not parseable, using default destination");
        return RouterDecision::default_for(question);
    };

    let destination = raw
        .destination
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case(DEFAULT_SENTINEL));

    let forwarded_query = raw
        .next_inputs
        .as_ref()
        .and_then(forwarded_text)
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| question.to_string());

    RouterDecision {
        destination,
        forwarded_query,
    }
}

fn json_span(text: &str) -> Option<&str> {
    let body = match text.find("```json") {
        Some(start) => {
            let rest = &text[start + "```json".len()..];
            rest.find("```").map_or(rest, |end| &rest[..end])
        }
        None => text,
    };
    let open = body.find('{')?;
    let close = body.rfind('}')?;
    (open < close).then(|| &body[open..=close])
}

fn forwarded_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["query", "input", "question"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

/// LLM-driven destination selection
pub struct Router {
    model: Arc<dyn LanguageModel>,
    registry: Arc<DestinationRegistry>,
    policy: UnknownDestinationPolicy,
}

impl Router {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<DestinationRegistry>,
        policy: UnknownDestinationPolicy,
    ) -> Self {
        Self {
            model,
            registry,
            policy,
        }
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// One model call; transport errors propagate
    pub async fn route(&self, question: &str) -> Result<RouterDecision> {
        let prompt = render(
            ROUTER_TEMPLATE,
            &[
                ("destinations", &self.registry.descriptions()),
                ("input", question),
            ],
        );
        let output = self.model.generate(&prompt).await?;
        let decision = parse_router_output(&output, question);
        debug!(destination = ?decision.destination, "Router decided");
        Ok(decision)
    }

    /// Turn a decision into an executable destination.
    ///
    /// Errors with `UnknownDestination` for unregistered names under the
    /// safeguard policy, and with `MissingDefaultDestination` when a
    /// fallback is needed but none is configured.
    pub fn resolve(&self, decision: &RouterDecision) -> Result<Arc<Destination>> {
        match self.registry.resolve(decision.destination.as_deref()) {
            Resolution::Registered(destination) | Resolution::Default(destination) => {
                Ok(destination.clone())
            }
            Resolution::Unregistered(name) => match self.policy {
                UnknownDestinationPolicy::Safeguard => Err(AppError::UnknownDestination { name }),
                UnknownDestinationPolicy::Default => {
                    warn!(destination = %name, "Unregistered destination, using default");
                    self.registry
                        .default_destination()
                        .cloned()
                        .ok_or(AppError::MissingDefaultDestination)
                }
            },
            Resolution::NoDefault => Err(AppError::MissingDefaultDestination),
        }
    }
}
