//! Safeguard pipeline
//!
//! Answers one question through a bounded escalation sequence:
//!
//! ```text
//! RouteAndAnswer ──routing failed──────────────────────────► PrimarySafeguard ─► Terminal
//!       │
//!       ▼
//! StructuralRepair ──repaired + acceptable──► Terminal
//!       │
//!       ▼
//! ContextEscalation ──sources, not acceptable──► PrimarySafeguard ──no sources or
//!       │          ──no sources─────────────┐          │             not acceptable──┐
//!       │                                   ▼          ▼                             ▼
//!       └──acceptable──► Terminal     SecondarySafeguard ◄───────────────────────────┘
//!                                           │
//!                                           ▼
//!                                        Terminal
//! ```
//!
//! Transitions live in [`next_stage`], a pure function; [`SafeguardPipeline`]
//! performs each stage's side effects and feeds the result back in.

use crate::answer::{AnswerResult, Answerer, Destination};
use crate::options::OptionMatcher;
use crate::router::Router;
use crate::validator::AnswerValidator;
use routeqa_common::errors::{ErrorKind, Result};
use routeqa_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How the primary safeguard was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    /// Router named an unregistered destination
    RoutingFailure,
    /// First answer had context but was not acceptable
    Escalation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RouteAndAnswer,
    StructuralRepair,
    ContextEscalation,
    PrimarySafeguard { via: Entry },
    SecondarySafeguard,
    Terminal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RouteAndAnswer => "route_and_answer",
            Stage::StructuralRepair => "structural_repair",
            Stage::ContextEscalation => "context_escalation",
            Stage::PrimarySafeguard { .. } => "primary_safeguard",
            Stage::SecondarySafeguard => "secondary_safeguard",
            Stage::Terminal => "terminal",
        }
    }
}

/// What the last stage learned about the current answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assessment {
    pub routing_failed: bool,
    pub has_sources: bool,
    /// Structurally valid and not judged ungrounded
    pub acceptable: bool,
    /// The option matcher rewrote the answer
    pub repaired: bool,
}

/// Transition table
pub fn next_stage(stage: Stage, assessment: &Assessment) -> Stage {
    match stage {
        Stage::RouteAndAnswer if assessment.routing_failed => Stage::PrimarySafeguard {
            via: Entry::RoutingFailure,
        },
        Stage::RouteAndAnswer => Stage::StructuralRepair,

        Stage::StructuralRepair if assessment.repaired && assessment.acceptable => Stage::Terminal,
        Stage::StructuralRepair => Stage::ContextEscalation,

        // Primary trigger is checked first
        Stage::ContextEscalation if assessment.has_sources && !assessment.acceptable => {
            Stage::PrimarySafeguard {
                via: Entry::Escalation,
            }
        }
        Stage::ContextEscalation if !assessment.has_sources => Stage::SecondarySafeguard,
        Stage::ContextEscalation => Stage::Terminal,

        Stage::PrimarySafeguard {
            via: Entry::RoutingFailure,
        } => Stage::Terminal,
        Stage::PrimarySafeguard {
            via: Entry::Escalation,
        } if !assessment.has_sources || !assessment.acceptable => Stage::SecondarySafeguard,
        Stage::PrimarySafeguard { .. } => Stage::Terminal,

        Stage::SecondarySafeguard | Stage::Terminal => Stage::Terminal,
    }
}

/// Final answer plus the stages it went through
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub answer: AnswerResult,
    pub path: Vec<Stage>,
    /// Destination chosen by the router, when routing succeeded
    pub destination: Option<String>,
}

impl PipelineOutcome {
    pub fn text(&self) -> &str {
        &self.answer.raw_text
    }
}

pub struct SafeguardPipeline {
    router: Router,
    answerer: Answerer,
    validator: AnswerValidator,
    matcher: OptionMatcher,
    primary_safeguard: Arc<Destination>,
    secondary_safeguard: Arc<Destination>,
}

impl SafeguardPipeline {
    pub fn new(
        router: Router,
        answerer: Answerer,
        validator: AnswerValidator,
        matcher: OptionMatcher,
        primary_safeguard: Arc<Destination>,
        secondary_safeguard: Arc<Destination>,
    ) -> Self {
        Self {
            router,
            answerer,
            validator,
            matcher,
            primary_safeguard,
            secondary_safeguard,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn matcher(&self) -> &OptionMatcher {
        &self.matcher
    }

    /// Answer one question.
    ///
    /// Malformed answers never produce an error; whatever answer is current
    /// when the sequence ends is returned. Transport errors propagate, as do
    /// configuration errors such as a missing default destination.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn answer(&self, question: &str) -> Result<PipelineOutcome> {
        let mut stage = Stage::RouteAndAnswer;
        let mut path = Vec::new();
        let mut current = AnswerResult::new(String::new(), Vec::new());
        let mut assessment = Assessment::default();
        let mut destination = None;

        loop {
            path.push(stage);
            metrics::record_stage(stage.as_str());
            debug!(stage = stage.as_str(), "Entering stage");

            match stage {
                Stage::RouteAndAnswer => match self.route_and_answer(question).await {
                    Ok((name, result)) => {
                        assessment = self.assess(&result).await?;
                        destination = Some(name);
                        current = result;
                    }
                    Err(e) if e.kind() == ErrorKind::Routing => {
                        warn!(error = %e, code = ?e.code(), "Routing failed");
                        assessment.routing_failed = true;
                    }
                    Err(e) => return Err(e),
                },

                Stage::StructuralRepair => {
                    if !self.validator.check_structure(&current) {
                        let repaired = self.matcher.repair(question, &current.raw_text);
                        current = current.with_text(repaired);
                        assessment = Assessment {
                            repaired: true,
                            ..self.assess(&current).await?
                        };
                    }
                }

                Stage::ContextEscalation => {}

                Stage::PrimarySafeguard { via } => {
                    info!(
                        via = ?via,
                        destination = %self.primary_safeguard.name,
                        "Escalating to primary safeguard"
                    );
                    current = self.primary_safeguard.run(&self.answerer, question).await?;
                    if via == Entry::Escalation {
                        assessment = self.assess(&current).await?;
                    }
                }

                Stage::SecondarySafeguard => {
                    info!(
                        destination = %self.secondary_safeguard.name,
                        "Escalating to secondary safeguard"
                    );
                    let result = self.secondary_safeguard.run(&self.answerer, question).await?;
                    let repaired = self.matcher.repair(question, &result.raw_text);
                    current = result.with_text(repaired);
                }

                Stage::Terminal => {
                    current.extracted_option = self.matcher.extract(&current.raw_text);
                    break;
                }
            }

            stage = next_stage(stage, &assessment);
        }

        Ok(PipelineOutcome {
            answer: current,
            path,
            destination,
        })
    }

    async fn route_and_answer(&self, question: &str) -> Result<(String, AnswerResult)> {
        let decision = self.router.route(question).await?;
        let destination = self.router.resolve(&decision)?;
        let result = destination
            .run(&self.answerer, &decision.forwarded_query)
            .await?;
        Ok((destination.name.clone(), result))
    }

    async fn assess(&self, answer: &AnswerResult) -> Result<Assessment> {
        Ok(Assessment {
            routing_failed: false,
            has_sources: answer.has_sources(),
            acceptable: self.validator.is_acceptable(answer).await?,
            repaired: false,
        })
    }
}
