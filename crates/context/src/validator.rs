//! Answer validation
//!
//! Two independent checks, neither of which touches the answer:
//! - structural: the `[ANSWER]:` marker followed by content
//! - groundedness: an external judge agrees the answer follows from its context

use crate::answer::AnswerResult;
use routeqa_common::errors::Result;
use routeqa_common::llm::{Groundedness, GroundednessChecker};
use std::sync::Arc;
use tracing::debug;

/// Marker introducing the canonical answer
pub const ANSWER_MARKER: &str = "[ANSWER]:";

/// Text after the last marker, if the marker is present
pub fn marker_tail(text: &str) -> Option<&str> {
    text.rfind(ANSWER_MARKER)
        .map(|pos| &text[pos + ANSWER_MARKER.len()..])
}

/// Marker present and followed by non-whitespace content
pub fn is_structurally_valid(text: &str) -> bool {
    marker_tail(text).is_some_and(|tail| !tail.trim().is_empty())
}

pub struct AnswerValidator {
    checker: Option<Arc<dyn GroundednessChecker>>,
}

impl AnswerValidator {
    /// Structural check only
    pub fn structural() -> Self {
        Self { checker: None }
    }

    /// Structural check plus groundedness
    pub fn with_groundedness(checker: Arc<dyn GroundednessChecker>) -> Self {
        Self {
            checker: Some(checker),
        }
    }

    pub fn check_structure(&self, answer: &AnswerResult) -> bool {
        is_structurally_valid(&answer.raw_text)
    }

    /// `None` when the check is disabled or the answer had no context
    pub async fn check_groundedness(&self, answer: &AnswerResult) -> Result<Option<Groundedness>> {
        let Some(checker) = &self.checker else {
            return Ok(None);
        };
        if !answer.has_sources() {
            return Ok(None);
        }

        let verdict = checker.check(&answer.context(), &answer.raw_text).await?;
        debug!(verdict = ?verdict, "Groundedness checked");
        Ok(Some(verdict))
    }

    /// Structurally valid and not judged ungrounded
    pub async fn is_acceptable(&self, answer: &AnswerResult) -> Result<bool> {
        if !self.check_structure(answer) {
            return Ok(false);
        }
        Ok(self
            .check_groundedness(answer)
            .await?
            .map_or(true, |verdict| verdict.is_grounded()))
    }
}
