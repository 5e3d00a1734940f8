//! Groundedness checking
//!
//! Asks an external judge whether an answer is supported by its context.

use super::{ChatClient, ChatMessage};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Judge verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Groundedness {
    Grounded,
    NotGrounded,
    Inconclusive,
}

impl Groundedness {
    /// Parse a judge response (`grounded`, `notGrounded`, `notSure`)
    pub fn parse(text: &str) -> Self {
        let normalized: String = text
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "grounded" => Groundedness::Grounded,
            "notgrounded" => Groundedness::NotGrounded,
            _ => Groundedness::Inconclusive,
        }
    }

    /// Only `Grounded` passes
    pub fn is_grounded(&self) -> bool {
        matches!(self, Groundedness::Grounded)
    }
}

#[async_trait]
pub trait GroundednessChecker: Send + Sync {
    async fn check(&self, context: &str, answer: &str) -> Result<Groundedness>;
}

/// Upstage groundedness-check model over the chat endpoint
pub struct UpstageGroundednessChecker {
    client: Arc<ChatClient>,
    model: String,
}

impl UpstageGroundednessChecker {
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl GroundednessChecker for UpstageGroundednessChecker {
    async fn check(&self, context: &str, answer: &str) -> Result<Groundedness> {
        let messages = [ChatMessage::user(context), ChatMessage::assistant(answer)];
        let verdict = self.client.chat(&self.model, &messages).await?;
        Ok(Groundedness::parse(&verdict))
    }
}

/// Fixed-verdict checker for tests
pub struct MockGroundednessChecker {
    verdict: Groundedness,
    calls: AtomicUsize,
}

impl MockGroundednessChecker {
    pub fn new(verdict: Groundedness) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroundednessChecker for MockGroundednessChecker {
    async fn check(&self, _context: &str, _answer: &str) -> Result<Groundedness> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}
