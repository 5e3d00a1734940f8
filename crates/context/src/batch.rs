//! Batch runner
//!
//! Runs every question through the safeguard pipeline and returns answers
//! parallel to the input. Questions are independent, so `concurrency > 1`
//! overlaps them; results are still emitted in input order.

use crate::safeguard::SafeguardPipeline;
use futures::stream::{self, StreamExt};
use routeqa_common::config::{ErrorPolicy, PipelineConfig};
use routeqa_common::errors::{ErrorCode, Result};
use routeqa_common::metrics::QuestionTimer;
use serde::Serialize;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Question that produced a placeholder instead of an answer
#[derive(Debug, Clone, Serialize)]
pub struct FailedQuestion {
    pub index: usize,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One per input question, same order
    pub answers: Vec<String>,
    pub failures: Vec<FailedQuestion>,
}

pub struct BatchRunner {
    pipeline: Arc<SafeguardPipeline>,
    on_error: ErrorPolicy,
    placeholder: String,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<SafeguardPipeline>, config: &PipelineConfig) -> Self {
        Self {
            pipeline,
            on_error: config.on_error,
            placeholder: config.error_placeholder.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Answer all questions.
    ///
    /// Configuration errors always stop the batch. Other failures stop it
    /// under `ErrorPolicy::Abort`, and are otherwise recorded and replaced by
    /// the placeholder.
    pub async fn run(&self, questions: &[String]) -> Result<BatchReport> {
        info!(
            questions = questions.len(),
            concurrency = self.concurrency,
            "Batch started"
        );

        let pipeline = &self.pipeline;
        let mut results = pin!(stream::iter(questions.iter().enumerate())
            .map(|(index, question)| async move {
                let timer = QuestionTimer::start();
                let result = pipeline
                    .answer(question)
                    .instrument(info_span!("question", question_index = index))
                    .await;
                (index, result, timer)
            })
            .buffered(self.concurrency));

        let mut report = BatchReport::default();
        while let Some((index, result, timer)) = results.next().await {
            match result {
                Ok(outcome) => {
                    timer.finish("answered");
                    debug!(
                        question_index = index,
                        destination = ?outcome.destination,
                        stages = outcome.path.len(),
                        "Question answered"
                    );
                    report.answers.push(outcome.answer.raw_text);
                }
                Err(e) if e.is_fatal() || self.on_error == ErrorPolicy::Abort => {
                    timer.finish("aborted");
                    error!(question_index = index, error = %e, code = ?e.code(), "Batch aborted");
                    return Err(e);
                }
                Err(e) => {
                    timer.finish("skipped");
                    warn!(question_index = index, error = %e, code = ?e.code(), "Question skipped");
                    report.answers.push(self.placeholder.clone());
                    report.failures.push(FailedQuestion {
                        index,
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            answered = report.answers.len() - report.failures.len(),
            skipped = report.failures.len(),
            "Batch finished"
        );
        Ok(report)
    }
}
