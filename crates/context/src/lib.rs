//! RouteQA Context Engine
//!
//! Question answering over routed retrievers:
//! - Prompt templates and the single-call `Answerer`
//! - Structural and groundedness validation
//! - Multiple-choice option recovery
//! - LLM-driven routing over a destination registry
//! - The safeguard escalation pipeline and batch runner
//! - Dataset I/O, index building, and evaluation

pub mod answer;
pub mod batch;
pub mod bootstrap;
pub mod catalog;
pub mod dataset;
pub mod evaluation;
pub mod indexer;
pub mod options;
pub mod prompt;
pub mod router;
pub mod safeguard;
pub mod validator;

pub use answer::{AnswerResult, Answerer, Destination};
pub use batch::{BatchReport, BatchRunner, FailedQuestion};
pub use options::{ChoiceOption, OptionMatcher};
pub use prompt::PromptTemplate;
pub use router::{DestinationRegistry, Router, RouterDecision};
pub use safeguard::{PipelineOutcome, SafeguardPipeline, Stage};
pub use validator::AnswerValidator;
