//! End-to-end escalation scenarios against scripted models and static retrievers.

use routeqa_common::config::UnknownDestinationPolicy;
use routeqa_common::llm::{Groundedness, GroundednessChecker, MockGroundednessChecker, MockLanguageModel};
use routeqa_common::{AppError, Result};
use routeqa_context::options::ChoiceOption;
use routeqa_context::safeguard::Entry;
use routeqa_context::validator::ANSWER_MARKER;
use routeqa_context::{
    AnswerValidator, Answerer, Destination, DestinationRegistry, OptionMatcher, PromptTemplate, Router,
    SafeguardPipeline, Stage,
};
use routeqa_search::retrieval::StaticRetriever;
use std::sync::Arc;

const ROUTER_MARK: &str = "<< CANDIDATE PROMPTS >>";

struct Harness {
    pipeline: SafeguardPipeline,
    model: Arc<MockLanguageModel>,
    primary_retriever: Arc<StaticRetriever>,
}

fn route_to(name: &str) -> String {
    format!("```json\n{{\n  \"destination\": \"{}\",\n  \"next_inputs\": \"forwarded\"\n}}\n```", name)
}

/// Destination whose prompt starts with its upper-cased name
fn destination(name: &str, retriever: StaticRetriever) -> Destination {
    Destination::new(
        name,
        format!("{} questions", name),
        Arc::new(retriever),
        PromptTemplate::new(format!("{} {{context}} | {{question}}", name.to_uppercase())),
    )
}

fn harness<F>(destinations: Vec<Destination>, grounding: Option<Arc<dyn GroundednessChecker>>, responder: F) -> Harness
where
    F: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    harness_with_policy(UnknownDestinationPolicy::Safeguard, destinations, grounding, responder)
}

fn harness_with_policy<F>(
    policy: UnknownDestinationPolicy,
    destinations: Vec<Destination>,
    grounding: Option<Arc<dyn GroundednessChecker>>,
    responder: F,
) -> Harness
where
    F: Fn(&str) -> Result<String> + Send + Sync + 'static,
{
    let model = Arc::new(MockLanguageModel::new(responder));

    let mut registry = DestinationRegistry::new().with_default(destination(
        "default",
        StaticRetriever::from_texts(["default context"]),
    ));
    for d in destinations {
        registry.register(d).unwrap();
    }

    let primary_retriever = Arc::new(StaticRetriever::from_texts(["Article 12. Primary context."]));
    let primary = Destination::new(
        "primary_safeguard",
        "",
        primary_retriever.clone(),
        PromptTemplate::new("PRIMARY {context} | {question}"),
    );
    let secondary = Destination::context_free("secondary_safeguard", PromptTemplate::new("SECONDARY {question}"));

    let validator = match grounding {
        Some(checker) => AnswerValidator::with_groundedness(checker),
        None => AnswerValidator::structural(),
    };

    let pipeline = SafeguardPipeline::new(
        Router::new(model.clone(), Arc::new(registry), policy),
        Answerer::new(model.clone()),
        validator,
        OptionMatcher::new().unwrap(),
        Arc::new(primary),
        Arc::new(secondary),
    );

    Harness {
        pipeline,
        model,
        primary_retriever,
    }
}

#[tokio::test]
async fn scenario_option_recovered_without_marker() {
    let question = "(A) Paris (B) London (C) Rome\nWhat is the capital of France?";
    let h = harness(
        vec![destination("geo", StaticRetriever::from_texts(["Paris is the capital of France."]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("geo"))
            } else {
                Ok("I think it's Paris.".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer(question).await.unwrap();

    assert_eq!(outcome.text(), "I think it's Paris.\n[ANSWER]: (A) Paris");
    assert_eq!(
        outcome.answer.extracted_option,
        Some(ChoiceOption {
            letter: 'A',
            text: "Paris".to_string()
        })
    );
    assert_eq!(
        outcome.path,
        vec![Stage::RouteAndAnswer, Stage::StructuralRepair, Stage::Terminal]
    );
    assert_eq!(outcome.destination.as_deref(), Some("geo"));
    assert_eq!(h.model.call_count(), 2);
}

#[tokio::test]
async fn scenario_unregistered_destination_goes_to_primary_safeguard() {
    let h = harness(
        vec![
            destination("law", StaticRetriever::from_texts(["law context"])),
            destination("psych", StaticRetriever::from_texts(["psych context"])),
        ],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("education"))
            } else if prompt.starts_with("PRIMARY") {
                Ok("Per Article 12.\n[ANSWER]: (B) twelve credits".to_string())
            } else {
                Ok("unexpected".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("How many credits?").await.unwrap();

    assert_eq!(outcome.text(), "Per Article 12.\n[ANSWER]: (B) twelve credits");
    assert_eq!(
        outcome.path,
        vec![
            Stage::RouteAndAnswer,
            Stage::PrimarySafeguard { via: Entry::RoutingFailure },
            Stage::Terminal
        ]
    );
    assert_eq!(outcome.destination, None);
    // Safeguards answer the original question
    assert_eq!(h.primary_retriever.queries(), vec!["How many credits?".to_string()]);
}

#[tokio::test]
async fn unregistered_destination_answered_by_default_under_default_policy() {
    let h = harness_with_policy(
        UnknownDestinationPolicy::Default,
        vec![
            destination("law", StaticRetriever::from_texts(["law context"])),
            destination("psych", StaticRetriever::from_texts(["psych context"])),
        ],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("education"))
            } else if prompt.starts_with("DEFAULT") {
                Ok("From the handbook.\n[ANSWER]: (A) twelve credits".to_string())
            } else {
                Ok("unexpected".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("How many credits?").await.unwrap();

    assert_eq!(outcome.text(), "From the handbook.\n[ANSWER]: (A) twelve credits");
    assert_eq!(
        outcome.path,
        vec![Stage::RouteAndAnswer, Stage::StructuralRepair, Stage::Terminal]
    );
    assert_eq!(outcome.destination.as_deref(), Some("default"));
    let prompt = &h.model.prompts()[1];
    assert!(prompt.starts_with("DEFAULT default context"));
    assert!(prompt.ends_with("| forwarded"));
    assert!(h.primary_retriever.queries().is_empty());
}

#[tokio::test]
async fn answer_quirk_repaired_without_escalation() {
    let h = harness(
        vec![destination("philosophy", StaticRetriever::from_texts(["Hume wrote the Treatise."]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("philosophy"))
            } else {
                Ok("The empiricist.\nAnswer:\nHume".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("(A) Kant\n(B) Hume\nWho wrote the Treatise?").await.unwrap();

    assert_eq!(outcome.text(), "The empiricist.\n[ANSWER]: (B) Hume");
    assert_eq!(
        outcome.path,
        vec![Stage::RouteAndAnswer, Stage::StructuralRepair, Stage::Terminal]
    );
    assert_eq!(
        outcome.answer.extracted_option,
        Some(ChoiceOption {
            letter: 'B',
            text: "Hume".to_string()
        })
    );
    assert_eq!(h.model.call_count(), 2);
}

#[tokio::test]
async fn answer_naming_several_options_is_not_stamped() {
    let h = harness(
        vec![destination("philosophy", StaticRetriever::from_texts(["Hume wrote the Treatise."]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("philosophy"))
            } else if prompt.starts_with("SECONDARY") {
                Ok("I cannot decide between Hume and Kant.".to_string())
            } else {
                Ok("It was Hume, not Kant.".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("Who wrote the Treatise?\n(A) Kant\n(B) Hume\n").await.unwrap();

    assert_eq!(outcome.text(), "I cannot decide between Hume and Kant.");
    assert_eq!(outcome.answer.extracted_option, None);
    assert_eq!(
        outcome.path,
        vec![
            Stage::RouteAndAnswer,
            Stage::StructuralRepair,
            Stage::ContextEscalation,
            Stage::PrimarySafeguard { via: Entry::Escalation },
            Stage::SecondarySafeguard,
            Stage::Terminal
        ]
    );
}

#[tokio::test]
async fn scenario_empty_retrieval_skips_primary_safeguard() {
    let h = harness(
        vec![destination("law", StaticRetriever::empty())],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else if prompt.starts_with("SECONDARY") {
                Ok("Without context.\n[ANSWER]: (C) Hume".to_string())
            } else {
                Ok("I cannot tell from the context.".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("(A) Kant\n(B) Locke\n(C) Hume\nWho wrote the Treatise?").await.unwrap();

    assert_eq!(outcome.text(), "Without context.\n[ANSWER]: (C) Hume");
    assert!(!outcome
        .path
        .iter()
        .any(|s| matches!(s, Stage::PrimarySafeguard { .. })));
    assert!(outcome.path.contains(&Stage::SecondarySafeguard));
    assert!(h.primary_retriever.queries().is_empty());
    assert!(!outcome.answer.has_sources());
}

#[tokio::test]
async fn scenario_valid_answer_without_sources_still_escalates() {
    let h = harness(
        vec![destination("law", StaticRetriever::empty())],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else if prompt.starts_with("SECONDARY") {
                Ok("[ANSWER]: (A) from secondary".to_string())
            } else {
                Ok("[ANSWER]: (B) from law".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("q").await.unwrap();
    assert_eq!(outcome.text(), "[ANSWER]: (A) from secondary");
    assert_eq!(
        outcome.path,
        vec![
            Stage::RouteAndAnswer,
            Stage::StructuralRepair,
            Stage::ContextEscalation,
            Stage::SecondarySafeguard,
            Stage::Terminal
        ]
    );
}

#[tokio::test]
async fn primary_escalation_when_context_did_not_help() {
    let h = harness(
        vec![destination("law", StaticRetriever::from_texts(["law context"]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else if prompt.starts_with("PRIMARY") {
                Ok("[ANSWER]: (D) primary".to_string())
            } else {
                Ok("no idea".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("(A) one\n(B) two\nPick").await.unwrap();
    assert_eq!(outcome.text(), "[ANSWER]: (D) primary");
    assert_eq!(
        outcome.path,
        vec![
            Stage::RouteAndAnswer,
            Stage::StructuralRepair,
            Stage::ContextEscalation,
            Stage::PrimarySafeguard { via: Entry::Escalation },
            Stage::Terminal
        ]
    );
    // Destination saw the forwarded query
    assert!(h.model.prompts()[1].ends_with("| forwarded"));
}

#[tokio::test]
async fn malformed_answers_never_raise() {
    let h = harness(
        vec![destination("law", StaticRetriever::from_texts(["law context"]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else {
                Ok("I refuse\u{2028}to answer".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("(A) yes\n(B) no\nWell?").await.unwrap();
    assert!(!outcome.text().contains(ANSWER_MARKER));
    assert_eq!(outcome.text(), "I refuse\nto answer");
    assert_eq!(outcome.answer.extracted_option, None);
    assert_eq!(outcome.path.last(), Some(&Stage::Terminal));
    assert_eq!(outcome.path.len(), 6);
}

#[tokio::test]
async fn ungrounded_answers_escalate_through_both_safeguards() {
    let checker = Arc::new(MockGroundednessChecker::new(Groundedness::NotGrounded));
    let judge: Arc<dyn GroundednessChecker> = checker.clone();
    let h = harness(
        vec![destination("law", StaticRetriever::from_texts(["law context"]))],
        Some(judge),
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else if prompt.starts_with("SECONDARY") {
                Ok("[ANSWER]: (C) secondary".to_string())
            } else {
                Ok("[ANSWER]: (A) made up".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("q").await.unwrap();
    assert_eq!(outcome.text(), "[ANSWER]: (C) secondary");
    assert!(outcome.path.contains(&Stage::PrimarySafeguard { via: Entry::Escalation }));
    assert!(outcome.path.contains(&Stage::SecondarySafeguard));
    // Destination answer and primary answer; the context-free answer is not judged
    assert_eq!(checker.call_count(), 2);
}

#[tokio::test]
async fn garbage_router_output_uses_default() {
    let h = harness(
        vec![destination("law", StaticRetriever::from_texts(["law context"]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok("law, probably".to_string())
            } else {
                Ok("[ANSWER]: (A) default answer".to_string())
            }
        },
    );

    let outcome = h.pipeline.answer("q").await.unwrap();
    assert_eq!(outcome.destination.as_deref(), Some("default"));
    assert!(h.model.prompts()[1].starts_with("DEFAULT default context"));
}

#[tokio::test]
async fn transport_errors_propagate() {
    let h = harness(
        vec![destination("law", StaticRetriever::from_texts(["law context"]))],
        None,
        |prompt| {
            if prompt.contains(ROUTER_MARK) {
                Ok(route_to("law"))
            } else {
                Err(AppError::ModelTimeout { timeout_ms: 60_000 })
            }
        },
    );

    let err = h.pipeline.answer("q").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_fatal());
}
