//! Built-in destinations
//!
//! Used when the configuration lists no destinations of its own.

use routeqa_common::config::{DestinationConfig, PromptKind, RetrieverKind};
use std::path::PathBuf;

/// Name of the university regulations destination
pub const REGULATIONS: &str = "regulations_retriever";

const REGULATIONS_DESCRIPTION: &str = "for the university's rules and regulations; \
the departments, curricula, admission, graduation, rewards and punishments, general provisions, \
affiliated institutions, academic administration, credits, grades, student activities and \
administrative procedures of the university. A university is an institution of higher (or tertiary) \
education (undergraduate and postgraduate programs) and research which awards academic degrees \
in several academic disciplines(majors).";

const SUBJECTS: &[(&str, &str, &str)] = &[
    (
        "law_retriever",
        "law.json",
        "An expert for law; a set of rules that are created and are enforceable by social or \
governmental institutions to regulate behavior, with its precise definition a matter of \
longstanding debate. law is a system of rules established by governing authorities to regulate \
behavior, maintain order, and resolve disputes. Not related with university rules",
    ),
    (
        "psychology_retriever",
        "psychology.json",
        "An expert for psychology; the scientific study of mind and behavior. Its subject matter \
includes the behavior of humans and nonhumans, both conscious and unconscious phenomena, and \
mental processes such as thoughts, feelings, and motives. psychology is the scientific study of \
the mind and behavior, exploring how individuals think, feel, and act. Not related with university rules",
    ),
    (
        "philosophy_retriever",
        "philosophy.json",
        "An expert for philosophy; a systematic study of general and fundamental questions \
concerning topics like existence, reason, knowledge, value, mind, and language. It is a rational \
and critical inquiry that reflects on its own methods and assumptions. Philosophy is the study of \
fundamental questions regarding existence, knowledge, ethics, and reason. Not related with university rules",
    ),
    (
        "business_retriever",
        "business.json",
        "An expert for business; the practice of making one's living or making money by producing \
or buying and selling products (such as goods and services). It is also 'any activity or \
enterprise entered into for profit.' business involves the creation, management, and operation \
of organizations that provide goods or services for profit. Not related with university rules",
    ),
    (
        "history_retriever",
        "history.json",
        "An expert for history; the systematic study and documentation of the human past. history \
is the study of past events and societies, examining how they have shaped the present and future. \
Human history is the record of humankind from prehistory to the present. Not related with university rules",
    ),
];

/// Regulations first, then the subject domains
pub fn builtin_destinations() -> Vec<DestinationConfig> {
    let mut destinations = vec![DestinationConfig {
        name: REGULATIONS.to_string(),
        description: REGULATIONS_DESCRIPTION.to_string(),
        index_path: PathBuf::from("regulations.json"),
        kind: RetrieverKind::Dense,
        prompt: PromptKind::Regulations,
        threshold: None,
        top_k: None,
    }];

    destinations.extend(SUBJECTS.iter().map(|(name, path, description)| DestinationConfig {
        name: name.to_string(),
        description: description.to_string(),
        index_path: PathBuf::from(path),
        kind: RetrieverKind::Dense,
        prompt: PromptKind::Domain,
        threshold: None,
        top_k: None,
    }));

    destinations
}
