//! Prompt templates
//!
//! Templates use `{name}` placeholders, substituted in a single pass so
//! retrieved text can never inject a placeholder of its own.

use routeqa_common::config::PromptKind;
use routeqa_search::RetrievedChunk;

/// Answer prompt for the university regulations destination
pub const REGULATIONS_PROMPT: &str = "\
Answer the question about the university's regulations based on the context below. You have ability to reasoning.
If not sure about the answer, solve the question without depending on the given context.
Utilize the clues provided by the speaker to logically infer their current status, and explain the reasoning behind your conclusion in 2-3 sentences.
Explain the intent behind the question.
NOTE) You MUST answer like following format at the end.

### Example of desired format:
[ANSWER]: (A) convolutional networks

### Context:
{context}

### Question:
{question}
";

/// Answer prompt for subject-domain destinations
pub const DOMAIN_PROMPT: &str = "\
Answer the question based on the context below. You have ability to reasoning.
If not sure about the answer, solve the question without depending on the given context.
Utilize the clues provided by the speaker to logically infer their current status, and explain the reasoning behind your conclusion in 2-3 sentences.
Explain the intent behind the question.
NOTE) You MUST answer like following format at the end.

### Example of desired format:
[ANSWER]: (A) convolutional networks

### Context:
{context}

### Question:
{question}
";

/// General-purpose answer prompt
pub const BASE_PROMPT: &str = "\
Answer the question based on the context below. You have ability to reasoning.
Explain the intent behind the question, then explain the reasoning behind your conclusion in 2-3 sentences.
NOTE) You MUST answer like following format at the end.

### Example of desired format:
[ANSWER]: (A) convolutional networks

### Context:
{context}

### Question:
{question}
";

/// Context-free prompt used by the secondary safeguard
pub const SAFEGUARD_PROMPT: &str = "\
Answer the question below. First, explain the intent behind the question.
You have ability to reasoning.
Infer their current status, and explain the reasoning behind your conclusion in 2-3 sentences.
You MUST answer like following format at the end.

### Example of desired format:
[ANSWER]: (A) convolutional networks

### Question:
{question}
";

/// Router prompt; `{destinations}` lists `name: description` lines
pub const ROUTER_TEMPLATE: &str = "\
Given the input, choose the most appropriate model prompt based on the provided prompt descriptions.

\"Prompt Name\": \"Prompt Description\"

<< FORMATTING >>
Return a markdown code snippet with a JSON object formatted to look like:
```json
{
    \"destination\": string \\ name of the retriever to use or \"DEFAULT\"
    \"next_inputs\": string \\ an original version of the original input
}
```

REMEMBER: \"destination\" should be chosen based on the descriptions of the available prompts, or \"DEFAULT\" if no appropriate prompt is found.
REMEMBER: \"next_inputs\" MUST be the original input.

<< CANDIDATE PROMPTS >>
{destinations}

<< INPUT >>
{input}

<< OUTPUT (remember to include the ```json)>>
";

/// Separator between retrieved chunks in a rendered context
const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn for_kind(kind: PromptKind) -> Self {
        match kind {
            PromptKind::Regulations => Self::new(REGULATIONS_PROMPT),
            PromptKind::Domain => Self::new(DOMAIN_PROMPT),
            PromptKind::Base => Self::new(BASE_PROMPT),
        }
    }

    pub fn safeguard() -> Self {
        Self::new(SAFEGUARD_PROMPT)
    }

    /// Render with a question and retrieved chunks (concatenated in retrieval order)
    pub fn render_answer(&self, question: &str, context: &[RetrievedChunk]) -> String {
        let context = join_context(context);
        render(&self.template, &[("context", &context), ("question", question)])
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Concatenate chunk contents in retrieval order
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Single-pass `{name}` substitution; unknown placeholders are kept verbatim
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });

        match replacement {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
