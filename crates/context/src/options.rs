//! Multiple-choice option recovery
//!
//! Recovers a canonical `[ANSWER]: (L) text` answer by matching the model's
//! output against the `(L) text` options embedded in the question.

use crate::validator::{marker_tail, ANSWER_MARKER};
use regex_lite::Regex;
use routeqa_common::errors::{AppError, Result};
use serde::Serialize;
use tracing::debug;

/// `(L)` followed by whitespace, letters A-Z
const OPTION_PATTERN: &str = r"\(([A-Z])\)\s";
/// Canonical option at the start of an answer tail
const CANONICAL_PATTERN: &str = r"^\(([A-Z])\)\s*(.*)$";
/// Known model quirk standing in for the marker
const ANSWER_QUIRK: &str = "Answer:\n";
const LINE_SEPARATOR: char = '\u{2028}';

/// One lettered option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub letter: char,
    pub text: String,
}

pub struct OptionMatcher {
    option_re: Regex,
    canonical_re: Regex,
}

impl OptionMatcher {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AppError::Internal {
                message: format!("Invalid option pattern {}: {}", pattern, e),
            })
        };
        Ok(Self {
            option_re: compile(OPTION_PATTERN)?,
            canonical_re: compile(CANONICAL_PATTERN)?,
        })
    }

    /// Options in order of appearance.
    ///
    /// Each option's text runs to the next option on the same line, or to
    /// the end of the line. Options with empty text are dropped.
    pub fn parse_options(&self, question: &str) -> Vec<ChoiceOption> {
        let mut options = Vec::new();

        for line in question.split(['\n', LINE_SEPARATOR]) {
            let labels: Vec<(usize, usize, char)> = self
                .option_re
                .captures_iter(line)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let letter = caps.get(1)?.as_str().chars().next()?;
                    Some((whole.start(), whole.end(), letter))
                })
                .collect();

            for (i, &(_, text_start, letter)) in labels.iter().enumerate() {
                let text_end = labels.get(i + 1).map_or(line.len(), |next| next.0);
                let text = line[text_start..text_end].trim();
                if !text.is_empty() {
                    options.push(ChoiceOption {
                        letter,
                        text: text.to_string(),
                    });
                }
            }
        }

        options
    }

    /// The canonical option after the last marker, if any
    pub fn extract(&self, answer: &str) -> Option<ChoiceOption> {
        let tail = marker_tail(answer)?.trim_start();
        let first_line = tail.split(['\n', LINE_SEPARATOR]).next()?;
        let caps = self.canonical_re.captures(first_line.trim_end())?;
        Some(ChoiceOption {
            letter: caps.get(1)?.as_str().chars().next()?,
            text: caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
        })
    }

    /// First option (question order) the candidate starts with.
    ///
    /// Failing that, the option named as a whole phrase inside the candidate,
    /// but only when exactly one option is named. An answer naming several
    /// options stays unmatched.
    pub fn match_option<'a>(&self, candidate: &str, options: &'a [ChoiceOption]) -> Option<&'a ChoiceOption> {
        let squeezed = squeeze(candidate);

        let prefixed = options.iter().find(|option| {
            let text = option.text.trim();
            candidate.starts_with(text) || squeezed.starts_with(&squeeze(text))
        });
        if prefixed.is_some() {
            return prefixed;
        }

        let mut named = options
            .iter()
            .filter(|option| contains_phrase(candidate, option.text.trim()));
        match (named.next(), named.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Rewrite `answer` into canonical form using the question's options.
    ///
    /// Answers already carrying a canonical option are returned unchanged.
    /// When nothing matches, the answer comes back with line separators
    /// normalized and still lacking a canonical option.
    pub fn repair(&self, question: &str, answer: &str) -> String {
        let answer = if answer.contains(ANSWER_QUIRK) {
            answer.replace(ANSWER_QUIRK, &format!("{} ", ANSWER_MARKER))
        } else {
            answer.to_string()
        };

        if self.extract(&answer).is_some() {
            return answer;
        }

        let options = self.parse_options(question);
        let candidate = marker_tail(&answer).unwrap_or(&answer).trim();

        match self.match_option(candidate, &options) {
            Some(option) => {
                debug!(letter = %option.letter, "Option recovered from answer");
                let canonical = format!("{} ({}) {}", ANSWER_MARKER, option.letter, option.text);
                match answer.rfind(ANSWER_MARKER) {
                    Some(pos) => format!("{}{}", &answer[..pos], canonical),
                    None => format!("{}\n{}", answer.trim_end(), canonical),
                }
            }
            None => answer.replace(LINE_SEPARATOR, "\n"),
        }
    }
}

/// Remove every whitespace character
fn squeeze(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `needle` occurs in `haystack` with no alphanumeric neighbor on either side
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
