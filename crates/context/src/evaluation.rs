//! Accuracy reporting against gold answers

use crate::options::OptionMatcher;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub index: usize,
    pub expected: char,
    /// `None` when the answer carries no canonical option
    pub predicted: Option<char>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Questions with a usable gold letter
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub mismatches: Vec<Mismatch>,
}

/// Gold letter from `"B"`, `"(B) text"`, `"B) text"` or `"B. text"`.
///
/// A capitalized word such as `"Dolphin"` is not a letter.
pub fn gold_letter(gold: &str) -> Option<char> {
    let gold = gold.trim();
    let (rest, closers): (&str, &[char]) = match gold.strip_prefix('(') {
        Some(rest) => (rest, &[')']),
        None => (gold, &[')', '.']),
    };

    let mut chars = rest.chars();
    let letter = chars.next().filter(char::is_ascii_uppercase)?;
    match chars.next() {
        None if closers.len() == 2 => Some(letter),
        Some(c) if closers.contains(&c) => Some(letter),
        _ => None,
    }
}

/// Compare extracted option letters with gold letters, position by position
pub fn evaluate(matcher: &OptionMatcher, answers: &[String], golds: &[Option<String>]) -> EvaluationReport {
    let mut total = 0;
    let mut correct = 0;
    let mut mismatches = Vec::new();

    for (index, (answer, gold)) in answers.iter().zip(golds).enumerate() {
        let Some(expected) = gold.as_deref().and_then(gold_letter) else {
            continue;
        };
        total += 1;

        let predicted = matcher.extract(answer).map(|option| option.letter);
        if predicted == Some(expected) {
            correct += 1;
        } else {
            mismatches.push(Mismatch {
                index,
                expected,
                predicted,
            });
        }
    }

    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };

    EvaluationReport {
        total,
        correct,
        accuracy,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gold_letter() {
        assert_eq!(gold_letter("(B) Dolphin"), Some('B'));
        assert_eq!(gold_letter(" C"), Some('C'));
        assert_eq!(gold_letter("B) Dolphin"), Some('B'));
        assert_eq!(gold_letter("D. Whale"), Some('D'));
        assert_eq!(gold_letter("(A)"), Some('A'));
        assert_eq!(gold_letter("dolphin"), None);
        assert_eq!(gold_letter(""), None);
    }

    #[test]
    fn test_gold_word_is_not_a_letter() {
        assert_eq!(gold_letter("Dolphin"), None);
        assert_eq!(gold_letter("(Dolphin)"), None);
        assert_eq!(gold_letter("(B"), None);
        assert_eq!(gold_letter("A Kant"), None);
    }

    #[test]
    fn test_evaluate() {
        let matcher = OptionMatcher::new().unwrap();
        let answers = vec![
            "Because.\n[ANSWER]: (A) Paris".to_string(),
            "[ANSWER]: (C) Rome".to_string(),
            "no marker".to_string(),
            "[ANSWER]: (D) x".to_string(),
        ];
        let golds = vec![
            Some("(A) Paris".to_string()),
            Some("(B) London".to_string()),
            Some("(A)".to_string()),
            None,
        ];

        let report = evaluate(&matcher, &answers, &golds);
        assert_eq!(report.total, 3);
        assert_eq!(report.correct, 1);
        assert!((report.accuracy - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            report.mismatches,
            vec![
                Mismatch { index: 1, expected: 'B', predicted: Some('C') },
                Mismatch { index: 2, expected: 'A', predicted: None },
            ]
        );
    }
}
