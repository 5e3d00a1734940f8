//! Dataset I/O
//!
//! - questions CSV in, answers CSV out (`id,answer`), both order-preserving
//! - JSONL corpus records for indexing, with optional seeded down-sampling

use rand::rngs::StdRng;
use rand::SeedableRng;
use routeqa_common::errors::{AppError, Result};
use routeqa_search::retrieval::Metadata;
use routeqa_search::Document;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// One input question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    pub question: String,
    /// Gold answer, when the file has an answer column
    pub gold: Option<String>,
}

/// Read questions in file order.
///
/// `question_column` must exist; `answer_column` is optional.
pub fn load_questions(path: &Path, question_column: &str, answer_column: &str) -> Result<Vec<QuestionRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| AppError::Dataset {
        message: format!("{}: {}", path.display(), e),
    })?;

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);

    let question_idx = position(question_column).ok_or_else(|| AppError::Dataset {
        message: format!("{}: missing column '{}'", path.display(), question_column),
    })?;
    let answer_idx = position(answer_column);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(QuestionRecord {
            question: row.get(question_idx).unwrap_or_default().to_string(),
            gold: answer_idx
                .and_then(|i| row.get(i))
                .map(str::to_string)
                .filter(|g| !g.trim().is_empty()),
        });
    }

    info!(path = %path.display(), questions = records.len(), "Questions loaded");
    Ok(records)
}

/// Write `id,answer` rows, one per answer, ids from 0
pub fn write_answers(path: &Path, answers: &[String]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "answer"])?;
    for (id, answer) in answers.iter().enumerate() {
        writer.write_record([id.to_string().as_str(), answer.as_str()])?;
    }
    writer.flush()?;

    info!(path = %path.display(), answers = answers.len(), "Answers written");
    Ok(())
}

#[derive(Deserialize)]
struct CorpusRecord {
    text: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

/// Read a JSONL corpus; blank lines are skipped
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let file = File::open(path).map_err(|e| AppError::Dataset {
        message: format!("{}: {}", path.display(), e),
    })?;

    let mut documents = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: CorpusRecord = serde_json::from_str(&line).map_err(|e| AppError::Dataset {
            message: format!("{}:{}: {}", path.display(), line_no + 1, e),
        })?;

        let mut document = Document::new(record.text);
        document.metadata = record.metadata;
        if let Some(id) = record.id {
            document.metadata.insert("source_id".into(), id.into());
        }
        documents.push(document);
    }

    info!(path = %path.display(), records = documents.len(), "Corpus loaded");
    Ok(documents)
}

/// Uniformly keep `n` records without replacement, in their original order
pub fn sample_records<T>(records: Vec<T>, n: usize, seed: u64) -> Vec<T> {
    if n >= records.len() {
        return records;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = vec![false; records.len()];
    for i in rand::seq::index::sample(&mut rng, records.len(), n).iter() {
        keep[i] = true;
    }

    debug!(from = records.len(), to = n, seed, "Corpus sampled");
    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then_some(record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_questions_with_gold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testset.csv");
        std::fs::write(
            &path,
            "prompts,answers\n\"(A) Paris (B) Rome\nCapital of France?\",(A) Paris\nNo gold,\n",
        )
        .unwrap();

        let records = load_questions(&path, "prompts", "answers").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "(A) Paris (B) Rome\nCapital of France?");
        assert_eq!(records[0].gold.as_deref(), Some("(A) Paris"));
        assert_eq!(records[1].gold, None);
    }

    #[test]
    fn test_missing_question_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "text\nhello\n").unwrap();
        let err = load_questions(&path, "prompts", "answers").unwrap_err();
        assert!(err.to_string().contains("prompts"));
    }

    #[test]
    fn test_write_answers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/answers.csv");
        let answers = vec!["[ANSWER]: (A) x".to_string(), "multi\nline".to_string()];
        write_answers(&path, &answers).unwrap();

        let records = load_questions(&path, "answer", "id").unwrap();
        assert_eq!(records[1].question, "multi\nline");
        assert_eq!(records[1].gold.as_deref(), Some("1"));
    }

    #[test]
    fn test_load_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("law.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, r#"{{"text": "A tort is a civil wrong.", "id": "q1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"text": "Contracts need consideration.", "metadata": {{"subject": "law"}}}}"#).unwrap();

        let documents = load_corpus(&path).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].metadata["source_id"], "q1");
        assert_eq!(documents[1].metadata["subject"], "law");
    }

    #[test]
    fn test_corpus_bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"text\": \"ok\"}\nnot json\n").unwrap();
        let err = load_corpus(&path).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_sampling_is_seeded_and_ordered() {
        let records: Vec<u32> = (0..100).collect();
        let a = sample_records(records.clone(), 10, 42);
        let b = sample_records(records.clone(), 10, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_records(records, 500, 1).len(), 100);
    }
}
