//! Offline evaluation of the answering pipeline against a labelled question set.
//!
//! Scores are lexical recalls against the reference answer: the share of its
//! distinct words (longer than two chars, lowercased) found in the retrieved
//! context and in the generated answer.

use crate::traits::Answerer;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid evaluation data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvalCase {
    pub question: String,
    pub ground_truth: String,
}

pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>, EvaluationError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
    pub context_recall: f64,
    pub answer_recall: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "elapsed_ms")]
    pub elapsed: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub records: Vec<EvalRecord>,
    pub answered: usize,
    pub failed: usize,
    /// Means over answered questions only.
    pub mean_context_recall: f64,
    pub mean_answer_recall: f64,
}

impl EvaluationReport {
    pub fn save(&self, path: &Path) -> Result<(), EvaluationError> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Asks every question in order, one at a time.
///
/// A failed question is recorded with its error and zero scores; it does not
/// stop the run.
pub async fn evaluate<A>(answerer: &A, cases: &[EvalCase]) -> EvaluationReport
where
    A: Answerer + ?Sized,
{
    let mut records = Vec::with_capacity(cases.len());

    for (position, case) in cases.iter().enumerate() {
        let started = Instant::now();
        let outcome = answerer.answer(&case.question).await;
        let elapsed = started.elapsed();

        let record = match outcome {
            Ok(result) => {
                let context_recall = token_recall(&case.ground_truth, &result.contexts.join("\n"));
                let answer_recall = token_recall(&case.ground_truth, &result.answer);
                info!(
                    case = position,
                    context_recall,
                    answer_recall,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "evaluated question"
                );
                EvalRecord {
                    question: case.question.clone(),
                    answer: result.answer,
                    contexts: result.contexts,
                    ground_truth: case.ground_truth.clone(),
                    context_recall,
                    answer_recall,
                    elapsed,
                    error: None,
                }
            }
            Err(error) => {
                warn!(case = position, error = %error, "question failed");
                EvalRecord {
                    question: case.question.clone(),
                    answer: String::new(),
                    contexts: Vec::new(),
                    ground_truth: case.ground_truth.clone(),
                    context_recall: 0.0,
                    answer_recall: 0.0,
                    elapsed,
                    error: Some(error.to_string()),
                }
            }
        };
        records.push(record);
    }

    summarize(records)
}

fn summarize(records: Vec<EvalRecord>) -> EvaluationReport {
    let answered: Vec<&EvalRecord> = records.iter().filter(|record| record.error.is_none()).collect();
    let mean = |score: fn(&EvalRecord) -> f64| {
        if answered.is_empty() {
            0.0
        } else {
            answered.iter().map(|record| score(record)).sum::<f64>() / answered.len() as f64
        }
    };

    let mean_context_recall = mean(|record| record.context_recall);
    let mean_answer_recall = mean(|record| record.answer_recall);
    let answered = answered.len();

    EvaluationReport {
        failed: records.len() - answered,
        answered,
        mean_context_recall,
        mean_answer_recall,
        records,
    }
}

fn significant_words(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Share of the reference's significant words that occur in `candidate`.
/// A reference without significant words scores zero.
pub fn token_recall(reference: &str, candidate: &str) -> f64 {
    let expected = significant_words(reference);
    if expected.is_empty() {
        return 0.0;
    }
    let found = significant_words(candidate);
    let hits = expected.iter().filter(|word| found.contains(*word)).count();
    hits as f64 / expected.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::RagAnswer;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;

    struct ScriptedAnswerer;

    #[async_trait]
    impl Answerer for ScriptedAnswerer {
        async fn answer(&self, question: &str) -> Result<RagAnswer, PipelineError> {
            if question.contains("fail") {
                return Err(PipelineError::Timeout(Duration::from_secs(1)));
            }
            Ok(RagAnswer {
                answer: "The Lakers won the championship.".to_string(),
                contexts: vec!["the lakers won the 2020 championship in orlando.".to_string()],
            })
        }
    }

    #[test]
    fn recall_counts_distinct_significant_words() {
        assert_eq!(token_recall("Lakers won", "lakers celebrated"), 0.5);
        assert_eq!(token_recall("Lakers lakers LAKERS", "the lakers"), 1.0);
        assert_eq!(token_recall("a an", "anything"), 0.0);
    }

    #[tokio::test]
    async fn failed_questions_do_not_skew_means() {
        let cases = vec![
            EvalCase {
                question: "Who won?".to_string(),
                ground_truth: "The Lakers won the 2020 championship.".to_string(),
            },
            EvalCase {
                question: "please fail".to_string(),
                ground_truth: "anything".to_string(),
            },
        ];

        let report = evaluate(&ScriptedAnswerer, &cases).await;

        assert_eq!(report.answered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.records[0].context_recall, 1.0);
        assert_eq!(report.records[0].answer_recall, 0.8);
        assert_eq!(report.mean_context_recall, 1.0);
        assert!(report.records[1].error.is_some());
    }

    #[test]
    fn cases_load_from_json_and_report_saves() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("eval_data.json");
        fs::write(
            &data,
            r#"[{"question": "Who won?", "ground_truth": "The Lakers."}]"#,
        )?;

        let cases = load_cases(&data)?;
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].ground_truth, "The Lakers.");

        let report = summarize(vec![EvalRecord {
            question: "Who won?".to_string(),
            answer: "Lakers".to_string(),
            contexts: Vec::new(),
            ground_truth: "The Lakers.".to_string(),
            context_recall: 0.0,
            answer_recall: 0.5,
            elapsed: Duration::from_millis(1500),
            error: None,
        }]);
        let output = dir.path().join("report.json");
        report.save(&output)?;

        let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output)?)?;
        assert_eq!(saved["records"][0]["elapsed_ms"], 1500);
        assert_eq!(saved["mean_answer_recall"], 0.5);
        Ok(())
    }
}
