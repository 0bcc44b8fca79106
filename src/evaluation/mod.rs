//! Offline evaluation of the sentiment service against labelled CSV data.
//!
//! CSV layout: `text, expected_sentiment, model_output, confidence_score`.
//! Only the first two are required on input.

pub mod interactive;
pub mod metrics;

use std::fs::OpenOptions;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{Prediction, SentimentClassifier, SentimentService};
use crate::core::{AgentError, Result};

pub use metrics::{ClassMetrics, Report};

pub const DEFAULT_INPUT: &str = "sentiment_test_cases_2025.csv";
pub const DEFAULT_OUTPUT: &str = "output_sentiment_test.csv";

const REQUIRED_COLUMNS: [&str; 2] = ["text", "expected_sentiment"];

/// Canonical form of an expected label.
///
/// Lowercased and trimmed; common synonyms collapse onto
/// `positive`/`neutral`/`negative` and anything else passes through.
pub fn normalize_sentiment(label: &str) -> String {
    let label = label.trim().to_lowercase();
    match label.as_str() {
        "positive" | "pos" | "1" => "positive".into(),
        "negative" | "neg" | "0" => "negative".into(),
        "neutral" | "neut" | "2" => "neutral".into(),
        _ => label,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    /// `None` for an empty cell.
    pub text: Option<String>,
    #[serde(default)]
    pub expected_sentiment: String,
    #[serde(default)]
    pub model_output: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl EvaluationRow {
    /// An unlabelled row, as produced by interactive mode.
    pub fn unlabelled(text: &str, prediction: Prediction) -> Self {
        let mut row = Self {
            text: Some(text.to_string()),
            expected_sentiment: String::new(),
            model_output: String::new(),
            confidence_score: None,
        };
        row.record(prediction);
        row
    }

    pub fn record(&mut self, prediction: Prediction) {
        self.model_output = prediction.model_output.as_str().to_string();
        self.confidence_score = Some(prediction.confidence_score);
    }
}

pub fn load_rows(path: &Path) -> Result<Vec<EvaluationRow>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(AgentError::Dataset(format!(
                "{}: missing required column '{column}'",
                path.display()
            )));
        }
    }

    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<EvaluationRow>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "loaded evaluation rows");
    Ok(rows)
}

/// Write `rows` to `path`, replacing any existing file.
pub fn write_rows(path: &Path, rows: &[EvaluationRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Append `rows` to `path`; the header is written only to a new or empty file.
pub fn append_rows(path: &Path, rows: &[EvaluationRow]) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let write_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rows: Vec<EvaluationRow>,
    pub report: Report,
}

/// Classify every row in place and score against normalized expectations.
pub fn evaluate_rows<C: SentimentClassifier>(
    service: &SentimentService<C>,
    rows: &mut [EvaluationRow],
) -> Report {
    for row in rows.iter_mut() {
        row.record(service.predict_opt(row.text.as_deref()));
    }

    let expected: Vec<String> = rows
        .iter()
        .map(|row| normalize_sentiment(&row.expected_sentiment))
        .collect();
    Report::compute(
        expected
            .iter()
            .zip(rows.iter())
            .map(|(e, row)| (e.as_str(), row.model_output.as_str())),
    )
}

/// Load `input`, classify it, save the annotated rows to `output` and return
/// the metrics.
///
/// The output keeps each row's expected label as written in the input.
pub fn run_batch<C: SentimentClassifier>(
    service: &SentimentService<C>,
    input: &Path,
    output: &Path,
) -> Result<Evaluation> {
    let mut rows = load_rows(input)?;
    info!(input = %input.display(), rows = rows.len(), "running batch evaluation");

    let report = evaluate_rows(service, &mut rows);
    write_rows(output, &rows)?;
    info!(
        output = %output.display(),
        accuracy = report.accuracy,
        "batch evaluation complete"
    );

    Ok(Evaluation { rows, report })
}
