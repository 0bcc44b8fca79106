//! Sentiment service: turns free text into a [`Prediction`].
//!
//! The service never fails. Empty input and classifier errors both come back
//! as neutral with zero confidence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, LabelNames, Result};
use crate::pipelines::sentiment::{RawSentiment, SentimentAnalysisModel, SentimentAnalysisPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    /// Class order used by evaluation reports and the confusion matrix.
    pub const EVALUATION_ORDER: [Sentiment; 3] =
        [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }

    /// Name configured for this class.
    pub fn display_name<'a>(&self, labels: &'a LabelNames) -> &'a str {
        match self {
            Sentiment::Negative => &labels.negative,
            Sentiment::Neutral => &labels.neutral,
            Sentiment::Positive => &labels.positive,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "positive" => Ok(Sentiment::Positive),
            other => Err(AgentError::Inference(format!("unknown sentiment '{other}'"))),
        }
    }
}

/// Raw classifier labels and the class each one stands for.
///
/// Each row accepts the generic `LABEL_<n>` name as well as the name a
/// checkpoint's `id2label` gives the same class.
const LABEL_TABLE: [(&str, &str, Sentiment); 3] = [
    ("LABEL_0", "negative", Sentiment::Negative),
    ("LABEL_1", "neutral", Sentiment::Neutral),
    ("LABEL_2", "positive", Sentiment::Positive),
];

/// Map a raw classifier label onto a [`Sentiment`]; unknown labels are neutral.
pub fn map_label(raw: &str) -> Sentiment {
    let raw = raw.trim();
    LABEL_TABLE
        .iter()
        .find(|(generic, named, _)| {
            raw.eq_ignore_ascii_case(generic) || raw.eq_ignore_ascii_case(named)
        })
        .map_or(Sentiment::Neutral, |(_, _, sentiment)| *sentiment)
}

/// Convert a probability into a percentage rounded to two decimals.
pub fn confidence_percent(probability: f32) -> f64 {
    let percent = (f64::from(probability) * 100.0).clamp(0.0, 100.0);
    if percent.is_nan() {
        return 0.0;
    }
    (percent * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model_output: Sentiment,
    /// Percentage in `[0, 100]`, two decimals.
    pub confidence_score: f64,
}

impl Prediction {
    pub const NEUTRAL: Prediction = Prediction {
        model_output: Sentiment::Neutral,
        confidence_score: 0.0,
    };
}

/// Anything that can produce a raw label and probability for a text.
pub trait SentimentClassifier {
    fn classify(&self, text: &str) -> Result<RawSentiment>;
}

impl<M: SentimentAnalysisModel> SentimentClassifier for SentimentAnalysisPipeline<M> {
    fn classify(&self, text: &str) -> Result<RawSentiment> {
        self.predict(text)
    }
}

pub struct SentimentService<C> {
    classifier: C,
    max_chars: usize,
}

impl<C: SentimentClassifier> SentimentService<C> {
    /// `max_chars` bounds how much of each input reaches the classifier.
    pub fn new(classifier: C, max_chars: usize) -> Self {
        Self {
            classifier,
            max_chars,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn predict(&self, text: &str) -> Prediction {
        if text.is_empty() {
            return Prediction::NEUTRAL;
        }

        let text = truncate_chars(text, self.max_chars);
        match self.classifier.classify(text) {
            Ok(raw) => {
                let prediction = Prediction {
                    model_output: map_label(&raw.label),
                    confidence_score: confidence_percent(raw.score),
                };
                tracing::debug!(
                    raw_label = %raw.label,
                    sentiment = %prediction.model_output,
                    confidence = prediction.confidence_score,
                    chars = text.chars().count(),
                    "classified text"
                );
                prediction
            }
            Err(e) => {
                tracing::warn!(error = %e, "sentiment inference failed, defaulting to neutral");
                Prediction::NEUTRAL
            }
        }
    }

    /// Predict for missing input as well; `None` is neutral.
    pub fn predict_opt(&self, text: Option<&str>) -> Prediction {
        text.map_or(Prediction::NEUTRAL, |t| self.predict(t))
    }

    pub fn predict_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Prediction> {
        texts.iter().map(|t| self.predict(t.as_ref())).collect()
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
