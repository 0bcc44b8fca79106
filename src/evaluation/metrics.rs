//! Classification metrics over expected/predicted label pairs.
//!
//! Labels are compared as plain strings so that expected labels outside the
//! three classes still count against accuracy. Per-class figures and the
//! confusion matrix only consider the three known classes, in
//! [`Sentiment::EVALUATION_ORDER`].

use std::fmt;

use crate::agent::Sentiment;

const CLASSES: usize = Sentiment::EVALUATION_ORDER.len();

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub label: Sentiment,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub per_class: [ClassMetrics; CLASSES],
    /// Rows are expected classes, columns predicted ones.
    pub confusion: [[usize; CLASSES]; CLASSES],
}

fn class_index(label: &str) -> Option<usize> {
    Sentiment::EVALUATION_ORDER
        .iter()
        .position(|s| s.as_str() == label)
}

// A zero denominator yields zero.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl Report {
    /// Compute metrics from `(expected, predicted)` pairs.
    pub fn compute<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut total = 0;
        let mut correct = 0;
        let mut confusion = [[0usize; CLASSES]; CLASSES];
        // Supports and predicted counts include rows whose other side falls
        // outside the matrix.
        let mut supports = [0usize; CLASSES];
        let mut predicted_counts = [0usize; CLASSES];

        for (expected, predicted) in pairs {
            total += 1;
            if expected == predicted {
                correct += 1;
            }
            let row = class_index(expected);
            let col = class_index(predicted);
            if let Some(row) = row {
                supports[row] += 1;
            }
            if let Some(col) = col {
                predicted_counts[col] += 1;
            }
            if let (Some(row), Some(col)) = (row, col) {
                confusion[row][col] += 1;
            }
        }

        Self {
            total,
            correct,
            accuracy: ratio(correct, total),
            per_class: std::array::from_fn(|i| {
                let tp = confusion[i][i];
                let support = supports[i];
                let precision = ratio(tp, predicted_counts[i]);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    label: Sentiment::EVALUATION_ORDER[i],
                    precision,
                    recall,
                    f1,
                    support,
                }
            }),
            confusion,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overall Accuracy: {:.2}%", self.accuracy * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Per-Class Metrics:")?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:<8} Precision:{:.2} Recall:{:.2} F1:{:.2} Support:{}",
                m.label.as_str(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion Matrix:")?;

        let width = self
            .confusion
            .iter()
            .flatten()
            .map(|n| n.to_string().len())
            .max()
            .unwrap_or(1);
        for (i, row) in self.confusion.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|n| format!("{n:>width$}")).collect();
            let open = if i == 0 { "[[" } else { " [" };
            let close = if i + 1 == CLASSES { "]]" } else { "]" };
            writeln!(f, "{open}{}{close}", cells.join(" "))?;
        }
        Ok(())
    }
}
