use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = if tp + fp > 0 {
            tp as f32 / (tp + fp) as f32
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f32 / (tp + fn_) as f32
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f32,
    pub accuracy: f32,
    pub normal: ClassMetrics,
    pub anomaly: ClassMetrics,
    /// Rows = actual {normal, anomaly}, columns = predicted {normal, anomaly}.
    pub confusion: [[usize; 2]; 2],
}

/// Applies the calibrated threshold to the error vector: anomaly iff
/// `error > threshold` (strict; a record at exactly the threshold is normal).
pub fn evaluate(errors: &[f32], threshold: f32, truth: &[u8]) -> EvaluationReport {
    let mut confusion = [[0usize; 2]; 2];

    for (&error, &actual) in errors.iter().zip(truth.iter()) {
        let predicted = usize::from(error > threshold);
        confusion[usize::from(actual == 1)][predicted] += 1;
    }

    let [[tn, fp], [fn_, tp]] = confusion;
    let total = tn + fp + fn_ + tp;
    let accuracy = if total > 0 {
        (tp + tn) as f32 / total as f32
    } else {
        0.0
    };

    EvaluationReport {
        threshold,
        accuracy,
        normal: ClassMetrics::from_counts(tn, fn_, fp),
        anomaly: ClassMetrics::from_counts(tp, fp, fn_),
        confusion,
    }
}

impl EvaluationReport {
    pub fn print_report(&self) {
        println!("\n=== Evaluation Report ===");
        println!("Threshold: {:.6}", self.threshold);
        println!(
            "Accuracy: {:.4} ({:.2}%)",
            self.accuracy,
            self.accuracy * 100.0
        );
        for (name, metrics) in [("normal", &self.normal), ("anomaly", &self.anomaly)] {
            println!(
                "{:>8}: precision={:.4} recall={:.4} f1={:.4} support={}",
                name, metrics.precision, metrics.recall, metrics.f1, metrics.support
            );
        }
        println!("\nConfusion matrix (rows=actual, cols=predicted):");
        println!("              normal  anomaly");
        println!("  normal  {:>8} {:>8}", self.confusion[0][0], self.confusion[0][1]);
        println!("  anomaly {:>8} {:>8}", self.confusion[1][0], self.confusion[1][1]);
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
