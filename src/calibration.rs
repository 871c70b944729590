use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::LabelEncoder;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Name of the ground-truth class representing non-anomalous telemetry.
    /// When unset, the class list is searched for a name containing
    /// "normal"; if that also fails the first class is used and a warning is
    /// emitted.
    pub normal_class: Option<String>,
}

/// Resolves the class code denoting "normal" telemetry. An explicitly
/// configured name must exist in the encoder; inference falls back from
/// substring search to the first class.
pub fn resolve_normal_class(encoder: &LabelEncoder, configured: Option<&str>) -> Result<usize> {
    if encoder.is_empty() {
        bail!("label encoder has no classes");
    }

    if let Some(name) = configured {
        return match encoder
            .classes
            .iter()
            .position(|class| class.eq_ignore_ascii_case(name))
        {
            Some(code) => Ok(code),
            None => bail!("configured normal class '{}' not found in label encoder", name),
        };
    }

    if let Some(code) = encoder
        .classes
        .iter()
        .position(|class| class.to_lowercase().contains("normal"))
    {
        return Ok(code);
    }

    log::warn!(
        "no class name contains 'normal'; falling back to first class '{}' — \
         verify this is the intended baseline",
        encoder.classes[0]
    );
    Ok(0)
}

/// `1` where the record's class code differs from the normal code, else `0`.
pub fn binary_ground_truth(labels: &[usize], normal_code: usize) -> Vec<u8> {
    labels
        .iter()
        .map(|&code| u8::from(code != normal_code))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct PrPoint {
    pub threshold: f32,
    pub precision: f32,
    pub recall: f32,
}

impl PrPoint {
    pub fn f1(&self) -> f32 {
        if self.precision + self.recall == 0.0 {
            0.0
        } else {
            2.0 * self.precision * self.recall / (self.precision + self.recall)
        }
    }
}

/// Precision/recall at every distinct error value, ascending. A record is
/// predicted positive when its error is >= the candidate threshold.
pub fn precision_recall_sweep(errors: &[f32], truth: &[u8]) -> Vec<PrPoint> {
    let mut candidates: Vec<f32> = errors.to_vec();
    candidates.sort_by(f32::total_cmp);
    candidates.dedup();

    let actual_positives = truth.iter().filter(|&&t| t == 1).count();

    candidates
        .into_iter()
        .map(|threshold| {
            let mut tp = 0usize;
            let mut predicted_positives = 0usize;
            for (&error, &label) in errors.iter().zip(truth.iter()) {
                if error >= threshold {
                    predicted_positives += 1;
                    if label == 1 {
                        tp += 1;
                    }
                }
            }

            let precision = if predicted_positives > 0 {
                tp as f32 / predicted_positives as f32
            } else {
                0.0
            };
            let recall = if actual_positives > 0 {
                tp as f32 / actual_positives as f32
            } else {
                0.0
            };

            PrPoint {
                threshold,
                precision,
                recall,
            }
        })
        .collect()
}

/// Selects the error threshold maximizing F1 over the precision/recall
/// sweep. Points where precision and recall are both zero are discarded; if
/// nothing survives, the median error is used instead. An empty error
/// vector has no score distribution to sweep and is rejected.
pub fn calibrate(errors: &[f32], truth: &[u8]) -> Result<f32> {
    if errors.is_empty() {
        bail!("cannot calibrate a threshold from an empty error vector");
    }

    let points = precision_recall_sweep(errors, truth);
    let valid: Vec<PrPoint> = points
        .into_iter()
        .filter(|p| p.precision != 0.0 || p.recall != 0.0)
        .collect();

    if valid.is_empty() {
        log::warn!(
            "degenerate precision/recall sweep; falling back to median reconstruction error"
        );
        return Ok(median(errors));
    }

    let mut best = valid[0];
    for point in &valid[1..] {
        if point.f1() > best.f1() {
            best = *point;
        }
    }
    Ok(best.threshold)
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ThresholdArtifact {
    threshold: f32,
}

pub fn save_threshold<P: AsRef<Path>>(path: P, threshold: f32) -> Result<()> {
    let artifact = ThresholdArtifact { threshold };
    std::fs::write(path, serde_json::to_string_pretty(&artifact)?)?;
    Ok(())
}

pub fn load_threshold<P: AsRef<Path>>(path: P) -> Result<f32> {
    let content = std::fs::read_to_string(path)?;
    let artifact: ThresholdArtifact = serde_json::from_str(&content)?;
    Ok(artifact.threshold)
}
