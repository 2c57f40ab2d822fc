//! Platt scaling calibration (§4.5 Step 5): per `(tool, severity,
//! category, rule)` context, with hierarchical fallback to less
//! specific keys, fit sigmoid parameters once enough samples exist.

use crate::models::{Category, Severity};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Sample {
    predicted: f64,
    observed: f64,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

struct Bin {
    samples: Vec<Sample>,
    fitted: Option<(f64, f64)>,
}

impl Bin {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            fitted: None,
        }
    }
}

/// Hierarchical bin key, from most to least specific. `key_chain`
/// yields the fallback sequence used when a finer bin has not been
/// fitted yet: `(tool,severity,category,rule) → (tool,severity,category)
/// → (tool,severity) → (tool) → global`.
fn key_chain(tool: &str, severity: Severity, category: &Category, rule: &str) -> Vec<String> {
    vec![
        format!("{tool}|{severity:?}|{category:?}|{rule}"),
        format!("{tool}|{severity:?}|{category:?}"),
        format!("{tool}|{severity:?}"),
        tool.to_string(),
        "global".to_string(),
    ]
}

/// Fits a 1-D logistic sigmoid `σ(A·x + B)` to `(predicted, observed)`
/// pairs via a small fixed number of gradient steps (Platt's original
/// method uses Newton's method; SGD is sufficient at this scale).
fn fit_sigmoid(samples: &[Sample]) -> (f64, f64) {
    let mut a = -1.0;
    let mut b = 0.0;
    let learning_rate = 0.01;

    for _ in 0..500 {
        let mut grad_a = 0.0;
        let mut grad_b = 0.0;
        for s in samples {
            let p = 1.0 / (1.0 + (-(a * s.predicted + b)).exp());
            let error = p - s.observed;
            grad_a += error * s.predicted;
            grad_b += error;
        }
        let n = samples.len() as f64;
        a -= learning_rate * grad_a / n;
        b -= learning_rate * grad_b / n;
    }
    (a, b)
}

pub struct PlattCalibrator {
    bins: RwLock<HashMap<String, Bin>>,
    min_sample_size: usize,
    max_age_days: i64,
}

impl PlattCalibrator {
    pub fn new(min_sample_size: usize, max_age_days: i64) -> Self {
        Self {
            bins: RwLock::new(HashMap::new()),
            min_sample_size,
            max_age_days,
        }
    }

    /// Records an observation into the most specific bin; old
    /// observations are pruned on write (§4.5 Step 5 decay window).
    pub async fn record(
        &self,
        tool: &str,
        severity: Severity,
        category: &Category,
        rule: &str,
        predicted: f64,
        observed: f64,
    ) {
        let mut bins = self.bins.write().await;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.max_age_days);

        // Written into every bin in the fallback chain so a broader
        // bin still accumulates evidence from its narrower children.
        for key in key_chain(tool, severity, category, rule) {
            let bin = bins.entry(key).or_insert_with(Bin::new);
            bin.samples.retain(|s| s.recorded_at >= cutoff);
            bin.samples.push(Sample {
                predicted,
                observed,
                recorded_at: chrono::Utc::now(),
            });

            if bin.samples.len() >= self.min_sample_size {
                bin.fitted = Some(fit_sigmoid(&bin.samples));
            }
        }
    }

    /// Transforms a raw score using the most specific fitted bin
    /// found by walking the hierarchical fallback chain; returns the
    /// raw score, clamped, if no bin in the chain has been fitted.
    pub async fn calibrate(
        &self,
        tool: &str,
        severity: Severity,
        category: &Category,
        rule: &str,
        raw_score: f64,
    ) -> f64 {
        let bins = self.bins.read().await;
        for key in key_chain(tool, severity, category, rule) {
            if let Some(bin) = bins.get(&key) {
                if let Some((a, b)) = bin.fitted {
                    let transformed = 1.0 / (1.0 + (-(a * raw_score + b)).exp());
                    return transformed.clamp(
                        crate::constants::CALIBRATION_SCORE_FLOOR,
                        crate::constants::CALIBRATION_SCORE_CEIL,
                    );
                }
            }
        }
        raw_score.clamp(
            crate::constants::CALIBRATION_SCORE_FLOOR,
            crate::constants::CALIBRATION_SCORE_CEIL,
        )
    }
}
