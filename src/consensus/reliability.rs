//! Tool reliability tracker (§4.5 Step 6, §9): partitioned by agent
//! name, single-writer/many-reader, exponential time-decay on update.

use crate::models::{Severity, ToolReliability};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Shared reliability state. Reads come from the consensus hot path;
/// writes come from the feedback path only (§9).
pub struct ReliabilityTracker {
    by_tool: RwLock<HashMap<String, ToolReliability>>,
    decay_factor: f64,
    min_samples: usize,
}

impl ReliabilityTracker {
    pub fn new(decay_factor: f64, min_samples: usize) -> Self {
        Self {
            by_tool: RwLock::new(HashMap::new()),
            decay_factor,
            min_samples,
        }
    }

    /// Current weighted-accuracy estimate for `tool`; 0.5 (neutral)
    /// until at least `min_samples` observations have been recorded.
    pub async fn reliability(&self, tool: &str) -> f64 {
        let state = self.by_tool.read().await;
        match state.get(tool) {
            Some(r) if r.sample_count as usize >= self.min_samples => r.weighted_accuracy,
            _ => 0.5,
        }
    }

    pub async fn false_positive_rate(&self, tool: &str) -> f64 {
        let state = self.by_tool.read().await;
        state.get(tool).map(|r| r.false_positive_rate).unwrap_or(0.0)
    }

    /// Records a labeled observation (§4.5 Step 6): decays the
    /// existing estimate by `decay_factor ^ days_elapsed` before
    /// blending in the new label.
    pub async fn record(&self, tool: &str, severity: Severity, label: f64, is_false_positive: bool) {
        let mut state = self.by_tool.write().await;
        let entry = state
            .entry(tool.to_string())
            .or_insert_with(|| ToolReliability::new(tool.to_string()));

        let days_elapsed = (chrono::Utc::now() - entry.last_updated)
            .num_seconds()
            .max(0) as f64
            / 86_400.0;
        let decay = self.decay_factor.powf(days_elapsed);

        let n = entry.sample_count as f64;
        let decayed_accuracy = entry.weighted_accuracy * decay;
        entry.weighted_accuracy = (decayed_accuracy * n + label) / (n + 1.0);

        let decayed_fp = entry.false_positive_rate * decay;
        let fp_label = if is_false_positive { 1.0 } else { 0.0 };
        entry.false_positive_rate = (decayed_fp * n + fp_label) / (n + 1.0);

        let severity_entry = entry.severity_accuracy.entry(severity).or_insert(0.5);
        *severity_entry = (*severity_entry * decay * n + label) / (n + 1.0);

        entry.sample_count += 1;
        entry.last_updated = chrono::Utc::now();
    }

    pub async fn snapshot(&self, tool: &str) -> Option<ToolReliability> {
        self.by_tool.read().await.get(tool).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_is_neutral() {
        let tracker = ReliabilityTracker::new(0.95, 1);
        assert_eq!(tracker.reliability("unknown").await, 0.5);
    }

    #[tokio::test]
    async fn below_min_samples_stays_neutral() {
        let tracker = ReliabilityTracker::new(0.95, 5);
        tracker.record("semgrep", Severity::High, 1.0, false).await;
        assert_eq!(tracker.reliability("semgrep").await, 0.5);
    }

    #[tokio::test]
    async fn repeated_positive_labels_raise_accuracy() {
        let tracker = ReliabilityTracker::new(0.95, 1);
        tracker.record("semgrep", Severity::High, 1.0, false).await;
        tracker.record("semgrep", Severity::High, 1.0, false).await;
        let reliability = tracker.reliability("semgrep").await;
        assert!(reliability > 0.5);
    }

    #[tokio::test]
    async fn false_positive_labels_raise_fp_rate() {
        let tracker = ReliabilityTracker::new(0.95, 1);
        tracker.record("noisy-tool", Severity::Low, 0.0, true).await;
        assert!(tracker.false_positive_rate("noisy-tool").await > 0.0);
    }
}
