//! Optional ML calibration (§4.5 Step 4): an L2-regularized logistic
//! model trained incrementally by stochastic gradient descent. Before
//! any training examples arrive, predictions fall back to the
//! heuristic score untouched.

use tokio::sync::RwLock;

/// Feature vector per §4.5 Step 4: tool count, confidence statistics,
/// reliability stats, severity/category consensus signal, historical
/// accuracy, FP rate, rule reliability, file risk.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusFeatures {
    pub tool_count: f64,
    pub mean_confidence: f64,
    pub confidence_variance: f64,
    pub mean_reliability: f64,
    pub severity_agreement: f64,
    pub category_agreement: f64,
    pub historical_accuracy: f64,
    pub false_positive_rate: f64,
    pub rule_reliability: f64,
    pub file_risk: f64,
}

impl ConsensusFeatures {
    fn as_vec(&self) -> [f64; 10] {
        [
            self.tool_count,
            self.mean_confidence,
            self.confidence_variance,
            self.mean_reliability,
            self.severity_agreement,
            self.category_agreement,
            self.historical_accuracy,
            self.false_positive_rate,
            self.rule_reliability,
            self.file_risk,
        ]
    }
}

const NUM_WEIGHTS: usize = 10;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

struct ModelState {
    weights: [f64; NUM_WEIGHTS],
    bias: f64,
    trained_examples: u64,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            weights: [0.0; NUM_WEIGHTS],
            bias: 0.0,
            trained_examples: 0,
        }
    }
}

/// Online logistic-regression calibrator with L2 regularization.
pub struct ConsensusModel {
    state: RwLock<ModelState>,
    learning_rate: f64,
    l2_lambda: f64,
}

impl ConsensusModel {
    pub fn new(learning_rate: f64, l2_lambda: f64) -> Self {
        Self {
            state: RwLock::new(ModelState::default()),
            learning_rate,
            l2_lambda,
        }
    }

    pub async fn is_trained(&self) -> bool {
        self.state.read().await.trained_examples > 0
    }

    /// Predicts a calibrated score; falls back to `heuristic_score`
    /// untouched until the first training example arrives.
    pub async fn predict(&self, features: &ConsensusFeatures, heuristic_score: f64) -> f64 {
        let state = self.state.read().await;
        if state.trained_examples == 0 {
            return heuristic_score;
        }

        let x = features.as_vec();
        let z: f64 = state
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, xi)| w * xi)
            .sum::<f64>()
            + state.bias;
        sigmoid(z)
    }

    /// One SGD step with L2 regularization toward `label` (∈ {0,1} or
    /// a soft label in [0,1], per §4.5 Step 6).
    pub async fn train_one(&self, features: &ConsensusFeatures, label: f64) {
        let mut state = self.state.write().await;
        let x = features.as_vec();
        let z: f64 = state
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, xi)| w * xi)
            .sum::<f64>()
            + state.bias;
        let prediction = sigmoid(z);
        let error = prediction - label;

        for (w, xi) in state.weights.iter_mut().zip(x.iter()) {
            let grad = error * xi + self.l2_lambda * *w;
            *w -= self.learning_rate * grad;
        }
        state.bias -= self.learning_rate * error;
        state.trained_examples += 1;
    }

    /// Blends the model's prediction with the heuristic score
    /// (§4.5 Step 4 / Open Question: equal weight by default).
    pub async fn blend(&self, features: &ConsensusFeatures, heuristic_score: f64, blend_weight: f64) -> f64 {
        if !self.is_trained().await {
            return heuristic_score;
        }
        let predicted = self.predict(features, heuristic_score).await;
        blend_weight * predicted + (1.0 - blend_weight) * heuristic_score
    }
}
