//! Consensus Engine (§4.5): groups findings from the successful
//! agents of one job, scores each group, and optionally calibrates
//! the score with a trained model and Platt scaling.

pub mod ml;
pub mod platt;
pub mod reliability;
pub mod similarity;

use crate::config::ConsensusConfig;
use crate::models::{Category, ConsensusFinding, Finding, Severity};
use ml::{ConsensusFeatures, ConsensusModel};
use platt::PlattCalibrator;
use reliability::ReliabilityTracker;
use std::collections::{HashMap, HashSet};

pub struct ConsensusEngine {
    config: ConsensusConfig,
    reliability: ReliabilityTracker,
    model: ConsensusModel,
    calibrator: PlattCalibrator,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        let reliability = ReliabilityTracker::new(
            config.reliability_decay_factor,
            config.reliability_min_samples,
        );
        let model = ConsensusModel::new(
            crate::constants::DEFAULT_ML_LEARNING_RATE,
            crate::constants::DEFAULT_ML_L2_LAMBDA,
        );
        let calibrator = PlattCalibrator::new(config.min_calibration_samples, config.calibration_max_age_days);
        Self {
            config,
            reliability,
            model,
            calibrator,
        }
    }

    /// Runs Steps 1-5 of §4.5 over `findings` (the union of successful
    /// agents' findings for one job) against `agents_requested`.
    /// Deterministic: groups are sorted by primary finding id before
    /// scoring (§9 floating-point determinism note).
    pub async fn run(&self, findings: Vec<Finding>, agents_requested: &[String]) -> Vec<ConsensusFinding> {
        let mut groups = self.group_by_similarity(findings);
        groups.sort_by(|a, b| a.primary_id.cmp(&b.primary_id));

        let total_agents = agents_requested.len().max(1);
        let mut scored = Vec::with_capacity(groups.len());
        for (order, group) in groups.into_iter().enumerate() {
            scored.push(self.score_group(group, total_agents, order).await);
        }

        scored.sort_by(|a, b| {
            b.consensus_score
                .partial_cmp(&a.consensus_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.final_severity.rank().cmp(&a.final_severity.rank()))
        });
        scored.into_iter().map(|s| s.finding).collect()
    }

    /// Step 1: greedy grouping in input order by pairwise similarity.
    fn group_by_similarity(&self, findings: Vec<Finding>) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();

        for finding in findings {
            let joined = groups.iter_mut().find(|g| {
                similarity::similarity(&g.primary, &finding, &self.config.similarity_weights)
                    >= self.config.similarity_threshold
            });

            match joined {
                Some(group) => group.members.push(finding),
                None => {
                    let primary_id = finding.id.clone();
                    groups.push(Group {
                        primary: finding.clone(),
                        primary_id,
                        members: vec![finding],
                    });
                }
            }
        }
        groups
    }

    /// Steps 2-5 for one group.
    async fn score_group(&self, group: Group, total_agents: usize, order: usize) -> ScoredFinding {
        let representative = self.pick_representative(&group);
        let (final_severity, final_category) = self.majority_vote(&group);

        // A tool supports the finding merely by reporting it; severity/
        // category divergence is resolved by the majority vote above, not
        // by demoting the tool out of the supporting set. Greedy grouping
        // never produces a tool that affirmatively disagrees, so
        // conflicting_tools stays empty here.
        let supporting_tools: HashSet<String> = group.members.iter().map(|f| f.tool.clone()).collect();
        let conflicting_tools: HashSet<String> = HashSet::new();

        let k = supporting_tools.len();
        let heuristic_score = self.heuristic_score(&group, k, total_agents).await;

        let features = self.build_features(&group, k, total_agents).await;
        let ml_score = if self.config.enable_ml {
            self.model.blend(&features, heuristic_score, self.config.ml_blend_weight).await
        } else {
            heuristic_score
        };

        let final_score = if self.config.enable_calibration {
            self.calibrator
                .calibrate(&representative.tool, final_severity, &final_category, &representative.rule_id, ml_score)
                .await
        } else {
            ml_score.clamp(0.0, 1.0)
        };

        let merged_finding_ids = group.members.iter().map(|f| f.id.clone()).collect();
        let agreement_count = supporting_tools.len();
        let disagreement_count = conflicting_tools.len();

        let finding = ConsensusFinding {
            representative,
            consensus_score: final_score,
            agreement_count,
            disagreement_count,
            supporting_tools,
            conflicting_tools,
            merged_finding_ids,
            final_severity,
            final_category,
        };

        ScoredFinding {
            finding,
            consensus_score: final_score,
            final_severity,
            _order: order,
        }
    }

    /// Representative is the finding from the highest-weighted
    /// supporting tool (§4.5 Step 1).
    fn pick_representative(&self, group: &Group) -> Finding {
        group
            .members
            .iter()
            .max_by(|a, b| {
                self.config
                    .agent_weight(&a.tool)
                    .partial_cmp(&self.config.agent_weight(&b.tool))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .unwrap_or_else(|| group.primary.clone())
    }

    /// Step 2: majority vote on severity and category, ties broken by
    /// the higher-weighted tool, empty falls back to medium/other.
    fn majority_vote(&self, group: &Group) -> (Severity, Category) {
        if group.members.is_empty() {
            return (Severity::Medium, Category::Other);
        }

        let mut severity_votes: HashMap<Severity, f64> = HashMap::new();
        let mut category_votes: HashMap<Category, f64> = HashMap::new();
        // Per category, the single highest-weighted tool that voted for it,
        // used as a deterministic tie-break (Step 2: ties broken by the
        // higher-weighted tool) since HashMap iteration order is not stable
        // across runs.
        let mut category_top_voter: HashMap<Category, (f64, String)> = HashMap::new();
        for f in &group.members {
            let weight = self.config.agent_weight(&f.tool);
            *severity_votes.entry(f.severity).or_insert(0.0) += weight;
            *category_votes.entry(f.category.clone()).or_insert(0.0) += weight;

            let top_voter = category_top_voter
                .entry(f.category.clone())
                .or_insert((f64::MIN, String::new()));
            if weight > top_voter.0 || (weight == top_voter.0 && f.tool < top_voter.1) {
                *top_voter = (weight, f.tool.clone());
            }
        }

        let final_severity = severity_votes
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)))
            .map(|(s, _)| s)
            .unwrap_or(Severity::Medium);
        let final_category = category_votes
            .into_iter()
            .max_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let a_voter = &category_top_voter[&a.0];
                        let b_voter = &category_top_voter[&b.0];
                        a_voter
                            .0
                            .partial_cmp(&b_voter.0)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| b_voter.1.cmp(&a_voter.1))
                    })
            })
            .map(|(c, _)| c)
            .unwrap_or(Category::Other);

        (final_severity, final_category)
    }

    /// Step 3: consensus score from supporting-tool count, reliability
    /// weighting, consistency bonus, and false-positive reduction.
    async fn heuristic_score(&self, group: &Group, k: usize, total_agents: usize) -> f64 {
        let mut weighted_sum = 0.0;
        for f in &group.members {
            weighted_sum += self.reliability.reliability(&f.tool).await * self.config.agent_weight(&f.tool);
        }
        let weighted_total = total_agents as f64;
        let weighted_ratio = if weighted_total > 0.0 {
            weighted_sum / weighted_total
        } else {
            0.0
        };

        let base = if k >= self.config.min_agreement_count {
            weighted_ratio.max(self.config.high_threshold)
        } else if k == 2 {
            weighted_ratio.max(self.config.medium_threshold)
        } else {
            (k as f64 / total_agents as f64).min(0.6)
        };

        let consistency_bonus = (1.0 + self.config.consistency_bonus_alpha * (k as f64 - 1.0))
            .min(self.config.consistency_bonus_max);

        let primary_tool = &group.primary.tool;
        let fp_rate = self.reliability.false_positive_rate(primary_tool).await;
        let fp_penalty = 1.0 - self.config.fp_reduction_beta * fp_rate;

        (base * consistency_bonus * fp_penalty).clamp(0.0, 1.0)
    }

    async fn build_features(&self, group: &Group, k: usize, total_agents: usize) -> ConsensusFeatures {
        let confidences: Vec<f64> = group.members.iter().map(|f| f.confidence).collect();
        let mean_confidence = confidences.iter().sum::<f64>() / confidences.len().max(1) as f64;
        let variance = confidences
            .iter()
            .map(|c| (c - mean_confidence).powi(2))
            .sum::<f64>()
            / confidences.len().max(1) as f64;

        let mut reliability_sum = 0.0;
        for f in &group.members {
            reliability_sum += self.reliability.reliability(&f.tool).await;
        }
        let mean_reliability = reliability_sum / group.members.len().max(1) as f64;

        let (final_severity, final_category) = self.majority_vote(group);
        let severity_agreement = group
            .members
            .iter()
            .filter(|f| f.severity == final_severity)
            .count() as f64
            / group.members.len().max(1) as f64;
        let category_agreement = group
            .members
            .iter()
            .filter(|f| f.category == final_category)
            .count() as f64
            / group.members.len().max(1) as f64;

        let fp_rate = self.reliability.false_positive_rate(&group.primary.tool).await;

        ConsensusFeatures {
            tool_count: k as f64,
            mean_confidence,
            confidence_variance: variance,
            mean_reliability,
            severity_agreement,
            category_agreement,
            historical_accuracy: mean_reliability,
            false_positive_rate: fp_rate,
            rule_reliability: mean_reliability,
            file_risk: (total_agents.saturating_sub(k)) as f64 / total_agents.max(1) as f64,
        }
    }

    /// Step 6: records feedback into the reliability tracker and both
    /// calibration buffers.
    pub async fn record_feedback(
        &self,
        finding: &ConsensusFinding,
        action: crate::models::FeedbackAction,
    ) {
        let label = action.label();
        let is_false_positive = matches!(action, crate::models::FeedbackAction::FalsePositive);

        for tool in finding.supporting_tools.iter().chain(finding.conflicting_tools.iter()) {
            self.reliability
                .record(tool, finding.final_severity, label, is_false_positive)
                .await;
        }

        self.calibrator
            .record(
                &finding.representative.tool,
                finding.final_severity,
                &finding.final_category,
                &finding.representative.rule_id,
                finding.consensus_score,
                label,
            )
            .await;
    }
}

struct Group {
    primary: Finding,
    primary_id: String,
    members: Vec<Finding>,
}

struct ScoredFinding {
    finding: ConsensusFinding,
    consensus_score: f64,
    final_severity: Severity,
    _order: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusConfig;

    fn finding(tool: &str, rule: &str, file: &str, line: u32, severity: Severity, category: Category) -> Finding {
        Finding {
            id: format!("{tool}-{rule}-{line}"),
            tool: tool.to_string(),
            rule_id: rule.to_string(),
            severity,
            category,
            title: "issue".to_string(),
            description: "desc".to_string(),
            file_path: file.to_string(),
            line,
            column: None,
            code_snippet: None,
            confidence: 0.9,
            references: vec![],
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn three_tool_agreement_scores_high() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let findings = vec![
            finding("A", "R", "app.js", 42, Severity::High, Category::Xss),
            finding("B", "R", "app.js", 42, Severity::High, Category::Xss),
            finding("C", "R", "app.js", 42, Severity::High, Category::Xss),
        ];
        let agents = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let out = engine.run(findings, &agents).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].agreement_count, 3);
        assert_eq!(out[0].final_severity, Severity::High);
        assert_eq!(out[0].final_category, Category::Xss);
        assert!(out[0].consensus_score >= 0.95);
        assert_eq!(out[0].supporting_tools.len(), 3);
    }

    #[tokio::test]
    async fn divergent_severity_majority_wins() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let findings = vec![
            finding("A", "R", "app.js", 42, Severity::High, Category::Xss),
            finding("B", "R", "app.js", 42, Severity::High, Category::Xss),
            finding("C", "R", "app.js", 42, Severity::Medium, Category::Xss),
        ];
        let agents = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let out = engine.run(findings, &agents).await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].final_severity, Severity::High);
        assert_eq!(out[0].agreement_count, 3);
        assert_eq!(out[0].supporting_tools.len(), 3);
        assert!(out[0].conflicting_tools.is_empty());
        assert!(out[0].agreement_count + out[0].disagreement_count <= agents.len());
        assert!(out[0].consensus_score >= 0.95);
    }

    #[tokio::test]
    async fn lone_finding_is_capped() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let findings = vec![finding(
            "A",
            "R",
            "x.py",
            10,
            Severity::Medium,
            Category::SqlInjection,
        )];
        let agents = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let out = engine.run(findings, &agents).await;

        assert_eq!(out.len(), 1);
        assert!(out[0].consensus_score <= 0.6);
        assert_eq!(out[0].supporting_tools, HashSet::from(["A".to_string()]));
    }

    #[tokio::test]
    async fn empty_findings_yield_empty_output() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let out = engine.run(vec![], &["A".to_string()]).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn output_sorted_by_score_descending() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let findings = vec![
            finding("A", "R1", "a.py", 1, Severity::Low, Category::Other),
            finding("A", "R2", "b.py", 2, Severity::High, Category::Xss),
            finding("B", "R2", "b.py", 2, Severity::High, Category::Xss),
            finding("C", "R2", "b.py", 2, Severity::High, Category::Xss),
        ];
        let agents = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let out = engine.run(findings, &agents).await;

        assert_eq!(out.len(), 2);
        assert!(out[0].consensus_score >= out[1].consensus_score);
    }

    #[tokio::test]
    async fn disjoint_supporting_and_conflicting() {
        let engine = ConsensusEngine::new(ConsensusConfig::default());
        let findings = vec![
            finding("A", "R", "app.js", 42, Severity::High, Category::Xss),
            finding("B", "R", "app.js", 42, Severity::Low, Category::Xss),
        ];
        let agents = vec!["A".to_string(), "B".to_string()];
        let out = engine.run(findings, &agents).await;

        assert_eq!(out.len(), 1);
        assert!(out[0].supporting_and_conflicting_disjoint());
    }
}
