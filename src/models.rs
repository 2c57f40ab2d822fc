//! Core data model (§3): `ScanJob`, `AgentTask`, `Finding`,
//! `ConsensusFinding`, `ToolReliability`, and their supporting enums.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Opaque metadata leaf value (§6: "string/number/bool/null leaf values").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

pub type Metadata = HashMap<String, MetadataValue>;

/// The kind of scan requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Full,
    Incremental,
    Ide,
}

impl Default for ScanType {
    fn default() -> Self {
        ScanType::Full
    }
}

/// Job lifecycle status (§3, §4.3). Transitions are enforced by the
/// scheduler, never by callers mutating this field directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

/// A unit of work: one scan of one repository revision across the
/// requested agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: String,
    pub repository_id: String,
    pub user_id: Option<String>,

    pub repo_url: String,
    pub branch: String,
    pub commit_sha: Option<String>,
    pub scan_type: ScanType,
    pub priority: u8,
    pub agents_requested: Vec<String>,
    pub metadata: Metadata,

    pub status: ScanStatus,
    pub agents_completed: Vec<String>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ScanJob {
    pub fn new(
        repository_id: String,
        repo_url: String,
        branch: String,
        agents_requested: Vec<String>,
        priority: u8,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            repository_id,
            user_id: None,
            repo_url,
            branch,
            commit_sha: None,
            scan_type: ScanType::Full,
            priority,
            agents_requested,
            metadata: Metadata::new(),
            status: ScanStatus::Queued,
            agents_completed: Vec::new(),
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Invariant (§3, §8 property 1): completed agents are always a
    /// subset of requested agents.
    pub fn agents_completed_is_subset(&self) -> bool {
        let requested: HashSet<&String> = self.agents_requested.iter().collect();
        self.agents_completed.iter().all(|a| requested.contains(a))
    }

    pub fn mark_running(&mut self) {
        if self.status == ScanStatus::Queued {
            self.status = ScanStatus::Running;
            self.started_at = Some(chrono::Utc::now());
            self.updated_at = chrono::Utc::now();
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = ScanStatus::Completed;
        self.completed_at = Some(chrono::Utc::now());
        self.updated_at = chrono::Utc::now();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = ScanStatus::Failed;
        self.error_message = Some(error);
        self.completed_at = Some(chrono::Utc::now());
        self.updated_at = chrono::Utc::now();
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ScanStatus::Cancelled;
        self.completed_at = Some(chrono::Utc::now());
        self.updated_at = chrono::Utc::now();
    }

    /// §4.1 `RetryFailedScan`: resets mutable lifecycle fields and
    /// transitions back to `queued`. Caller must have already checked
    /// `status == Failed`.
    pub fn reset_for_retry(&mut self) {
        self.status = ScanStatus::Queued;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        self.agents_completed.clear();
        self.updated_at = chrono::Utc::now();
    }

    pub fn record_agent_completed(&mut self, agent: &str) {
        if !self.agents_completed.iter().any(|a| a == agent) {
            self.agents_completed.push(agent.to_string());
        }
        self.updated_at = chrono::Utc::now();
    }

    pub fn all_agents_terminal(&self) -> bool {
        self.agents_completed.len() >= self.agents_requested.len()
    }
}

/// Status of one (job, agent) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentTaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl AgentTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentTaskStatus::Succeeded
                | AgentTaskStatus::Failed
                | AgentTaskStatus::TimedOut
                | AgentTaskStatus::Cancelled
        )
    }
}

/// One (ScanJob, agent) pair of work dispatched by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub job_id: String,
    pub agent_name: String,
    pub attempt: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub status: AgentTaskStatus,
}

impl AgentTask {
    pub fn new(job_id: String, agent_name: String, max_retries: u32, timeout_secs: u64) -> Self {
        Self {
            job_id,
            agent_name,
            attempt: 0,
            max_retries,
            timeout_secs,
            status: AgentTaskStatus::Pending,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt <= self.max_retries
    }

    /// Full-jitter exponential backoff (§4.3): base 1s, factor 2, cap 60s.
    pub fn next_backoff_delay(
        &self,
        base_ms: u64,
        factor: f64,
        cap_ms: u64,
        rng: &mut impl rand::Rng,
    ) -> std::time::Duration {
        crate::scheduler::backoff::next_delay(self.attempt, base_ms, factor, cap_ms, rng)
    }
}

/// Severity taxonomy (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Used for §4.5's "unknown severities map to info" normalization.
    pub fn parse_or_info(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "high" | "critical" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }

    /// Ranking used by the §4.5 ordering contract (high > medium > low > info).
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }
}

/// Finding category taxonomy (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Xss,
    SqlInjection,
    CommandInjection,
    PathTraversal,
    InsecureCrypto,
    HardcodedSecrets,
    Other,
}

impl Category {
    /// §4.4: "unknown categories map to other".
    pub fn parse_or_other(s: &str) -> Self {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "xss" => Category::Xss,
            "sql_injection" => Category::SqlInjection,
            "command_injection" => Category::CommandInjection,
            "path_traversal" => Category::PathTraversal,
            "insecure_crypto" => Category::InsecureCrypto,
            "hardcoded_secrets" => Category::HardcodedSecrets,
            _ => Category::Other,
        }
    }
}

/// A raw finding produced by one agent (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub tool: String,
    pub rule_id: String,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub file_path: String,
    pub line: u32,
    pub column: Option<u32>,
    pub code_snippet: Option<String>,
    pub confidence: f64,
    pub references: Vec<String>,
    pub metadata: Metadata,
}

impl Finding {
    /// Key used for §4.4 intra-agent dedup: `(rule_id, file, line, column)`.
    pub fn dedup_key(&self) -> (String, String, u32, Option<u32>) {
        (
            self.rule_id.clone(),
            self.file_path.clone(),
            self.line,
            self.column,
        )
    }
}

/// A merged, scored finding emitted by the Consensus Engine (§3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusFinding {
    pub representative: Finding,
    pub consensus_score: f64,
    pub agreement_count: usize,
    pub disagreement_count: usize,
    pub supporting_tools: HashSet<String>,
    pub conflicting_tools: HashSet<String>,
    pub merged_finding_ids: Vec<String>,
    pub final_severity: Severity,
    pub final_category: Category,
}

impl ConsensusFinding {
    /// §3 invariant: `supporting ∩ conflicting = ∅`.
    pub fn supporting_and_conflicting_disjoint(&self) -> bool {
        self.supporting_tools.is_disjoint(&self.conflicting_tools)
    }
}

/// Per-agent rolling reliability score (§3, §4.5 Step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReliability {
    pub tool: String,
    pub weighted_accuracy: f64,
    pub false_positive_rate: f64,
    pub severity_accuracy: HashMap<Severity, f64>,
    pub sample_count: u64,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl ToolReliability {
    pub fn new(tool: String) -> Self {
        Self {
            tool,
            weighted_accuracy: 0.5,
            false_positive_rate: 0.0,
            severity_accuracy: HashMap::new(),
            sample_count: 0,
            last_updated: chrono::Utc::now(),
        }
    }
}

/// §6: labeled feedback actions and the labels they map to (§4.5 Step 6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Confirmed,
    Fixed,
    FalsePositive,
    Ignored,
}

impl FeedbackAction {
    pub fn label(&self) -> f64 {
        match self {
            FeedbackAction::Confirmed => 1.0,
            FeedbackAction::Fixed => 1.0,
            FeedbackAction::FalsePositive => 0.0,
            FeedbackAction::Ignored => 0.3,
        }
    }
}

/// §6 `SubmitFeedback` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub finding_id: String,
    pub user_id: String,
    pub action: FeedbackAction,
    pub confidence: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
