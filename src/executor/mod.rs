//! Agent capability trait and the executor that drives it (§6).
//!
//! An `Agent` wraps one static-analysis tool. The executor enforces a
//! hard deadline around `Agent::scan`, normalizes whatever severity/
//! category strings the agent returns, and deduplicates findings the
//! agent reported more than once for the same location.

use crate::constants::DEFAULT_TASK_TIMEOUT_SECS;
use crate::models::{Category, Finding, Severity};
use crate::{AgentScanError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// What an agent is asked to scan (§6 `Agent::Scan` context).
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub job_id: String,
    pub repo_url: String,
    pub branch: String,
    pub commit_sha: Option<String>,
    pub workspace_hint: Option<String>,
    pub config: HashMap<String, String>,
}

/// Raw outcome of one agent run, before severity/category normalization.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub succeeded: bool,
    pub findings: Vec<RawFinding>,
    pub duration: Duration,
    pub error: Option<String>,
}

/// A finding as handed back by the agent, with untrusted string fields
/// for severity/category (the agent is an external collaborator; its
/// vocabulary is not guaranteed to match ours).
#[derive(Debug, Clone)]
pub struct RawFinding {
    pub rule_id: String,
    pub severity: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub file_path: String,
    pub line: u32,
    pub column: Option<u32>,
    pub code_snippet: Option<String>,
    pub confidence: f64,
    pub references: Vec<String>,
}

/// One static-analysis tool, pluggable into the scheduler's fan-out.
///
/// Implementations should never surface captured stdout/stderr as
/// findings (§6: "diagnostic output is for logs only").
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> String;
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS)
    }

    async fn scan(&self, ctx: &ScanContext) -> Result<AgentOutcome>;
}

pub type SharedAgent = std::sync::Arc<dyn Agent>;

/// Drives one `Agent::scan` call under a hard deadline and normalizes
/// the result into `Finding`s the consensus engine understands.
pub struct AgentExecutor;

impl AgentExecutor {
    /// Runs `agent.scan(ctx)` with a deadline of `timeout`, mapping a
    /// deadline overrun to `AgentScanError::Timeout` (§7: retryable).
    pub async fn run(
        agent: &dyn Agent,
        ctx: &ScanContext,
        timeout: Duration,
    ) -> Result<Vec<Finding>> {
        let started = std::time::Instant::now();
        let outcome = match tokio::time::timeout(timeout, agent.scan(ctx)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(agent = %agent.name(), job_id = %ctx.job_id, "agent scan timed out");
                return Err(AgentScanError::Timeout {
                    agent: agent.name(),
                    elapsed_secs: started.elapsed().as_secs_f64(),
                });
            }
        };

        if !outcome.succeeded {
            return Err(AgentScanError::AgentFailure {
                agent: agent.name(),
                message: outcome.error.unwrap_or_else(|| "unknown failure".to_string()),
            });
        }

        info!(
            agent = %agent.name(),
            job_id = %ctx.job_id,
            raw_count = outcome.findings.len(),
            duration_ms = outcome.duration.as_millis(),
            "agent scan completed"
        );

        Ok(Self::normalize_and_dedup(agent.name(), outcome.findings))
    }

    /// Normalizes severity/category strings (§4.4: unknowns fall back
    /// to `info`/`other`) and drops duplicate (rule, file, line, column)
    /// reports from the same agent, keeping the highest-confidence one.
    fn normalize_and_dedup(tool: String, raw: Vec<RawFinding>) -> Vec<Finding> {
        let mut by_key: HashMap<(String, String, u32, Option<u32>), Finding> = HashMap::new();

        for r in raw {
            let finding = Finding {
                id: uuid::Uuid::new_v4().to_string(),
                tool: tool.clone(),
                rule_id: r.rule_id,
                severity: Severity::parse_or_info(&r.severity),
                category: Category::parse_or_other(&r.category),
                title: r.title,
                description: r.description,
                file_path: r.file_path,
                line: r.line,
                column: r.column,
                code_snippet: r.code_snippet,
                confidence: r.confidence.clamp(0.0, 1.0),
                references: r.references,
                metadata: Default::default(),
            };

            let key = finding.dedup_key();
            match by_key.get(&key) {
                Some(existing) if existing.confidence >= finding.confidence => {}
                _ => {
                    by_key.insert(key, finding);
                }
            }
        }

        by_key.into_values().collect()
    }
}
