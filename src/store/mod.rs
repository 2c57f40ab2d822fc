//! Abstract repository interfaces (§6) and in-memory reference
//! implementations. A real deployment backs these with Postgres/Redis;
//! the in-memory versions here exist for tests and the CLI demo.

use crate::models::{ConsensusFinding, Feedback, ScanJob};
use crate::{AgentScanError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: ScanJob) -> Result<()>;
    async fn get(&self, job_id: &str) -> Result<ScanJob>;
    async fn update(&self, job: ScanJob) -> Result<()>;
    async fn list_by_repository(&self, repository_id: &str) -> Result<Vec<ScanJob>>;
}

#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn save_findings(&self, job_id: &str, findings: Vec<ConsensusFinding>) -> Result<()>;
    async fn get_findings(&self, job_id: &str) -> Result<Vec<ConsensusFinding>>;
}

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, feedback: Feedback) -> Result<()>;
    async fn for_finding(&self, finding_id: &str) -> Result<Vec<Feedback>>;
}

/// In-memory `JobStore`: read lock for lookups, write lock for
/// mutation, not found surfaced as an explicit error.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, ScanJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<ScanJob> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| AgentScanError::NotFound(format!("scan job {job_id}")))
    }

    async fn update(&self, job: ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(AgentScanError::NotFound(format!("scan job {}", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn list_by_repository(&self, repository_id: &str) -> Result<Vec<ScanJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.repository_id == repository_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryFindingStore {
    findings: RwLock<HashMap<String, Vec<ConsensusFinding>>>,
}

impl InMemoryFindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FindingStore for InMemoryFindingStore {
    async fn save_findings(&self, job_id: &str, findings: Vec<ConsensusFinding>) -> Result<()> {
        let mut store = self.findings.write().await;
        store.insert(job_id.to_string(), findings);
        Ok(())
    }

    async fn get_findings(&self, job_id: &str) -> Result<Vec<ConsensusFinding>> {
        let store = self.findings.read().await;
        Ok(store.get(job_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackSink {
    feedback: RwLock<HashMap<String, Vec<Feedback>>>,
}

impl InMemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackSink for InMemoryFeedbackSink {
    async fn record(&self, feedback: Feedback) -> Result<()> {
        let mut store = self.feedback.write().await;
        store
            .entry(feedback.finding_id.clone())
            .or_default()
            .push(feedback);
        Ok(())
    }

    async fn for_finding(&self, finding_id: &str) -> Result<Vec<Feedback>> {
        let store = self.feedback.read().await;
        Ok(store.get(finding_id).cloned().unwrap_or_default())
    }
}

pub type SharedJobStore = Arc<dyn JobStore>;
pub type SharedFindingStore = Arc<dyn FindingStore>;
pub type SharedFeedbackSink = Arc<dyn FeedbackSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ConsensusFinding, Finding, Severity};
    use std::collections::HashSet;

    fn sample_job() -> ScanJob {
        ScanJob::new(
            "repo-1".to_string(),
            "https://example.com/repo.git".to_string(),
            "main".to_string(),
            vec!["semgrep".to_string()],
            5,
        )
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, AgentScanError::NotFound(_)));
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = InMemoryJobStore::new();
        let job = sample_job();
        let id = job.id.clone();
        store.insert(job).await.unwrap();
        let fetched = store.get(&id).await.unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn update_missing_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.update(sample_job()).await.unwrap_err();
        assert!(matches!(err, AgentScanError::NotFound(_)));
    }

    #[tokio::test]
    async fn finding_store_roundtrips_per_job() {
        let store = InMemoryFindingStore::new();
        let finding = Finding {
            id: "f1".to_string(),
            tool: "semgrep".to_string(),
            rule_id: "rule-1".to_string(),
            severity: Severity::High,
            category: Category::Xss,
            title: "xss".to_string(),
            description: "desc".to_string(),
            file_path: "app.py".to_string(),
            line: 10,
            column: None,
            code_snippet: None,
            confidence: 0.9,
            references: vec![],
            metadata: Default::default(),
        };
        let consensus = ConsensusFinding {
            representative: finding,
            consensus_score: 0.8,
            agreement_count: 1,
            disagreement_count: 0,
            supporting_tools: HashSet::from(["semgrep".to_string()]),
            conflicting_tools: HashSet::new(),
            merged_finding_ids: vec!["f1".to_string()],
            final_severity: Severity::High,
            final_category: Category::Xss,
        };
        store
            .save_findings("job-1", vec![consensus])
            .await
            .unwrap();
        let fetched = store.get_findings("job-1").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(store.get_findings("job-2").await.unwrap().len(), 0);
    }
}
