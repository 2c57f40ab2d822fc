//! Admission & Lifecycle (§4.1): the entry points an HTTP edge (out of
//! scope here) would call to submit, inspect, cancel, and retry scans.

use crate::config::AdmissionConfig;
use crate::models::{ScanJob, ScanStatus, ScanType};
use crate::queue::{JobRef, SharedQueue};
use crate::store::SharedJobStore;
use crate::{AgentScanError, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// §4.1 `SubmitScan` request payload; fields left `None` fall back to
/// configured defaults.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct SubmitScanRequest {
    #[validate(length(min = 1, message = "repository_id must not be empty"))]
    pub repository_id: String,

    #[validate(url(message = "repo_url must be a valid URL"))]
    pub repo_url: String,

    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub scan_type: Option<ScanType>,

    #[validate(range(min = 1, max = 10, message = "priority must be between 1 and 10"))]
    pub priority: Option<u8>,

    pub agents: Option<Vec<String>>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatusView {
    pub job_id: String,
    pub status: ScanStatus,
    pub agents_requested: Vec<String>,
    pub agents_completed: Vec<String>,
    pub progress: f64,
    pub eta: Option<chrono::DateTime<chrono::Utc>>,
}

/// The Admission & Lifecycle surface, holding just enough collaborator
/// references to validate, persist, and enqueue — no scheduling logic
/// lives here.
pub struct AdmissionService {
    config: AdmissionConfig,
    job_store: SharedJobStore,
    queue: SharedQueue,
}

impl AdmissionService {
    pub fn new(config: AdmissionConfig, job_store: SharedJobStore, queue: SharedQueue) -> Self {
        Self {
            config,
            job_store,
            queue,
        }
    }

    /// `validator`'s `url` check only confirms the string parses; this
    /// additionally rejects schemes a scan agent could never clone.
    fn validate_repo_scheme(repo_url: &str) -> Result<()> {
        let parsed = url::Url::parse(repo_url)
            .map_err(|e| AgentScanError::Validation(format!("repo_url is not a valid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" | "ssh" | "git" => Ok(()),
            other => Err(AgentScanError::Validation(format!(
                "unsupported repo_url scheme: {other}"
            ))),
        }
    }

    /// §4.1 `SubmitScan`.
    pub async fn submit_scan(&self, request: SubmitScanRequest) -> Result<ScanJob> {
        request
            .validate()
            .map_err(|e| AgentScanError::Validation(e.to_string()))?;
        Self::validate_repo_scheme(&request.repo_url)?;

        let branch = request.branch.unwrap_or_else(|| "main".to_string());
        let agents = request.agents.unwrap_or_else(|| self.config.default_agents.clone());
        if agents.is_empty() {
            return Err(AgentScanError::Validation(
                "at least one agent must be requested".to_string(),
            ));
        }
        let priority = request.priority.unwrap_or(crate::constants::DEFAULT_PRIORITY);

        let mut job = ScanJob::new(request.repository_id, request.repo_url, branch, agents, priority);
        job.user_id = request.user_id;
        job.commit_sha = request.commit_sha;
        job.scan_type = request.scan_type.unwrap_or_default();

        self.job_store.insert(job.clone()).await?;
        self.queue
            .enqueue(JobRef {
                job_id: job.id.clone(),
                priority: job.priority,
                submitted_at: job.created_at,
            })
            .await?;

        Ok(job)
    }

    /// §4.1 `GetScanStatus`.
    pub async fn get_scan_status(&self, job_id: &str) -> Result<ScanStatusView> {
        let job = self.job_store.get(job_id).await?;
        let progress = if job.agents_requested.is_empty() {
            1.0
        } else {
            job.agents_completed.len() as f64 / job.agents_requested.len() as f64
        };

        Ok(ScanStatusView {
            job_id: job.id,
            status: job.status,
            agents_requested: job.agents_requested,
            agents_completed: job.agents_completed,
            progress,
            eta: None,
        })
    }

    /// §4.1 `CancelScan`: marks the job cancelled if not already
    /// terminal. Signaling in-flight agent tasks to stop is the
    /// scheduler's responsibility, driven off this status change.
    pub async fn cancel_scan(&self, job_id: &str) -> Result<ScanJob> {
        let mut job = self.job_store.get(job_id).await?;
        if job.status.is_terminal() {
            return Err(AgentScanError::Conflict(format!(
                "job {job_id} is already {:?}",
                job.status
            )));
        }

        job.mark_cancelled();
        self.job_store.update(job.clone()).await?;
        Ok(job)
    }

    /// §4.1 `RetryFailedScan`: only legal when `status = failed`.
    pub async fn retry_failed_scan(&self, job_id: &str) -> Result<ScanJob> {
        let mut job = self.job_store.get(job_id).await?;
        if job.status != ScanStatus::Failed {
            return Err(AgentScanError::Conflict(format!(
                "job {job_id} is {:?}, not failed",
                job.status
            )));
        }

        job.reset_for_retry();
        self.job_store.update(job.clone()).await?;
        self.queue
            .enqueue(JobRef {
                job_id: job.id.clone(),
                priority: job.priority,
                submitted_at: job.updated_at,
            })
            .await?;

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;
    use crate::store::InMemoryJobStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn service() -> AdmissionService {
        AdmissionService::new(
            AdmissionConfig::default(),
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryQueue::new(Duration::from_secs(60))),
        )
    }

    fn valid_request() -> SubmitScanRequest {
        SubmitScanRequest {
            repository_id: "repo-1".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            branch: None,
            commit_sha: None,
            scan_type: None,
            priority: None,
            agents: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn submit_fills_defaults_and_enqueues() {
        let service = service();
        let job = service.submit_scan(valid_request()).await.unwrap();
        assert_eq!(job.branch, "main");
        assert_eq!(job.status, ScanStatus::Queued);
        assert!(!job.agents_requested.is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_invalid_url() {
        let service = service();
        let mut request = valid_request();
        request.repo_url = "not-a-url".to_string();
        let err = service.submit_scan(request).await.unwrap_err();
        assert!(matches!(err, AgentScanError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_scheme() {
        let service = service();
        let mut request = valid_request();
        request.repo_url = "ftp://example.com/repo.git".to_string();
        let err = service.submit_scan(request).await.unwrap_err();
        assert!(matches!(err, AgentScanError::Validation(_)));
    }

    #[tokio::test]
    async fn cancel_on_terminal_job_conflicts() {
        let service = service();
        let job = service.submit_scan(valid_request()).await.unwrap();
        service.cancel_scan(&job.id).await.unwrap();
        let err = service.cancel_scan(&job.id).await.unwrap_err();
        assert!(matches!(err, AgentScanError::Conflict(_)));
    }

    #[tokio::test]
    async fn retry_on_non_failed_job_conflicts() {
        let service = service();
        let job = service.submit_scan(valid_request()).await.unwrap();
        let err = service.retry_failed_scan(&job.id).await.unwrap_err();
        assert!(matches!(err, AgentScanError::Conflict(_)));
    }

    #[tokio::test]
    async fn retry_after_failure_resets_and_requeues() {
        let service = service();
        let mut job = service.submit_scan(valid_request()).await.unwrap();
        job.mark_failed("boom".to_string());
        service.job_store.update(job.clone()).await.unwrap();

        let retried = service.retry_failed_scan(&job.id).await.unwrap();
        assert_eq!(retried.status, ScanStatus::Queued);
        assert!(retried.error_message.is_none());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let service = service();
        let err = service.get_scan_status("missing").await.unwrap_err();
        assert!(matches!(err, AgentScanError::NotFound(_)));
    }
}
