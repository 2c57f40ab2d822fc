//! End-to-end scenario tests covering the full admission -> scheduler
//! -> consensus pipeline, beyond what each module's own unit tests
//! exercise in isolation.

use agentscan_core::admission::{AdmissionService, SubmitScanRequest};
use agentscan_core::config::{AdmissionConfig, ConsensusConfig, SchedulerConfig};
use agentscan_core::consensus::ConsensusEngine;
use agentscan_core::executor::{Agent, AgentOutcome, RawFinding, ScanContext};
use agentscan_core::models::ScanStatus;
use agentscan_core::queue::InMemoryQueue;
use agentscan_core::scheduler::{AgentRegistry, Scheduler};
use agentscan_core::store::{FindingStore, InMemoryFindingStore, InMemoryJobStore};
use agentscan_core::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct RecordingAgent {
    name: String,
    start_order: Arc<AtomicUsize>,
    order_slot: Arc<std::sync::Mutex<Vec<String>>>,
    findings: Vec<RawFinding>,
}

#[async_trait]
impl Agent for RecordingAgent {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn scan(&self, ctx: &ScanContext) -> Result<AgentOutcome> {
        self.start_order.fetch_add(1, Ordering::SeqCst);
        self.order_slot.lock().unwrap().push(ctx.job_id.clone());
        Ok(AgentOutcome {
            succeeded: true,
            findings: self.findings.clone(),
            duration: Duration::from_millis(5),
            error: None,
        })
    }
}

fn finding(rule_id: &str, line: u32) -> RawFinding {
    RawFinding {
        rule_id: rule_id.to_string(),
        severity: "high".to_string(),
        category: "xss".to_string(),
        title: "xss".to_string(),
        description: "desc".to_string(),
        file_path: "app.js".to_string(),
        line,
        column: None,
        code_snippet: None,
        confidence: 0.9,
        references: vec![],
    }
}

fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        max_parallel_jobs: 1,
        max_parallel_agents_per_job: 4,
        task_timeout_secs: 5,
        job_timeout_secs: 10,
        max_retries: 2,
        backoff_base_ms: 1,
        backoff_factor: 2.0,
        backoff_cap_ms: 10,
        cancel_grace_period_secs: 1,
    }
}

/// S1-style scenario plus full pipeline wiring: a scan submitted
/// through `AdmissionService` runs to completion and produces a
/// calibrated consensus report visible via the finding store.
#[tokio::test]
async fn submitted_scan_runs_to_completion_with_consensus_findings() {
    let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
    let job_store = Arc::new(InMemoryJobStore::new());
    let finding_store = Arc::new(InMemoryFindingStore::new());
    let consensus = Arc::new(ConsensusEngine::new(ConsensusConfig::default()));

    let order = Arc::new(AtomicUsize::new(0));
    let order_slot = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(RecordingAgent {
        name: "semgrep".to_string(),
        start_order: order.clone(),
        order_slot: order_slot.clone(),
        findings: vec![finding("xss-1", 42)],
    }));
    registry.register(Arc::new(RecordingAgent {
        name: "bandit".to_string(),
        start_order: order.clone(),
        order_slot: order_slot.clone(),
        findings: vec![finding("xss-1", 42)],
    }));

    let admission = AdmissionService::new(AdmissionConfig::default(), job_store.clone(), queue.clone());
    let job = admission
        .submit_scan(SubmitScanRequest {
            repository_id: "repo-1".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            branch: None,
            commit_sha: None,
            scan_type: None,
            priority: None,
            agents: Some(vec!["semgrep".to_string(), "bandit".to_string()]),
            user_id: None,
        })
        .await
        .unwrap();

    let scheduler = Arc::new(Scheduler::new(
        fast_scheduler_config(),
        queue,
        job_store.clone(),
        finding_store.clone(),
        Arc::new(registry),
        consensus,
    ));

    let shutdown = Arc::new(Notify::new());
    let scheduler_clone = scheduler.clone();
    let shutdown_clone = shutdown.clone();
    let handle = tokio::spawn(async move { scheduler_clone.run_forever(shutdown_clone).await });

    let mut status = admission.get_scan_status(&job.id).await.unwrap();
    for _ in 0..100 {
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = admission.get_scan_status(&job.id).await.unwrap();
    }
    shutdown.notify_one();
    let _ = handle.await;

    assert_eq!(status.status, ScanStatus::Completed);
    assert_eq!(order.load(Ordering::SeqCst), 2);

    let findings = finding_store.get_findings(&job.id).await.unwrap();
    assert_eq!(findings.len(), 1);
    assert!(findings[0].consensus_score >= 0.95);
    assert_eq!(findings[0].agreement_count, 2);
}

/// S6. Priority respect: J1 (low priority) then J2 (high priority)
/// submitted within 1ms, with scheduler capacity 1. J2 must start
/// first.
#[tokio::test]
async fn higher_priority_job_starts_before_lower_priority_job_under_capacity_one() {
    let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
    let job_store = Arc::new(InMemoryJobStore::new());
    let finding_store = Arc::new(InMemoryFindingStore::new());
    let consensus = Arc::new(ConsensusEngine::new(ConsensusConfig::default()));

    let start_order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(RecordingAgent {
        name: "semgrep".to_string(),
        start_order: Arc::new(AtomicUsize::new(0)),
        order_slot: start_order.clone(),
        findings: vec![],
    }));

    let admission = AdmissionService::new(AdmissionConfig::default(), job_store.clone(), queue.clone());

    let low = admission
        .submit_scan(SubmitScanRequest {
            repository_id: "repo-low".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            branch: None,
            commit_sha: None,
            scan_type: None,
            priority: Some(1),
            agents: Some(vec!["semgrep".to_string()]),
            user_id: None,
        })
        .await
        .unwrap();
    let high = admission
        .submit_scan(SubmitScanRequest {
            repository_id: "repo-high".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            branch: None,
            commit_sha: None,
            scan_type: None,
            priority: Some(10),
            agents: Some(vec!["semgrep".to_string()]),
            user_id: None,
        })
        .await
        .unwrap();

    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            max_parallel_jobs: 1,
            ..fast_scheduler_config()
        },
        queue,
        job_store.clone(),
        finding_store,
        Arc::new(registry),
        consensus,
    ));

    let shutdown = Arc::new(Notify::new());
    let scheduler_clone = scheduler.clone();
    let shutdown_clone = shutdown.clone();
    let handle = tokio::spawn(async move { scheduler_clone.run_forever(shutdown_clone).await });

    for _ in 0..100 {
        let low_status = admission.get_scan_status(&low.id).await.unwrap();
        let high_status = admission.get_scan_status(&high.id).await.unwrap();
        if low_status.status.is_terminal() && high_status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.notify_one();
    let _ = handle.await;

    let order = start_order.lock().unwrap();
    assert_eq!(order.first(), Some(&high.id), "J2 (higher priority) must start before J1");
    drop(order);

    let low_status = admission.get_scan_status(&low.id).await.unwrap();
    let high_status = admission.get_scan_status(&high.id).await.unwrap();
    assert_eq!(low_status.status, ScanStatus::Completed);
    assert_eq!(high_status.status, ScanStatus::Completed);
}
