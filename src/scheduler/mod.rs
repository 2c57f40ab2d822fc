//! Scheduler (§4.3): the long-lived process that dequeues jobs, fans
//! out one `AgentTask` per requested agent under bounded concurrency,
//! retries with exponential backoff, and invokes the Consensus Engine
//! once every agent has reached a terminal outcome.

pub mod backoff;

use crate::config::SchedulerConfig;
use crate::consensus::ConsensusEngine;
use crate::executor::{Agent, AgentExecutor, ScanContext};
use crate::models::{AgentTask, AgentTaskStatus, Finding, ScanJob};
use crate::queue::SharedQueue;
use crate::store::{SharedFindingStore, SharedJobStore};
use crate::{AgentScanError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{error, info, warn};

/// Registry of pluggable agent implementations (§9: "a registry maps
/// agent-name strings to implementations").
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name(), agent);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }
}

/// Tracks cancellation requests per job so in-flight agent tasks can
/// observe them cooperatively (§5: "cooperative cancellation via a
/// pervasive context/deadline value").
#[derive(Default)]
struct CancellationRegistry {
    cancelled: RwLock<HashMap<String, Arc<Notify>>>,
}

impl CancellationRegistry {
    async fn signal(&self, job_id: &str) {
        let notify = {
            let mut map = self.cancelled.write().await;
            map.entry(job_id.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
        };
        notify.notify_waiters();
    }

    async fn token(&self, job_id: &str) -> Arc<Notify> {
        let mut map = self.cancelled.write().await;
        map.entry(job_id.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    async fn clear(&self, job_id: &str) {
        self.cancelled.write().await.remove(job_id);
    }
}

/// Drives the full lifecycle of one job: fan-out, retries, timeout
/// and cancellation enforcement, and the final consensus pass.
pub struct Scheduler {
    config: SchedulerConfig,
    queue: SharedQueue,
    job_store: SharedJobStore,
    finding_store: SharedFindingStore,
    registry: Arc<AgentRegistry>,
    consensus: Arc<ConsensusEngine>,
    job_semaphore: Arc<Semaphore>,
    cancellations: Arc<CancellationRegistry>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        queue: SharedQueue,
        job_store: SharedJobStore,
        finding_store: SharedFindingStore,
        registry: Arc<AgentRegistry>,
        consensus: Arc<ConsensusEngine>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            queue,
            job_store,
            finding_store,
            registry,
            consensus,
            job_semaphore,
            cancellations: Arc::new(CancellationRegistry::default()),
        }
    }

    /// Main loop: continuously dequeue and run jobs until `shutdown`
    /// is notified. One job acquires one permit from `job_semaphore`
    /// for the duration of its run, enforcing `max_parallel_jobs`.
    pub async fn run_forever(self: Arc<Self>, shutdown: Arc<Notify>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("scheduler received shutdown signal");
                    return;
                }
                dequeued = self.queue.dequeue(Duration::from_millis(crate::constants::QUEUE_POLL_INTERVAL_MS)) => {
                    match dequeued {
                        Ok(Some(job_ref)) => {
                            let scheduler = self.clone();
                            let job_id = job_ref.job_id.clone();
                            tokio::spawn(async move {
                                let permit = scheduler.job_semaphore.clone().acquire_owned().await;
                                match permit {
                                    Ok(_permit) => {
                                        if let Err(e) = scheduler.run_job(&job_id).await {
                                            error!(job_id = %job_id, error = %e, "job run failed");
                                        }
                                        let _ = scheduler.queue.ack(&job_id).await;
                                    }
                                    Err(_) => {
                                        let _ = scheduler.queue.nack(&job_id, Duration::ZERO).await;
                                    }
                                }
                            });
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "queue dequeue failed"),
                    }
                }
            }
        }
    }

    /// Signals `CancelScan` cooperative cancellation for `job_id`
    /// (§4.1, §5): in-flight agent tasks for this job observe it on
    /// their next await point.
    pub async fn cancel(&self, job_id: &str) {
        self.cancellations.signal(job_id).await;
    }

    /// Runs one job end to end: §4.3 responsibilities 1-6.
    async fn run_job(&self, job_id: &str) -> Result<()> {
        let mut job = self.job_store.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }

        job.mark_running();
        self.job_store.update(job.clone()).await?;

        let cancel_token = self.cancellations.token(job_id).await;
        let agent_semaphore = Arc::new(Semaphore::new(self.config.max_parallel_agents_per_job));

        let mut handles = Vec::new();
        for agent_name in job.agents_requested.clone() {
            let agent = self.registry.get(&agent_name);
            let permit_source = agent_semaphore.clone();
            let config = self.config.clone();
            let job = job.clone();
            let cancel_token = cancel_token.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit_source.acquire_owned().await.ok();
                run_agent_task(agent, agent_name, job, config, cancel_token).await
            }));
        }

        let job_deadline = tokio::time::sleep(Duration::from_secs(self.config.job_timeout_secs));
        tokio::pin!(job_deadline);

        let mut outcomes = Vec::new();
        let mut remaining: futures::stream::FuturesUnordered<_> = handles.into_iter().collect();
        loop {
            if remaining.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancel_token.notified() => {
                    warn!(job_id = %job_id, "cancellation observed, waiting grace period");
                    let grace = tokio::time::sleep(Duration::from_secs(self.config.cancel_grace_period_secs));
                    tokio::pin!(grace);
                    loop {
                        if remaining.is_empty() {
                            break;
                        }
                        tokio::select! {
                            _ = &mut grace => {
                                warn!(job_id = %job_id, "grace period expired, abandoning remaining tasks");
                                break;
                            }
                            result = futures::StreamExt::next(&mut remaining) => {
                                let Some(result) = result else { break; };
                                outcomes.push(result.map_err(|e| AgentScanError::Internal(anyhow::anyhow!(e)))?);
                            }
                        }
                    }
                    self.finalize_cancelled(&mut job).await?;
                    self.cancellations.clear(job_id).await;
                    return Ok(());
                }
                _ = &mut job_deadline => {
                    warn!(job_id = %job_id, "job wall-clock timeout elapsed");
                    break;
                }
                result = futures::StreamExt::next(&mut remaining) => {
                    let Some(result) = result else { break; };
                    outcomes.push(result.map_err(|e| AgentScanError::Internal(anyhow::anyhow!(e)))?);
                }
            }
        }

        self.cancellations.clear(job_id).await;
        self.finalize(&mut job, outcomes).await
    }

    async fn finalize_cancelled(&self, job: &mut ScanJob) -> Result<()> {
        job.mark_cancelled();
        self.job_store.update(job.clone()).await
    }

    /// §4.3 responsibility 6: gather findings from successful agents,
    /// invoke consensus, persist, and set terminal job status.
    async fn finalize(&self, job: &mut ScanJob, outcomes: Vec<TaskOutcome>) -> Result<()> {
        let mut all_findings = Vec::new();
        let mut any_succeeded = false;

        for outcome in outcomes {
            job.record_agent_completed(&outcome.agent_name);
            match outcome.status {
                AgentTaskStatus::Succeeded => {
                    any_succeeded = true;
                    all_findings.extend(outcome.findings);
                }
                _ => {
                    warn!(
                        job_id = %job.id,
                        agent = %outcome.agent_name,
                        status = ?outcome.status,
                        "agent did not succeed"
                    );
                }
            }
        }

        if !any_succeeded {
            job.mark_failed("all requested agents failed".to_string());
            self.job_store.update(job.clone()).await?;
            return Ok(());
        }

        let consensus = self
            .consensus
            .run(all_findings, &job.agents_requested)
            .await;

        match self.finding_store.save_findings(&job.id, consensus).await {
            Ok(()) => {
                job.mark_completed();
                self.job_store.update(job.clone()).await?;
                Ok(())
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "persisting consensus findings failed");
                job.mark_failed(format!("persistence failure: {e}"));
                self.job_store.update(job.clone()).await?;
                Ok(())
            }
        }
    }
}

struct TaskOutcome {
    agent_name: String,
    status: AgentTaskStatus,
    findings: Vec<Finding>,
}

/// Runs one `(job, agent)` task to a terminal `AgentTaskStatus`,
/// retrying retryable failures with full-jitter exponential backoff
/// up to `max_retries` (§4.3 responsibilities 3-4).
async fn run_agent_task(
    agent: Option<Arc<dyn Agent>>,
    agent_name: String,
    job: ScanJob,
    config: SchedulerConfig,
    cancel_token: Arc<Notify>,
) -> TaskOutcome {
    let Some(agent) = agent else {
        return TaskOutcome {
            agent_name,
            status: AgentTaskStatus::Failed,
            findings: Vec::new(),
        };
    };

    let mut task = AgentTask::new(job.id.clone(), agent_name.clone(), config.max_retries, config.task_timeout_secs);
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::from_entropy();

    loop {
        task.attempt += 1;
        task.status = AgentTaskStatus::Running;

        let ctx = ScanContext {
            job_id: job.id.clone(),
            repo_url: job.repo_url.clone(),
            branch: job.branch.clone(),
            commit_sha: job.commit_sha.clone(),
            workspace_hint: None,
            config: HashMap::new(),
        };

        let run = AgentExecutor::run(agent.as_ref(), &ctx, Duration::from_secs(config.task_timeout_secs));

        tokio::select! {
            _ = cancel_token.notified() => {
                task.status = AgentTaskStatus::Cancelled;
                return TaskOutcome { agent_name, status: task.status, findings: Vec::new() };
            }
            result = run => {
                match result {
                    Ok(findings) => {
                        task.status = AgentTaskStatus::Succeeded;
                        info!(job_id = %job.id, agent = %agent_name, attempt = task.attempt, "agent task succeeded");
                        return TaskOutcome { agent_name, status: task.status, findings };
                    }
                    Err(e) if e.is_retryable() && task.can_retry() => {
                        let delay = task.next_backoff_delay(
                            config.backoff_base_ms,
                            config.backoff_factor,
                            config.backoff_cap_ms,
                            &mut rng,
                        );
                        warn!(
                            job_id = %job.id,
                            agent = %agent_name,
                            attempt = task.attempt,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "agent task failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        task.status = if matches!(e, AgentScanError::Timeout { .. }) {
                            AgentTaskStatus::TimedOut
                        } else {
                            AgentTaskStatus::Failed
                        };
                        warn!(job_id = %job.id, agent = %agent_name, error = %e, "agent task failed, not retrying");
                        return TaskOutcome { agent_name, status: task.status, findings: Vec::new() };
                    }
                }
            }
        }
    }
}
