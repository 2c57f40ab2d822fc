use agentscan_core::admission::{AdmissionService, SubmitScanRequest};
use agentscan_core::config::Config;
use agentscan_core::consensus::ConsensusEngine;
use agentscan_core::executor::{Agent, AgentOutcome, RawFinding, ScanContext};
use agentscan_core::queue::InMemoryQueue;
use agentscan_core::scheduler::{AgentRegistry, Scheduler};
use agentscan_core::store::{InMemoryFindingStore, InMemoryJobStore, FindingStore};
use agentscan_core::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "agentscan", about = "Multi-agent static-analysis orchestration demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a scan against a small set of mock agents and print the
    /// consensus report once it completes.
    Demo {
        #[arg(long, default_value = "https://example.com/demo-repo.git")]
        repo_url: String,
        #[arg(long, default_value = "main")]
        branch: String,
    },
}

/// A mock analyzer used only by the `demo` subcommand, since no real
/// external tool integration is in scope here.
struct MockAgent {
    name: String,
    findings: Vec<RawFinding>,
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn scan(&self, _ctx: &ScanContext) -> Result<AgentOutcome> {
        Ok(AgentOutcome {
            succeeded: true,
            findings: self.findings.clone(),
            duration: Duration::from_millis(50),
            error: None,
        })
    }
}

fn shared_finding(rule_id: &str, file_path: &str, line: u32) -> RawFinding {
    RawFinding {
        rule_id: rule_id.to_string(),
        severity: "high".to_string(),
        category: "xss".to_string(),
        title: "reflected input reaches a sink without encoding".to_string(),
        description: "user-controlled input flows into an HTML sink".to_string(),
        file_path: file_path.to_string(),
        line,
        column: None,
        code_snippet: None,
        confidence: 0.85,
        references: vec![],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Command::Demo { repo_url, branch } => run_demo(config, repo_url, branch).await?,
    }

    Ok(())
}

async fn run_demo(config: Config, repo_url: String, branch: String) -> Result<()> {
    info!("submitting demo scan against {repo_url}@{branch}");

    let queue = Arc::new(InMemoryQueue::new(config.scheduler.queue_visibility_timeout()));
    let job_store = Arc::new(InMemoryJobStore::new());
    let finding_store = Arc::new(InMemoryFindingStore::new());
    let consensus = Arc::new(ConsensusEngine::new(config.consensus.clone()));

    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(MockAgent {
        name: "semgrep".to_string(),
        findings: vec![shared_finding("reflected-xss", "app.js", 42)],
    }));
    registry.register(Arc::new(MockAgent {
        name: "bandit".to_string(),
        findings: vec![shared_finding("reflected-xss", "app.js", 43)],
    }));

    let admission = AdmissionService::new(config.admission.clone(), job_store.clone(), queue.clone());
    let job = admission
        .submit_scan(SubmitScanRequest {
            repository_id: "demo-repo".to_string(),
            repo_url,
            branch: Some(branch),
            commit_sha: None,
            scan_type: None,
            priority: None,
            agents: Some(vec!["semgrep".to_string(), "bandit".to_string()]),
            user_id: None,
        })
        .await?;

    let scheduler = Arc::new(Scheduler::new(
        config.scheduler.clone(),
        queue,
        job_store.clone(),
        finding_store.clone(),
        Arc::new(registry),
        consensus,
    ));

    let shutdown = Arc::new(Notify::new());
    let scheduler_clone = scheduler.clone();
    let shutdown_clone = shutdown.clone();
    let loop_handle = tokio::spawn(async move { scheduler_clone.run_forever(shutdown_clone).await });

    loop {
        let status = admission.get_scan_status(&job.id).await?;
        if status.status.is_terminal() {
            println!("scan {} finished as {:?}", job.id, status.status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown.notify_one();
    let _ = loop_handle.await;

    let findings = finding_store.get_findings(&job.id).await?;
    for finding in findings {
        println!(
            "[{:?}] {} ({}:{}) score={:.2} supporting={:?}",
            finding.final_severity,
            finding.representative.title,
            finding.representative.file_path,
            finding.representative.line,
            finding.consensus_score,
            finding.supporting_tools,
        );
    }

    Ok(())
}
