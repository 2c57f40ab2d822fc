//! Priority Queue (§4.2): a durable multi-priority FIFO keyed by
//! `(priority desc, submit_time asc)`, with at-most-once delivery
//! within a visibility window.
//!
//! `PriorityQueue` is the abstract interface a durable backing store
//! (Redis-style sorted set, SQS, etc.) would implement. `InMemoryQueue`
//! is the single-node reference implementation used by tests and the
//! CLI demo; a real deployment replaces it without touching the
//! scheduler.

use crate::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// A queued reference to a job: just enough to order and claim it.
/// The job body itself lives in the job store (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub job_id: String,
    pub priority: u8,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl Ord for JobRef {
    /// Higher priority first; within a priority, earlier submission first.
    /// `BinaryHeap` is a max-heap, so "earlier" must compare as "greater".
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
    }
}

impl PartialOrd for JobRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[async_trait]
pub trait PriorityQueue: Send + Sync {
    async fn enqueue(&self, job_ref: JobRef) -> Result<()>;

    /// Blocks until an item is available or `timeout` elapses.
    /// Returns `None` on timeout. Delivery is at-most-once within the
    /// queue's visibility window until `ack`/`nack` is called.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobRef>>;

    async fn ack(&self, job_id: &str) -> Result<()>;
    async fn nack(&self, job_id: &str, retry_delay: Duration) -> Result<()>;

    async fn len(&self) -> usize;
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

struct InFlight {
    job_ref: JobRef,
    visible_again_at: Instant,
}

struct State {
    heap: BinaryHeap<JobRef>,
    unclaimed_ids: HashSet<String>,
    in_flight: HashMap<String, InFlight>,
}

/// Single-node reference implementation of `PriorityQueue` (§9: "an
/// in-process implementation is acceptable for single-node
/// deployments; crash recovery becomes the caller's responsibility").
pub struct InMemoryQueue {
    state: Mutex<State>,
    visibility_timeout: Duration,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                unclaimed_ids: HashSet::new(),
                in_flight: HashMap::new(),
            }),
            visibility_timeout,
            notify: Notify::new(),
        }
    }

    /// Sweeps in-flight items whose visibility window has elapsed back
    /// onto the heap — the at-most-once-within-window guarantee of §4.2.
    fn requeue_expired(state: &mut State) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, v)| v.visible_again_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for id in expired {
            if let Some(item) = state.in_flight.remove(&id) {
                warn!(job_id = %id, "visibility timeout elapsed, requeuing");
                state.unclaimed_ids.insert(id);
                state.heap.push(item.job_ref);
            }
        }
    }
}

#[async_trait]
impl PriorityQueue for InMemoryQueue {
    async fn enqueue(&self, job_ref: JobRef) -> Result<()> {
        let mut state = self.state.lock().await;
        // §4.2 invariant: the same job id cannot appear twice concurrently unclaimed.
        if state.unclaimed_ids.contains(&job_ref.job_id) || state.in_flight.contains_key(&job_ref.job_id) {
            debug!(job_id = %job_ref.job_id, "already queued, ignoring duplicate enqueue");
            return Ok(());
        }
        state.unclaimed_ids.insert(job_ref.job_id.clone());
        state.heap.push(job_ref);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                Self::requeue_expired(&mut state);
                if let Some(job_ref) = state.heap.pop() {
                    state.unclaimed_ids.remove(&job_ref.job_id);
                    state.in_flight.insert(
                        job_ref.job_id.clone(),
                        InFlight {
                            job_ref: job_ref.clone(),
                            visible_again_at: Instant::now() + self.visibility_timeout,
                        },
                    );
                    return Ok(Some(job_ref));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn ack(&self, job_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(job_id);
        Ok(())
    }

    async fn nack(&self, job_id: &str, retry_delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(mut item) = state.in_flight.remove(job_id) {
            if retry_delay.is_zero() {
                state.unclaimed_ids.insert(job_id.to_string());
                state.heap.push(item.job_ref);
                drop(state);
                self.notify.notify_one();
            } else {
                item.visible_again_at = Instant::now() + retry_delay;
                state.in_flight.insert(job_id.to_string(), item);
            }
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.heap.len() + state.in_flight.len()
    }
}

pub type SharedQueue = Arc<dyn PriorityQueue>;
