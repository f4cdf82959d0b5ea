//! Dispatcher
//!
//! Entry point for inbound work. A request is classified, claimed and
//! recorded on the caller's task, then queued. Workers pick jobs off a
//! bounded queue and run the matching workflow, at most `workers` at a time.
//!
//! A full queue rejects new work with [`DispatchStatus::Busy`] instead of
//! growing. Shutdown closes intake and waits for queued and running jobs up
//! to the configured grace period.

use crate::config::DispatcherConfig;
use crate::db::{claim_key, ClaimStore, RunRepository};
use crate::router::classify_with_trace;
use crate::workflows::Orchestrator;
use async_trait::async_trait;
use sdk::{
    Decision, DispatchHandle, DispatchRequest, DispatchStatus, ItemSource, Outcome,
    OutcomeStatus, TrackedItem,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// What a queued job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Workflow(Decision),
    Pipeline,
}

impl JobKind {
    pub fn label(&self) -> String {
        match self {
            JobKind::Workflow(decision) => decision.to_string(),
            JobKind::Pipeline => "pipeline".to_string(),
        }
    }
}

#[derive(Debug)]
struct Job {
    run_id: String,
    kind: JobKind,
    item: TrackedItem,
    claim: Option<String>,
}

/// Shared state for workers
#[derive(Clone)]
struct Workers {
    orchestrator: Arc<Orchestrator>,
    runs: RunRepository,
    claims: ClaimStore,
}

/// Bounded worker pool in front of the [`Orchestrator`]
pub struct Dispatcher {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    intake: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    workers: Workers,
    grace: Duration,
}

impl Dispatcher {
    /// Start the intake loop and return the handle used to submit work
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        runs: RunRepository,
        claims: ClaimStore,
        config: &DispatcherConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let workers = Workers {
            orchestrator,
            runs,
            claims,
        };

        let intake = tokio::spawn(intake_loop(rx, workers.clone(), config.workers.max(1)));

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Dispatcher started"
        );

        Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            intake: tokio::sync::Mutex::new(Some(intake)),
            workers,
            grace: Duration::from_secs(config.shutdown_grace_secs),
        })
    }

    fn sender(&self) -> Option<mpsc::Sender<Job>> {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stop accepting work and wait for queued and running jobs
    ///
    /// Returns `false` if the grace period ran out first.
    pub async fn shutdown(&self) -> bool {
        info!("Dispatcher shutting down");
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(intake) = self.intake.lock().await.take() else {
            return true;
        };

        match tokio::time::timeout(self.grace, intake).await {
            Ok(Ok(())) => {
                info!("All dispatched runs finished");
                true
            }
            Ok(Err(e)) => {
                error!("Dispatcher intake task failed: {}", e);
                false
            }
            Err(_) => {
                warn!(
                    grace_secs = self.grace.as_secs(),
                    "Grace period elapsed with runs still in flight"
                );
                false
            }
        }
    }

    async fn release_claim(&self, claim: Option<&str>, run_id: &str) {
        if let Some(key) = claim {
            if let Err(e) = self.workers.claims.release(key, run_id).await {
                warn!(run_id, "Failed to release claim: {:#}", e);
            }
        }
    }
}

#[async_trait]
impl DispatchHandle for Dispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> DispatchStatus {
        let Some(sender) = self.sender() else {
            return DispatchStatus::Unavailable;
        };

        let (item, kind) = match request {
            DispatchRequest::Classify(item) => {
                let (decision, rule) = classify_with_trace(&item);
                info!(item = %item.display_ref(), %decision, rule, "Item classified");
                if decision == Decision::Skip {
                    return DispatchStatus::Skipped {
                        reason: format!("classified as skip ({})", rule),
                    };
                }
                (item, JobKind::Workflow(decision))
            }
            DispatchRequest::Pipeline(item) => (item, JobKind::Pipeline),
        };

        let run_id = uuid::Uuid::new_v4().to_string();

        // Only tracker items have a stable identity to claim
        let claim = (item.source == ItemSource::Tracker && !item.id.is_empty())
            .then(|| claim_key(&item));
        if let Some(key) = &claim {
            match self.workers.claims.try_claim(key, &item.id, &run_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(item = %item.display_ref(), "Duplicate delivery skipped");
                    return DispatchStatus::Skipped {
                        reason: "duplicate delivery".to_string(),
                    };
                }
                Err(e) => warn!(
                    item = %item.display_ref(),
                    "Claim check failed, dispatching anyway: {:#}",
                    e
                ),
            }
        }

        let label = kind.label();
        if let Err(e) = self.workers.runs.create_run(&run_id, &item, &label).await {
            warn!(run_id = %run_id, "Failed to record run: {:#}", e);
        }

        let job = Job {
            run_id: run_id.clone(),
            kind,
            item,
            claim,
        };

        match sender.try_send(job) {
            Ok(()) => {
                info!(run_id = %run_id, job = %label, "Run accepted");
                DispatchStatus::Accepted {
                    run_id,
                    job: label,
                }
            }
            Err(TrySendError::Full(job)) => {
                warn!(run_id = %run_id, "Worker queue full, rejecting run");
                self.release_claim(job.claim.as_deref(), &run_id).await;
                if let Err(e) = self.workers.runs.fail_run(&run_id, "rejected: queue full").await {
                    warn!(run_id = %run_id, "Failed to record rejection: {:#}", e);
                }
                DispatchStatus::Busy
            }
            Err(TrySendError::Closed(job)) => {
                self.release_claim(job.claim.as_deref(), &run_id).await;
                if let Err(e) = self.workers.runs.fail_run(&run_id, "rejected: shutting down").await {
                    warn!(run_id = %run_id, "Failed to record rejection: {:#}", e);
                }
                DispatchStatus::Unavailable
            }
        }
    }
}

/// Drain the queue, running at most `limit` jobs at once
///
/// Returns once the queue is closed and every started job has finished.
async fn intake_loop(mut rx: mpsc::Receiver<Job>, workers: Workers, limit: usize) {
    let semaphore = Arc::new(Semaphore::new(limit));

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };

        let run_id = job.run_id.clone();
        let claim = job.claim.clone();
        let run = tokio::spawn(run_job(job, workers.clone()));
        let workers = workers.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = run.await {
                error!(run_id = %run_id, "Run aborted: {}", e);
                if let Err(e) = workers.runs.fail_run(&run_id, "worker panicked").await {
                    warn!(run_id = %run_id, "Failed to record aborted run: {:#}", e);
                }
                if let Some(key) = claim {
                    if let Err(e) = workers.claims.release(&key, &run_id).await {
                        warn!(run_id = %run_id, "Failed to release claim: {:#}", e);
                    }
                }
            }
        });
    }

    // Every permit back means every job has finished
    let permits = u32::try_from(limit).unwrap_or(u32::MAX);
    let _ = semaphore.acquire_many(permits).await;
}

async fn run_job(job: Job, workers: Workers) {
    let span = info_span!("run", run_id = %job.run_id, item = %job.item.display_ref());

    async move {
        if let Err(e) = workers.runs.mark_running(&job.run_id).await {
            warn!("Failed to mark run as running: {:#}", e);
        }

        let start = Instant::now();
        let outcome = match job.kind {
            JobKind::Workflow(decision) => workers.orchestrator.handle(decision, &job.item).await,
            JobKind::Pipeline => workers.orchestrator.run_pipeline(&job.item).await,
        };
        let duration_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        log_outcome(&outcome, duration_ms);

        // A failed run may be retried by re-delivering the same event. The
        // claim goes before the ledger row so a finished run is retryable.
        if outcome.status == OutcomeStatus::Failed {
            if let Some(key) = &job.claim {
                if let Err(e) = workers.claims.release(key, &job.run_id).await {
                    warn!("Failed to release claim: {:#}", e);
                }
            }
        }

        if let Err(e) = workers
            .runs
            .complete_run(&job.run_id, &outcome, duration_ms)
            .await
        {
            warn!("Failed to record run outcome: {:#}", e);
        }
    }
    .instrument(span)
    .await
}

fn log_outcome(outcome: &Outcome, duration_ms: i64) {
    match outcome.status {
        OutcomeStatus::Success => info!(
            duration_ms,
            stages = outcome.stages.len(),
            warnings = outcome.warnings.len(),
            "Run succeeded: {}",
            outcome.message
        ),
        OutcomeStatus::Skipped => info!(duration_ms, "Run skipped: {}", outcome.message),
        OutcomeStatus::Failed => error!(
            duration_ms,
            failure = outcome.failure.map(|f| f.as_str()).unwrap_or("unknown"),
            "Run failed: {}",
            outcome.message
        ),
    }
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
}
