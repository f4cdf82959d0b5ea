//! Sequential pipeline
//!
//! Runs capabilities one after another. Stage `i` starts only after stage
//! `i - 1` finished and sees the outputs of every earlier stage. The first
//! fatal stage halts the pipeline; results gathered so far are kept.

use crate::capability::CapabilityRegistry;
use crate::conductor::brief::BriefBuilder;
use sdk::{
    CapabilityError, CapabilityKind, FailureKind, ReplyStatus, StageResult, StageStatus,
    TrackedItem,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Why a pipeline stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halt {
    pub stage: String,
    pub failure: FailureKind,
    pub reason: String,
}

/// Stages attempted, in order, plus the halt if one occurred
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stages: Vec<StageResult>,
    pub halted: Option<Halt>,
}

impl PipelineReport {
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }

    /// Output of the last stage that produced one
    pub fn final_output(&self) -> Option<&str> {
        self.stages
            .iter()
            .rev()
            .find(|s| s.status == StageStatus::Completed)
            .map(|s| s.output.as_str())
    }
}

/// Executes ordered capability stages against one item
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<CapabilityRegistry>,
    briefs: Arc<BriefBuilder>,
}

impl Pipeline {
    pub fn new(registry: Arc<CapabilityRegistry>, briefs: Arc<BriefBuilder>) -> Self {
        Self { registry, briefs }
    }

    /// Run `stages` in order
    pub async fn run(&self, stages: &[CapabilityKind], item: &TrackedItem) -> PipelineReport {
        let mut results: Vec<StageResult> = Vec::with_capacity(stages.len());

        for (index, &kind) in stages.iter().enumerate() {
            let name = kind.as_str().to_string();
            info!(stage = %name, index, total = stages.len(), "Stage starting");

            let result = self.run_stage(kind, name, item, &results).await;
            let halt = match (&result.status, result.failure) {
                (StageStatus::Failed, Some(failure)) => Some(Halt {
                    stage: result.name.clone(),
                    failure,
                    reason: result.output.clone(),
                }),
                _ => None,
            };
            results.push(result);

            if let Some(halt) = halt {
                warn!(
                    stage = %halt.stage,
                    skipped = stages.len() - index - 1,
                    "Pipeline halted"
                );
                return PipelineReport {
                    stages: results,
                    halted: Some(halt),
                };
            }
        }

        PipelineReport {
            stages: results,
            halted: None,
        }
    }

    async fn run_stage(
        &self,
        kind: CapabilityKind,
        name: String,
        item: &TrackedItem,
        prior: &[StageResult],
    ) -> StageResult {
        let brief = self.briefs.build(kind, item, prior);
        let start = Instant::now();
        let reply = self.registry.invoke(kind, &brief).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, output, failure) = match reply {
            Ok(reply) => match reply.status {
                ReplyStatus::Success => (StageStatus::Completed, reply.artifact, None),
                ReplyStatus::NotApplicable => {
                    info!(stage = %name, "Stage not applicable");
                    (StageStatus::NotApplicable, reply.artifact, None)
                }
                ReplyStatus::Error => {
                    error!(stage = %name, "Capability reported an error");
                    (
                        StageStatus::Failed,
                        reply.artifact,
                        Some(FailureKind::Capability),
                    )
                }
            },
            Err(CapabilityError::RateLimited(message)) => {
                error!(
                    stage = %name,
                    "Rate limited: {}. Re-deliver the event once the quota resets",
                    message
                );
                (StageStatus::Failed, message, Some(FailureKind::RateLimited))
            }
            Err(CapabilityError::Failed(message)) => {
                error!(stage = %name, "Capability failed: {}", message);
                (StageStatus::Failed, message, Some(FailureKind::Capability))
            }
        };

        info!(stage = %name, ?status, duration_ms, "Stage finished");

        StageResult {
            name,
            capability: kind,
            status,
            output,
            failure,
            duration_ms,
        }
    }
}
