//! Workflows
//!
//! The [`Orchestrator`] turns a routing decision into work: decomposition
//! into sub-issues, execution of one task, or a full multi-stage pipeline.
//! It is an explicitly constructed value holding handles to its
//! collaborators. Every failure ends up in the returned [`Outcome`].

pub mod transition;

pub use transition::{transition, TransitionError};

use crate::capability::CapabilityRegistry;
use crate::conductor::{parse_sub_tasks, BriefBuilder, Pipeline, PipelineReport};
use crate::config::{ConventionsConfig, TrackerConfig};
use sdk::{
    CapabilityKind, Decision, FailureKind, ItemSource, Outcome, TaskType, Ticketing, TrackedItem,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Workflow state names written back to the tracker, in fallback order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNames {
    pub done: Vec<String>,
    pub planned: Vec<String>,
}

impl From<&TrackerConfig> for StateNames {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            done: config.done_states.clone(),
            planned: config.planned_states.clone(),
        }
    }
}

/// Runs workflows against the capability registry and the tracker
#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Pipeline,
    ticketing: Arc<dyn Ticketing>,
    states: StateNames,
    stages: Vec<CapabilityKind>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        ticketing: Arc<dyn Ticketing>,
        conventions: ConventionsConfig,
        states: StateNames,
        stages: Vec<CapabilityKind>,
    ) -> Self {
        let briefs = Arc::new(BriefBuilder::new(conventions));
        Self {
            pipeline: Pipeline::new(registry, briefs),
            ticketing,
            states,
            stages,
        }
    }

    /// Stages used by [`Orchestrator::run_pipeline`]
    pub fn stages(&self) -> &[CapabilityKind] {
        &self.stages
    }

    /// Run the workflow for a routing decision
    pub async fn handle(&self, decision: Decision, item: &TrackedItem) -> Outcome {
        match decision {
            Decision::Decompose => self.decompose(item).await,
            Decision::Execute(task) => self.execute(task, item).await,
            Decision::Skip => Outcome::skipped("No routing rule matched"),
        }
    }

    /// Plan sub-tasks, create them as issues, then mark the parent planned
    ///
    /// If planning fails the parent is left untouched so a re-delivery can
    /// retry from scratch. Sub-issue creation is best effort.
    pub async fn decompose(&self, item: &TrackedItem) -> Outcome {
        info!(item = %item.display_ref(), "Decomposition starting");

        let report = self.pipeline.run(&[CapabilityKind::Planning], item).await;
        if let Some(outcome) = halted_outcome(&report, "Planning") {
            return outcome;
        }

        let plan_text = report.final_output().unwrap_or_default();
        let specs = if plan_text.is_empty() {
            Vec::new()
        } else {
            match parse_sub_tasks(plan_text) {
                Ok(specs) => specs,
                Err(e) => {
                    error!(item = %item.display_ref(), "Planning reply unusable: {}", e);
                    return Outcome::failed(FailureKind::InvalidPlan, e.to_string())
                        .with_stages(report.stages);
                }
            }
        };

        let total = specs.len();
        let mut created = Vec::with_capacity(total);
        let mut warnings = Vec::new();
        for spec in &specs {
            let issue = spec.to_new_issue(item.display_ref());
            match self.ticketing.create_issue(&issue).await {
                Ok(identifier) => {
                    info!(identifier = %identifier, title = %issue.title, "Sub-issue created");
                    created.push(identifier);
                }
                Err(e) => {
                    warn!(title = %issue.title, "Sub-issue creation failed: {}", e);
                    warnings.push(format!("Failed to create '{}': {}", issue.title, e));
                }
            }
        }

        if total > 0 && created.is_empty() {
            let mut outcome = Outcome::failed(
                FailureKind::TrackerWrite,
                format!("None of the {} planned sub-issues could be created", total),
            )
            .with_stages(report.stages);
            outcome.warnings = warnings;
            return outcome;
        }

        let mut message = if total == 0 {
            "Planning produced no sub-tasks".to_string()
        } else {
            format!("Created {} of {} sub-issues", created.len(), total)
        };
        if !created.is_empty() {
            message.push_str(&format!(": {}", created.join(", ")));
        }

        let mut outcome = Outcome::success(message).with_stages(report.stages);
        outcome.warnings = warnings;
        self.write_status(item, &self.states.planned, outcome).await
    }

    /// Run one capability, then mark the item done
    pub async fn execute(&self, task: TaskType, item: &TrackedItem) -> Outcome {
        info!(item = %item.display_ref(), task = %task, "Execution starting");

        let report = self.pipeline.run(&[CapabilityKind::Task(task)], item).await;
        if let Some(outcome) = halted_outcome(&report, task.as_str()) {
            return outcome;
        }

        let outcome = Outcome::success(format!("{} task completed", task)).with_stages(report.stages);
        self.write_status(item, &self.states.done, outcome).await
    }

    /// Run the configured multi-stage pipeline
    ///
    /// Pipeline items are synthesized from a requirement or a comment, so
    /// nothing is written back to the tracker.
    pub async fn run_pipeline(&self, item: &TrackedItem) -> Outcome {
        self.run_stages(&self.stages, item).await
    }

    pub async fn run_stages(&self, stages: &[CapabilityKind], item: &TrackedItem) -> Outcome {
        info!(item = %item.display_ref(), stages = stages.len(), "Pipeline starting");

        let report = self.pipeline.run(stages, item).await;
        if let Some(outcome) = halted_outcome(&report, "Pipeline") {
            return outcome;
        }

        Outcome::success(format!("Pipeline completed {} stages", report.stages.len()))
            .with_stages(report.stages)
    }

    /// Move a tracker item to the first accepted state name
    ///
    /// A failed write becomes a warning on the outcome. Items that did not
    /// come from the tracker have no status to write.
    async fn write_status(&self, item: &TrackedItem, names: &[String], outcome: Outcome) -> Outcome {
        if item.source != ItemSource::Tracker || item.id.is_empty() {
            return outcome;
        }

        match transition(self.ticketing.as_ref(), &item.id, names).await {
            Ok(state) => {
                info!(item = %item.display_ref(), state = %state, "Status updated");
                outcome
            }
            Err(e) => {
                warn!(item = %item.display_ref(), "Status update failed: {}", e);
                outcome.with_warning(format!("Status update failed: {}", e))
            }
        }
    }
}

/// Failed outcome for a halted report, keeping the stages attempted
fn halted_outcome(report: &PipelineReport, what: &str) -> Option<Outcome> {
    let halt = report.halted.as_ref()?;
    let mut message = format!("{} failed at stage '{}': {}", what, halt.stage, halt.reason);
    if halt.failure == FailureKind::RateLimited {
        message.push_str(" (rate limited; re-deliver the event to retry)");
    }
    Some(Outcome::failed(halt.failure, message).with_stages(report.stages.clone()))
}
