//! Brief assembly
//!
//! Packs the item, the project context, the per-domain conventions and the
//! outputs of earlier stages into the single text a capability receives.

use crate::config::ConventionsConfig;
use sdk::{CapabilityKind, StageResult, StageStatus, TrackedItem};

const NO_DESCRIPTION: &str = "No description provided.";

/// Builds capability briefs from a shared set of conventions
#[derive(Debug, Clone)]
pub struct BriefBuilder {
    conventions: ConventionsConfig,
}

impl BriefBuilder {
    pub fn new(conventions: ConventionsConfig) -> Self {
        Self { conventions }
    }

    /// Brief for one capability, with all prior stage outputs as context
    pub fn build(
        &self,
        kind: CapabilityKind,
        item: &TrackedItem,
        prior: &[StageResult],
    ) -> String {
        let mut brief = String::new();
        push_item(&mut brief, item);

        let context = self.conventions.project_context.trim();
        if !context.is_empty() {
            brief.push_str("\n\n--- Project Context ---\n");
            brief.push_str(context);
        }

        if let CapabilityKind::Task(task) = kind {
            let conventions = self.conventions.for_task(task).trim();
            if !conventions.is_empty() {
                brief.push_str(&format!("\n\n--- {} Conventions ---\n", task));
                brief.push_str(conventions);
            }
        }

        let finished: Vec<&StageResult> = prior.iter().filter(|s| s.is_finished()).collect();
        if !finished.is_empty() {
            brief.push_str("\n\n--- Earlier Stages ---");
            for stage in finished {
                let marker = match stage.status {
                    StageStatus::NotApplicable => " (not applicable)",
                    _ => "",
                };
                brief.push_str(&format!("\n\n## {}{}\n{}", stage.name, marker, stage.output.trim()));
            }
        }

        brief.push_str("\n\n--- Instructions ---\n");
        brief.push_str(instructions(kind));
        brief
    }
}

fn push_item(brief: &mut String, item: &TrackedItem) {
    brief.push_str("Task: ");
    brief.push_str(item.title.trim());
    brief.push_str("\n\nDescription:\n");
    let description = item.description.trim();
    brief.push_str(if description.is_empty() {
        NO_DESCRIPTION
    } else {
        description
    });
}

fn instructions(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Planning => {
            "Analyze this requirement and break it down into concrete development tasks. \
             Give every task a type (frontend, backend, database or review), a clear title and \
             description, and acceptance criteria. Take dependencies between tasks into account."
        }
        CapabilityKind::Task(_) => {
            "Complete this task: understand what is required, look at the relevant code, \
             create or update the code, and make sure it meets the conventions above."
        }
    }
}
