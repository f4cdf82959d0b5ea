//! Integration tests for the decomposition, execution and pipeline workflows
//!
//! Capabilities and the tracker are in-memory fakes; see `common`.

mod common;

use common::{orchestrator, plan_json, FakeTracker, Team};
use sdk::{
    CapabilityError, CapabilityKind, CapabilityReply, Decision, FailureKind, OutcomeStatus,
    StageStatus, TaskType, TicketingError, TrackedItem,
};
use std::sync::Arc;

fn parent() -> TrackedItem {
    TrackedItem::new("issue-1", "Add a prediction market feature")
        .with_identifier("ENG-1")
        .with_description("Users can create and trade on markets")
        .with_state("Todo")
}

#[tokio::test]
async fn test_decompose_creates_sub_issues_and_marks_parent_planned() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success(plan_json())),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成", "Done"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.handle(Decision::Decompose, &parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert!(outcome.message.starts_with("Created 3 of 3 sub-issues"));
    assert!(outcome.warnings.is_empty());
    assert_eq!(team.invoked(), vec![CapabilityKind::Planning]);

    assert_eq!(
        tracker.created_titles(),
        vec![
            "[database] Create markets table",
            "[backend] Markets API",
            "[frontend] Markets page",
        ]
    );
    let created = tracker.created.lock().unwrap().clone();
    assert!(created
        .iter()
        .all(|issue| issue.labels.contains(&"ai-generated".to_string())));
    assert!(created[0].description.contains("- [ ] migration applies"));
    assert!(created[0].description.contains("Part of ENG-1"));

    assert_eq!(
        tracker.updates(),
        vec![("issue-1".to_string(), "规划完成".to_string())]
    );
}

#[tokio::test]
async fn test_decompose_reply_echoing_bracketed_title() {
    let reply = format!(
        "Plan for [AI] Add a prediction market:\n```json\n{}\n```\nSee [docs] for the schema.",
        plan_json().trim_start_matches("Here is the plan:\n")
    );
    let team = Team::new().reply(CapabilityKind::Planning, Ok(CapabilityReply::success(reply)));
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.handle(Decision::Decompose, &parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(tracker.created_titles().len(), 3);
    assert_eq!(
        tracker.updates(),
        vec![("issue-1".to_string(), "规划完成".to_string())]
    );
}

#[tokio::test]
async fn test_created_sub_issues_route_to_execution() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success(plan_json())),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    orchestrator.handle(Decision::Decompose, &parent()).await;

    // A created sub-issue arriving back through the webhook
    let issue = tracker.created.lock().unwrap()[1].clone();
    let item = TrackedItem::new("issue-2", issue.title).with_labels(issue.labels);
    assert_eq!(
        foreman_engine::router::classify(&item),
        Decision::Execute(TaskType::Backend)
    );
}

#[tokio::test]
async fn test_decompose_partial_creation_failure_is_a_warning() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success(plan_json())),
    );
    let tracker = Arc::new(FakeTracker {
        reject_titles: vec!["[backend] Markets API".to_string()],
        ..FakeTracker::with_states(&["规划完成"])
    });
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.decompose(&parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert!(outcome.message.starts_with("Created 2 of 3 sub-issues"));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("Markets API"));
    assert_eq!(tracker.updates().len(), 1);
}

#[tokio::test]
async fn test_decompose_all_creations_failing_leaves_parent_untouched() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success(plan_json())),
    );
    let tracker = Arc::new(FakeTracker {
        reject_all_creates: true,
        ..FakeTracker::with_states(&["规划完成"])
    });
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.decompose(&parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.failure, Some(FailureKind::TrackerWrite));
    assert_eq!(outcome.warnings.len(), 3);
    assert!(tracker.updates().is_empty());
}

#[tokio::test]
async fn test_decompose_with_unusable_plan_fails_without_writes() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success("I would split this into a few parts.")),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.decompose(&parent()).await;

    assert_eq!(outcome.failure, Some(FailureKind::InvalidPlan));
    assert!(tracker.created_titles().is_empty());
    assert!(tracker.updates().is_empty());
}

#[tokio::test]
async fn test_decompose_planning_failure_leaves_parent_untouched() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Err(CapabilityError::Failed("upstream exploded".to_string())),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.decompose(&parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.failure, Some(FailureKind::Capability));
    assert_eq!(outcome.stages.len(), 1);
    assert!(tracker.updates().is_empty());
}

#[tokio::test]
async fn test_decompose_empty_plan_still_marks_planned() {
    let team = Team::new().reply(
        CapabilityKind::Planning,
        Ok(CapabilityReply::success("[]")),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["规划完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.decompose(&parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.message, "Planning produced no sub-tasks");
    assert_eq!(tracker.updates().len(), 1);
}

#[tokio::test]
async fn test_execute_marks_done_with_fallback_state_name() {
    let team = Team::new();
    // This workspace only knows the localized name
    let tracker = Arc::new(FakeTracker::with_states(&["已完成"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let item = TrackedItem::new("issue-9", "[backend] Markets API").with_label("ai-generated");
    let outcome = orchestrator
        .handle(Decision::Execute(TaskType::Backend), &item)
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert!(outcome.warnings.is_empty());
    assert_eq!(team.invoked(), vec![CapabilityKind::Task(TaskType::Backend)]);
    assert_eq!(
        tracker.updates(),
        vec![("issue-9".to_string(), "已完成".to_string())]
    );
}

#[tokio::test]
async fn test_execute_brief_carries_conventions() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let orchestrator = orchestrator(&team, tracker);

    let item = TrackedItem::new("issue-3", "[数据库] Markets table")
        .with_description("Store market questions and close dates");
    orchestrator.execute(TaskType::Database, &item).await;

    let brief = team.brief(0);
    assert!(brief.starts_with("Task: [数据库] Markets table"));
    assert!(brief.contains("Store market questions and close dates"));
    assert!(brief.contains("--- Project Context ---"));
    assert!(brief.contains("--- database Conventions ---"));
}

#[tokio::test]
async fn test_execute_status_write_failure_is_a_warning() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker {
        status_error: Some(TicketingError::Unauthorized),
        ..FakeTracker::with_states(&["Done"])
    });
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let item = TrackedItem::new("issue-4", "[review] Audit markets API");
    let outcome = orchestrator.execute(TaskType::Review, &item).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("Status update failed"));
}

#[tokio::test]
async fn test_execute_rate_limit_fails_without_status_write() {
    let team = Team::new().reply(
        TaskType::Frontend,
        Err(CapabilityError::RateLimited("429 Too Many Requests".to_string())),
    );
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let item = TrackedItem::new("issue-5", "[前端] Markets page");
    let outcome = orchestrator.execute(TaskType::Frontend, &item).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.failure, Some(FailureKind::RateLimited));
    assert!(outcome.message.contains("re-deliver"));
    assert!(tracker.updates().is_empty());
}

#[tokio::test]
async fn test_pipeline_runs_stages_in_order_with_prior_outputs() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator
        .run_pipeline(&TrackedItem::manual("Add a prediction market"))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(team.invoked(), common::full_pipeline());
    assert_eq!(outcome.stages.len(), 5);
    assert!(outcome
        .stages
        .iter()
        .all(|s| s.status == StageStatus::Completed));

    // The last stage sees every earlier output
    let review_brief = team.brief(4);
    for earlier in ["planning done", "database done", "backend done", "frontend done"] {
        assert!(review_brief.contains(earlier), "missing {}", earlier);
    }

    // Manual items never touch the tracker
    assert!(tracker.updates().is_empty());
    assert!(tracker.created_titles().is_empty());
}

#[tokio::test]
async fn test_pipeline_not_applicable_does_not_halt() {
    let team = Team::new().reply(
        TaskType::Database,
        Ok(CapabilityReply::not_applicable("no schema changes needed")),
    );
    let orchestrator = orchestrator(&team, Arc::new(FakeTracker::default()));

    let outcome = orchestrator
        .run_pipeline(&TrackedItem::manual("Restyle the header"))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.stages[1].status, StageStatus::NotApplicable);
    assert_eq!(team.invoked().len(), 5);
    assert!(team.brief(2).contains("(not applicable)"));
}

#[tokio::test]
async fn test_pipeline_halts_at_first_failure() {
    let team = Team::new().reply(
        TaskType::Backend,
        Ok(CapabilityReply::error("could not reach the schema")),
    );
    let orchestrator = orchestrator(&team, Arc::new(FakeTracker::default()));

    let outcome = orchestrator
        .run_pipeline(&TrackedItem::manual("Add a prediction market"))
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.failure, Some(FailureKind::Capability));
    // planning, database, backend attempted; frontend and review never ran
    assert_eq!(outcome.stages.len(), 3);
    assert_eq!(team.invoked().len(), 3);
    assert_eq!(outcome.stages[2].status, StageStatus::Failed);
    assert!(outcome.message.contains("backend"));
}

#[tokio::test]
async fn test_run_stages_with_custom_order() {
    let team = Team::new();
    let orchestrator = orchestrator(&team, Arc::new(FakeTracker::default()));
    let stages = [
        CapabilityKind::Task(TaskType::Backend),
        CapabilityKind::Task(TaskType::Review),
    ];

    let outcome = orchestrator
        .run_stages(&stages, &TrackedItem::manual("Add rate limiting to the API"))
        .await;

    assert!(outcome.is_success());
    assert_eq!(team.invoked(), stages.to_vec());
}

#[tokio::test]
async fn test_skip_decision_runs_nothing() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let orchestrator = orchestrator(&team, Arc::clone(&tracker));

    let outcome = orchestrator.handle(Decision::Skip, &parent()).await;

    assert_eq!(outcome.status, OutcomeStatus::Skipped);
    assert!(team.invoked().is_empty());
    assert!(tracker.updates().is_empty());
}
