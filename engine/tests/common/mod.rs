//! Fakes shared by the engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use foreman_engine::capability::CapabilityRegistry;
use foreman_engine::config::ConventionsConfig;
use foreman_engine::workflows::{Orchestrator, StateNames};
use sdk::{
    Capability, CapabilityError, CapabilityKind, CapabilityReply, NewIssue, TaskType, Ticketing,
    TicketingError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Script = Result<CapabilityReply, CapabilityError>;

/// Capability that replays scripted replies and records every brief
pub struct FakeCapability {
    kind: CapabilityKind,
    replies: Mutex<VecDeque<Script>>,
    fallback: Script,
    delay: Duration,
    panic_next: AtomicBool,
    calls: Arc<Mutex<Vec<(CapabilityKind, String)>>>,
}

#[async_trait]
impl Capability for FakeCapability {
    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn invoke(&self, brief: &str) -> Result<CapabilityReply, CapabilityError> {
        self.calls
            .lock()
            .unwrap()
            .push((self.kind, brief.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("{} crashed", self.kind);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Builds a registry of fakes sharing one call log
#[derive(Default)]
pub struct Team {
    scripts: HashMap<CapabilityKind, Vec<Script>>,
    delay: Duration,
    panics: HashSet<CapabilityKind>,
    pub calls: Arc<Mutex<Vec<(CapabilityKind, String)>>>,
}

impl Team {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `kind`; unscripted calls succeed with "<kind> done"
    pub fn reply(mut self, kind: impl Into<CapabilityKind>, reply: Script) -> Self {
        self.scripts.entry(kind.into()).or_default().push(reply);
        self
    }

    /// Make the first invocation of `kind` panic
    pub fn panic_once(mut self, kind: impl Into<CapabilityKind>) -> Self {
        self.panics.insert(kind.into());
        self
    }

    /// Make every invocation take `delay`
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        let make = |kind: CapabilityKind| -> Arc<dyn Capability> {
            Arc::new(FakeCapability {
                kind,
                replies: Mutex::new(
                    self.scripts
                        .get(&kind)
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .collect(),
                ),
                fallback: Ok(CapabilityReply::success(format!("{} done", kind))),
                delay: self.delay,
                panic_next: AtomicBool::new(self.panics.contains(&kind)),
                calls: Arc::clone(&self.calls),
            })
        };

        Arc::new(CapabilityRegistry::new(
            make(CapabilityKind::Planning),
            make(TaskType::Frontend.into()),
            make(TaskType::Backend.into()),
            make(TaskType::Database.into()),
            make(TaskType::Review.into()),
        ))
    }

    /// Capabilities invoked so far, in order
    pub fn invoked(&self) -> Vec<CapabilityKind> {
        self.calls.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    /// Brief passed to the n-th invocation
    pub fn brief(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index].1.clone()
    }
}

/// Tracker that records writes and only knows some state names
#[derive(Default)]
pub struct FakeTracker {
    pub known_states: Vec<String>,
    pub created: Mutex<Vec<NewIssue>>,
    pub updates: Mutex<Vec<(String, String)>>,
    /// Titles whose creation is rejected
    pub reject_titles: Vec<String>,
    pub reject_all_creates: bool,
    pub status_error: Option<TicketingError>,
}

impl FakeTracker {
    pub fn with_states(states: &[&str]) -> Self {
        Self {
            known_states: states.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.title.clone())
            .collect()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ticketing for FakeTracker {
    async fn create_issue(&self, issue: &NewIssue) -> Result<String, TicketingError> {
        if self.reject_all_creates || self.reject_titles.contains(&issue.title) {
            return Err(TicketingError::Api("create rejected".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(issue.clone());
        Ok(format!("ENG-{}", 100 + created.len()))
    }

    async fn update_status(&self, issue_id: &str, state_name: &str) -> Result<(), TicketingError> {
        if let Some(e) = &self.status_error {
            return Err(e.clone());
        }
        if !self.known_states.iter().any(|s| s == state_name) {
            return Err(TicketingError::StateNotFound(state_name.to_string()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((issue_id.to_string(), state_name.to_string()));
        Ok(())
    }
}

pub fn state_names() -> StateNames {
    StateNames {
        done: vec!["Done".to_string(), "已完成".to_string()],
        planned: vec!["规划完成".to_string()],
    }
}

pub fn full_pipeline() -> Vec<CapabilityKind> {
    vec![
        CapabilityKind::Planning,
        TaskType::Database.into(),
        TaskType::Backend.into(),
        TaskType::Frontend.into(),
        TaskType::Review.into(),
    ]
}

pub fn orchestrator(team: &Team, tracker: Arc<FakeTracker>) -> Orchestrator {
    Orchestrator::new(
        team.registry(),
        tracker,
        ConventionsConfig::default(),
        state_names(),
        full_pipeline(),
    )
}

pub fn plan_json() -> String {
    r#"Here is the plan:
[
  {"type": "database", "title": "Create markets table", "description": "Schema for markets",
   "acceptance_criteria": ["migration applies", "RLS enabled"]},
  {"type": "backend", "title": "Markets API", "description": "CRUD endpoints"},
  {"type": "frontend", "title": "Markets page", "description": "List and detail views"}
]"#
    .to_string()
}
