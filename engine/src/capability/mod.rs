//! Capability registry
//!
//! One executor per capability kind. Selection is an exhaustive match, so
//! adding a task type fails to compile until it has an executor here.

pub mod llm;

pub use llm::LlmCapability;

use crate::llm::LLMProvider;
use sdk::{Capability, CapabilityError, CapabilityKind, CapabilityReply, TaskType};
use std::sync::Arc;

/// Executors for planning and for every task domain
#[derive(Clone)]
pub struct CapabilityRegistry {
    planning: Arc<dyn Capability>,
    frontend: Arc<dyn Capability>,
    backend: Arc<dyn Capability>,
    database: Arc<dyn Capability>,
    review: Arc<dyn Capability>,
}

impl CapabilityRegistry {
    pub fn new(
        planning: Arc<dyn Capability>,
        frontend: Arc<dyn Capability>,
        backend: Arc<dyn Capability>,
        database: Arc<dyn Capability>,
        review: Arc<dyn Capability>,
    ) -> Self {
        Self {
            planning,
            frontend,
            backend,
            database,
            review,
        }
    }

    /// Every capability backed by the same LLM provider, one persona each
    pub fn from_provider(provider: Arc<dyn LLMProvider>) -> Self {
        let persona = |kind: CapabilityKind| -> Arc<dyn Capability> {
            Arc::new(LlmCapability::new(kind, Arc::clone(&provider)))
        };

        Self {
            planning: persona(CapabilityKind::Planning),
            frontend: persona(TaskType::Frontend.into()),
            backend: persona(TaskType::Backend.into()),
            database: persona(TaskType::Database.into()),
            review: persona(TaskType::Review.into()),
        }
    }

    /// Executor for `kind`
    pub fn get(&self, kind: CapabilityKind) -> &Arc<dyn Capability> {
        match kind {
            CapabilityKind::Planning => &self.planning,
            CapabilityKind::Task(TaskType::Frontend) => &self.frontend,
            CapabilityKind::Task(TaskType::Backend) => &self.backend,
            CapabilityKind::Task(TaskType::Database) => &self.database,
            CapabilityKind::Task(TaskType::Review) => &self.review,
        }
    }

    pub async fn invoke(
        &self,
        kind: CapabilityKind,
        brief: &str,
    ) -> Result<CapabilityReply, CapabilityError> {
        self.get(kind).invoke(brief).await
    }
}
