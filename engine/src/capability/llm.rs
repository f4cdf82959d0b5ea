//! LLM-backed capabilities
//!
//! Each capability is a persona (system prompt) over a shared provider. The
//! brief is sent as the single user message.

use crate::llm::{LLMError, LLMProvider, Message};
use crate::secrets::scrub;
use async_trait::async_trait;
use sdk::{Capability, CapabilityError, CapabilityKind, CapabilityReply, TaskType};
use std::sync::Arc;
use tracing::debug;

/// Reply prefix a persona uses when it has nothing to do
pub const NOT_APPLICABLE_MARKER: &str = "NOT_APPLICABLE";

const PLANNING_PERSONA: &str = "You are a senior product manager with a strong engineering \
background. You turn a requirement into concrete, independently executable development tasks \
for the frontend, backend and database, each with clear acceptance criteria.\n\n\
Respond with ONLY a JSON array. Each element must have:\n\
- \"type\": one of \"frontend\", \"backend\", \"database\", \"review\"\n\
- \"title\": short task title\n\
- \"description\": what to build\n\
- \"acceptance_criteria\": array of strings\n\n\
Order the array by dependency (data model before API before UI). If the requirement needs no \
development work, respond with an empty array [].";

const FRONTEND_PERSONA: &str = "You are a senior frontend engineer. You build typed, \
single-responsibility UI components with function components and hooks, style with utility \
classes instead of inline styles, and handle loading and error states. Produce the code \
changes needed for the task, file by file.";

const BACKEND_PERSONA: &str = "You are a senior backend engineer. You design RESTful APIs \
with complete type annotations, explicit error handling and appropriate logging. Produce the \
code changes needed for the task, file by file.";

const DATABASE_PERSONA: &str = "You are a database architect. You design tables, write \
migrations, plan indexes and row-level security policies. Use UUID primary keys, plural \
snake_case table names, foreign key constraints and created_at/updated_at timestamps. \
Produce the migration files needed for the task.";

const REVIEW_PERSONA: &str = "You are a strict but friendly code reviewer. Check correctness \
and completeness, style consistency, potential bugs and security issues, performance, and \
that frontend and backend interfaces agree. Give concrete suggestions and a short verdict.";

fn persona(kind: CapabilityKind) -> String {
    let base = match kind {
        CapabilityKind::Planning => return PLANNING_PERSONA.to_string(),
        CapabilityKind::Task(TaskType::Frontend) => FRONTEND_PERSONA,
        CapabilityKind::Task(TaskType::Backend) => BACKEND_PERSONA,
        CapabilityKind::Task(TaskType::Database) => DATABASE_PERSONA,
        CapabilityKind::Task(TaskType::Review) => REVIEW_PERSONA,
    };
    format!(
        "{}\n\nIf the task requires no work in your domain, reply with a first line of exactly \
         {} followed by a one-sentence reason.",
        base, NOT_APPLICABLE_MARKER
    )
}

/// A capability answered by an LLM persona
pub struct LlmCapability {
    kind: CapabilityKind,
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
}

impl LlmCapability {
    pub fn new(kind: CapabilityKind, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            kind,
            provider,
            system_prompt: persona(kind),
        }
    }
}

/// Turn raw model text into a structured reply
pub fn interpret_reply(text: &str) -> CapabilityReply {
    let trimmed = text.trim_start();
    match trimmed.strip_prefix(NOT_APPLICABLE_MARKER) {
        Some(reason) => CapabilityReply::not_applicable(reason.trim_start_matches(':').trim()),
        None => CapabilityReply::success(text.trim()),
    }
}

fn to_capability_error(err: LLMError) -> CapabilityError {
    let message = scrub(&err.to_string());
    if err.is_rate_limit() {
        CapabilityError::RateLimited(message)
    } else {
        CapabilityError::from_message(message)
    }
}

#[async_trait]
impl Capability for LlmCapability {
    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn invoke(&self, brief: &str) -> Result<CapabilityReply, CapabilityError> {
        debug!(
            capability = %self.kind,
            provider = self.provider.name(),
            model = self.provider.model(),
            "Invoking capability"
        );

        let messages = [
            Message::system(self.system_prompt.as_str()),
            Message::user(brief),
        ];
        let text = self
            .provider
            .generate(&messages)
            .await
            .map_err(to_capability_error)?;

        Ok(interpret_reply(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::ReplyStatus;
    use std::sync::Mutex;

    struct ScriptedProvider {
        reply: std::result::Result<String, fn() -> LLMError>,
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn generate(&self, messages: &[Message]) -> crate::llm::Result<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn scripted(reply: std::result::Result<String, fn() -> LLMError>) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_interpret_not_applicable() {
        let reply = interpret_reply("NOT_APPLICABLE: no schema change needed");
        assert_eq!(reply.status, ReplyStatus::NotApplicable);
        assert_eq!(reply.artifact, "no schema change needed");

        let reply = interpret_reply("  created migrations/001.sql\n");
        assert_eq!(reply.status, ReplyStatus::Success);
        assert_eq!(reply.artifact, "created migrations/001.sql");
    }

    #[test]
    fn test_planning_persona_has_no_not_applicable_clause() {
        assert!(!persona(CapabilityKind::Planning).contains(NOT_APPLICABLE_MARKER));
        assert!(persona(TaskType::Database.into()).contains(NOT_APPLICABLE_MARKER));
    }

    #[tokio::test]
    async fn test_invoke_sends_persona_and_brief() {
        let provider = scripted(Ok("done".to_string()));
        let shared: Arc<dyn LLMProvider> = Arc::clone(&provider) as Arc<dyn LLMProvider>;
        let capability = LlmCapability::new(TaskType::Backend.into(), shared);

        let reply = capability.invoke("Add search endpoint").await.unwrap();
        assert_eq!(reply.artifact, "done");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].content.contains("backend engineer"));
        assert_eq!(seen[1].content, "Add search endpoint");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_rate_limited() {
        let provider = scripted(Err(|| LLMError::RateLimitExceeded("slow down".into())));
        let capability = LlmCapability::new(TaskType::Frontend.into(), provider);

        let err = capability.invoke("x").await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_error_text_is_scrubbed() {
        let provider = scripted(Err(|| {
            LLMError::AuthenticationFailed("bad key sk-ant-REDACTED".into())
        }));
        let capability = LlmCapability::new(TaskType::Review.into(), provider);

        let err = capability.invoke("x").await.unwrap_err();
        assert!(!err.to_string().contains("abcdefghijklmnop"));
    }
}
