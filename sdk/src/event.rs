//! Inbound webhook payload parsing
//!
//! Turns raw webhook bodies into [`TrackedItem`] snapshots. Linear delivers
//! labels either as a GraphQL connection (`{"nodes": [{"name": ..}]}`) or as a
//! flat list, and both shapes normalize to the same lower-cased label set.

use crate::types::{ItemSource, TrackedItem};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Comment markers that summon the pipeline from a GitHub thread
pub const COMMENT_MENTIONS: [&str; 2] = ["@ai-dev", "/ai"];

/// Transport-level payload errors
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueAction {
    Create,
    Update,
}

impl IssueAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// A recognized inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Linear issue created or updated
    Issue {
        action: IssueAction,
        item: TrackedItem,
    },
    /// GitHub comment asking for pipeline work
    Comment { item: TrackedItem },
    /// Anything else; acknowledged but not dispatched
    Unsupported { event_type: String },
}

#[derive(Debug, Deserialize)]
struct RawLinearEnvelope {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    labels: Option<RawLabels>,
    #[serde(default)]
    state: Option<RawState>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabels {
    Nodes { nodes: Vec<RawLabel> },
    List(Vec<RawLabel>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Named { name: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawState {
    Named { name: String },
    Plain(String),
}

impl RawLabels {
    fn into_names(self) -> Vec<String> {
        let labels = match self {
            RawLabels::Nodes { nodes } => nodes,
            RawLabels::List(list) => list,
        };
        labels
            .into_iter()
            .map(|l| match l {
                RawLabel::Named { name } => name,
                RawLabel::Plain(name) => name,
            })
            .collect()
    }
}

/// Parse a Linear webhook body
pub fn parse_linear_event(body: &[u8]) -> Result<InboundEvent, PayloadError> {
    let envelope: RawLinearEnvelope = serde_json::from_slice(body)?;
    let event_type = envelope.event_type.unwrap_or_default();
    let action = envelope.action.unwrap_or_default();

    let action = match (event_type.as_str(), action.as_str()) {
        ("Issue", "create") => IssueAction::Create,
        ("Issue", "update") => IssueAction::Update,
        _ => {
            return Ok(InboundEvent::Unsupported {
                event_type: format!("{}:{}", event_type, action),
            })
        }
    };

    let raw = envelope.data.ok_or(PayloadError::MissingField("data"))?;
    let id = raw.id.ok_or(PayloadError::MissingField("data.id"))?;

    let labels = raw.labels.map(RawLabels::into_names).unwrap_or_default();
    let state = match raw.state {
        Some(RawState::Named { name }) | Some(RawState::Plain(name)) => name,
        None => String::new(),
    };

    let item = TrackedItem::new(id, raw.title.unwrap_or_default())
        .with_identifier(raw.identifier.unwrap_or_default())
        .with_description(raw.description.unwrap_or_default())
        .with_state(state)
        .with_labels(labels);

    Ok(InboundEvent::Issue { action, item })
}

#[derive(Debug, Deserialize)]
struct RawCommentEnvelope {
    #[serde(default)]
    comment: Option<RawComment>,
    #[serde(default)]
    issue: Option<RawGithubIssue>,
    #[serde(default)]
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGithubIssue {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(default)]
    full_name: Option<String>,
}

/// Parse a GitHub webhook body given its `X-GitHub-Event` name
///
/// Only `issue_comment` events whose body mentions the bot become work items.
pub fn parse_github_event(event_name: &str, body: &[u8]) -> Result<InboundEvent, PayloadError> {
    if event_name != "issue_comment" {
        return Ok(InboundEvent::Unsupported {
            event_type: event_name.to_string(),
        });
    }

    let envelope: RawCommentEnvelope = serde_json::from_slice(body)?;
    let comment = envelope.comment.ok_or(PayloadError::MissingField("comment"))?;
    let text = comment.body.unwrap_or_default();

    if !mentions_bot(&text) {
        return Ok(InboundEvent::Unsupported {
            event_type: "issue_comment:no_mention".to_string(),
        });
    }

    let issue_title = envelope
        .issue
        .as_ref()
        .and_then(|i| i.title.clone())
        .unwrap_or_default();

    let id = match comment.id {
        Some(Value::Number(n)) => format!("github-comment-{}", n),
        Some(Value::String(s)) => format!("github-comment-{}", s),
        _ => String::new(),
    };

    let identifier = match (
        envelope.repository.and_then(|r| r.full_name),
        envelope.issue.and_then(|i| i.number),
    ) {
        (Some(repo), Some(number)) => format!("{}#{}", repo, number),
        (None, Some(number)) => format!("#{}", number),
        _ => String::new(),
    };

    let item = TrackedItem::new(id, format!("PR feedback: {}", issue_title))
        .with_identifier(identifier)
        .with_description(text)
        .with_source(ItemSource::Comment);

    Ok(InboundEvent::Comment { item })
}

/// True when a comment body addresses the bot
pub fn mentions_bot(body: &str) -> bool {
    let lower = body.to_lowercase();
    COMMENT_MENTIONS.iter().any(|m| lower.contains(m))
}
