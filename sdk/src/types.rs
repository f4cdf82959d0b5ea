//! Tracked items, task types and routing decisions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label attached to every sub-issue produced by decomposition
pub const AI_GENERATED_LABEL: &str = "ai-generated";

/// Labels that force decomposition
pub const PLANNING_LABELS: [&str; 2] = ["ai-plan", "ai-planning"];

/// Title prefix that forces decomposition (compared lower-cased)
pub const PLANNING_TITLE_PREFIX: &str = "[ai]";

/// Closed set of execution domains
///
/// Declaration order is the classifier's tie-break order: when an item
/// carries markers for several domains, the first one in [`TaskType::ALL`]
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Frontend,
    Backend,
    Database,
    Review,
}

impl TaskType {
    /// All task types in priority order
    pub const ALL: [TaskType; 4] = [
        TaskType::Frontend,
        TaskType::Backend,
        TaskType::Database,
        TaskType::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Database => "database",
            Self::Review => "review",
        }
    }

    /// Canonical label written onto created sub-issues
    pub fn label(&self) -> &'static str {
        self.as_str()
    }

    /// Lower-cased labels that mark an item as belonging to this domain
    pub fn label_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Frontend => &["frontend", "前端"],
            Self::Backend => &["backend", "后端"],
            Self::Database => &["database", "db", "数据库"],
            Self::Review => &["review", "审查"],
        }
    }

    /// Lower-cased bracketed title markers for this domain
    pub fn title_markers(&self) -> &'static [&'static str] {
        match self {
            Self::Frontend => &["[frontend]", "[前端]"],
            Self::Backend => &["[backend]", "[后端]"],
            Self::Database => &["[database]", "[数据库]"],
            Self::Review => &["[review]", "[审查]"],
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known task type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    /// Accepts the canonical name or any label alias, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = normalize_label(s);
        TaskType::ALL
            .into_iter()
            .find(|t| t.label_aliases().contains(&needle.as_str()))
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

/// Routing verdict for one inbound item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "task_type", rename_all = "snake_case")]
pub enum Decision {
    Decompose,
    Execute(TaskType),
    Skip,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decompose => f.write_str("decompose"),
            Self::Execute(task) => write!(f, "execute({})", task),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Where an item came from
///
/// Only tracker-sourced items have a status the engine can write back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    #[default]
    Tracker,
    Manual,
    Comment,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracker => "tracker",
            Self::Manual => "manual",
            Self::Comment => "comment",
        }
    }
}

/// Read snapshot of an externally owned work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub description: String,
    /// Normalized (trimmed, lower-cased) label names
    pub labels: BTreeSet<String>,
    pub state: String,
    #[serde(default)]
    pub source: ItemSource,
}

impl TrackedItem {
    /// Create a tracker item with the given id and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            identifier: String::new(),
            title: title.into(),
            description: String::new(),
            labels: BTreeSet::new(),
            state: String::new(),
            source: ItemSource::Tracker,
        }
    }

    /// Synthesize an item from a free-text requirement
    ///
    /// Title and description both carry the requirement.
    pub fn manual(requirement: impl Into<String>) -> Self {
        let requirement = requirement.into();
        Self {
            id: String::new(),
            identifier: String::new(),
            title: requirement.clone(),
            description: requirement,
            labels: BTreeSet::new(),
            state: String::new(),
            source: ItemSource::Manual,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_source(mut self, source: ItemSource) -> Self {
        self.source = source;
        self
    }

    /// Add a label (normalized)
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        let label = normalize_label(label.as_ref());
        if !label.is_empty() {
            self.labels.insert(label);
        }
        self
    }

    /// Add several labels (normalized)
    pub fn with_labels<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels.into_iter().fold(self, |item, l| item.with_label(l))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(&normalize_label(label))
    }

    /// Human-facing reference used in logs and the run ledger
    pub fn display_ref(&self) -> &str {
        if !self.identifier.is_empty() {
            &self.identifier
        } else if !self.id.is_empty() {
            &self.id
        } else {
            self.source.as_str()
        }
    }
}

/// Trim and lower-case a label name
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}
