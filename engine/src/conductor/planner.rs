//! Conductor Planner
//!
//! Turns the planning capability's reply into sub-task specs and the specs
//! into issues for the tracker.

use sdk::types::AI_GENERATED_LABEL;
use sdk::{NewIssue, TaskType};
use serde::Deserialize;
use thiserror::Error;

/// One sub-task proposed by the planning capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTaskSpec {
    pub task_type: TaskType,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
}

/// The planning reply could not be read as a task list
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planning reply contains no JSON array")]
    NoTaskList,

    #[error("planning reply is not a valid task list: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("sub-task {index} has unknown type '{value}'")]
    UnknownType { index: usize, value: String },

    #[error("sub-task {0} has an empty title")]
    EmptyTitle(usize),
}

/// Intermediate deserialization type for LLM JSON output
#[derive(Debug, Deserialize)]
struct RawSubTask {
    #[serde(rename = "type", alias = "task_type")]
    task_type: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "acceptanceCriteria")]
    acceptance_criteria: Criteria,
}

/// Criteria arrive either as a list or as one block of text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Criteria {
    List(Vec<String>),
    Text(String),
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria::List(Vec::new())
    }
}

impl Criteria {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Criteria::List(items) => items,
            Criteria::Text(text) => text.lines().map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|c| c.trim().trim_start_matches(['-', '*']).trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// Parse the planning reply, tolerating prose or a code fence around the array
///
/// A fenced block holding a task list is read first. Otherwise the first `[`
/// that opens a valid task list wins, so bracketed titles or links in the
/// prose do not get in the way. An empty array is a valid plan: the
/// requirement needs no sub-tasks.
pub fn parse_sub_tasks(content: &str) -> Result<Vec<SubTaskSpec>, PlanError> {
    let raw = extract_task_list(content)?;

    raw.into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let task_type = raw
                .task_type
                .parse::<TaskType>()
                .map_err(|_| PlanError::UnknownType {
                    index,
                    value: raw.task_type.clone(),
                })?;

            let title = raw.title.trim().to_string();
            if title.is_empty() {
                return Err(PlanError::EmptyTitle(index));
            }

            Ok(SubTaskSpec {
                task_type,
                title,
                description: raw.description.trim().to_string(),
                acceptance_criteria: raw.acceptance_criteria.into_vec(),
            })
        })
        .collect()
}

fn extract_task_list(content: &str) -> Result<Vec<RawSubTask>, PlanError> {
    if let Some(raw) = fenced_task_list(content) {
        return Ok(raw);
    }

    let mut empty = None;
    let mut first_error = None;
    for (start, _) in content.match_indices('[') {
        let mut values =
            serde_json::Deserializer::from_str(&content[start..]).into_iter::<Vec<RawSubTask>>();
        match values.next() {
            Some(Ok(raw)) if raw.is_empty() => {
                // `[ ]` checkboxes in prose parse as an empty list
                empty.get_or_insert(raw);
            }
            Some(Ok(raw)) => return Ok(raw),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }

    match (empty, first_error) {
        (Some(raw), _) => Ok(raw),
        (None, Some(e)) => Err(PlanError::Malformed(e)),
        (None, None) => Err(PlanError::NoTaskList),
    }
}

/// First code fence whose body parses as a task list
fn fenced_task_list(content: &str) -> Option<Vec<RawSubTask>> {
    let mut rest = content;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // The opening line may carry a language tag
        let body_start = after.find('\n')? + 1;
        let body = &after[body_start..];
        let close = body.find("```")?;
        if let Ok(raw) = serde_json::from_str(body[..close].trim()) {
            return Some(raw);
        }
        rest = &body[close + 3..];
    }
    None
}

impl SubTaskSpec {
    /// Issue for this sub-task
    ///
    /// Carries the domain label and `ai-generated`, so the next event for it
    /// routes straight to execution. The title also gets the bracketed domain
    /// marker, which routes the same way if labels are lost.
    pub fn to_new_issue(&self, parent_ref: &str) -> NewIssue {
        let title = format!("[{}] {}", self.task_type, self.title);

        let mut description = self.description.clone();
        if !self.acceptance_criteria.is_empty() {
            description.push_str("\n\n## Acceptance criteria\n");
            for criterion in &self.acceptance_criteria {
                description.push_str(&format!("- [ ] {}\n", criterion));
            }
        }
        if !parent_ref.is_empty() {
            description.push_str(&format!("\n\nPart of {}", parent_ref));
        }

        NewIssue::new(title, description.trim())
            .with_label(self.task_type.label())
            .with_label(AI_GENERATED_LABEL)
    }
}
