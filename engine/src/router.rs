//! Task router
//!
//! Decides what to do with an inbound item. Classification is a pure
//! function of `{title, labels, state}`: no I/O, no clock, no config.
//!
//! The rules live in an ordered table so the priority order can be read in
//! one place. The first rule that returns a verdict wins.

use sdk::types::{normalize_label, AI_GENERATED_LABEL, PLANNING_LABELS, PLANNING_TITLE_PREFIX};
use sdk::{Decision, TaskType, TrackedItem};
use std::collections::BTreeSet;

/// Lower-cased workflow states after which an item is left alone
pub const TERMINAL_STATES: [&str; 4] = ["规划完成", "planned", "done", "已完成"];

/// Normalized view of the fields the classifier reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signals {
    pub title_lower: String,
    pub labels: BTreeSet<String>,
    pub state_lower: String,
}

impl Signals {
    pub fn from_item(item: &TrackedItem) -> Self {
        Self {
            title_lower: item.title.trim().to_lowercase(),
            labels: item
                .labels
                .iter()
                .map(|l| normalize_label(l))
                .filter(|l| !l.is_empty())
                .collect(),
            state_lower: item.state.trim().to_lowercase(),
        }
    }

    fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// One routing rule
pub struct Rule {
    pub name: &'static str,
    pub verdict: fn(&Signals) -> Option<Decision>,
}

/// Domain markers in tie-break order
///
/// A marker is either a bracketed tag anywhere in the title or a label alias.
pub fn execution_type(signals: &Signals) -> Option<TaskType> {
    TaskType::ALL.into_iter().find(|task| {
        task.title_markers()
            .iter()
            .any(|marker| signals.title_lower.contains(marker))
            || task
                .label_aliases()
                .iter()
                .any(|alias| signals.has_label(alias))
    })
}

fn terminal_state(signals: &Signals) -> Option<Decision> {
    TERMINAL_STATES
        .contains(&signals.state_lower.as_str())
        .then_some(Decision::Skip)
}

/// Sub-issues from a previous decomposition only ever execute
fn ai_generated(signals: &Signals) -> Option<Decision> {
    if !signals.has_label(AI_GENERATED_LABEL) {
        return None;
    }
    Some(execution_type(signals).map_or(Decision::Skip, Decision::Execute))
}

fn planning_title(signals: &Signals) -> Option<Decision> {
    signals
        .title_lower
        .starts_with(PLANNING_TITLE_PREFIX)
        .then_some(Decision::Decompose)
}

fn planning_label(signals: &Signals) -> Option<Decision> {
    PLANNING_LABELS
        .iter()
        .any(|label| signals.has_label(label))
        .then_some(Decision::Decompose)
}

fn domain_marker(signals: &Signals) -> Option<Decision> {
    execution_type(signals).map(Decision::Execute)
}

fn fallthrough(_: &Signals) -> Option<Decision> {
    Some(Decision::Skip)
}

/// Routing rules, highest priority first
pub const RULES: &[Rule] = &[
    Rule {
        name: "terminal_state",
        verdict: terminal_state,
    },
    Rule {
        name: "ai_generated",
        verdict: ai_generated,
    },
    Rule {
        name: "planning_title",
        verdict: planning_title,
    },
    Rule {
        name: "planning_label",
        verdict: planning_label,
    },
    Rule {
        name: "domain_marker",
        verdict: domain_marker,
    },
    Rule {
        name: "no_match",
        verdict: fallthrough,
    },
];

/// Classify an item, also returning the name of the rule that decided
pub fn classify_with_trace(item: &TrackedItem) -> (Decision, &'static str) {
    let signals = Signals::from_item(item);
    RULES
        .iter()
        .find_map(|rule| (rule.verdict)(&signals).map(|decision| (decision, rule.name)))
        .unwrap_or((Decision::Skip, "no_match"))
}

/// Classify an item
pub fn classify(item: &TrackedItem) -> Decision {
    classify_with_trace(item).0
}
