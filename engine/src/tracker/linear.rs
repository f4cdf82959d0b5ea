//! Linear GraphQL client
//!
//! Only the writes the workflows need: creating issues with labels attached
//! and moving an issue to a workflow state by name. Names are resolved to
//! team-scoped ids on every call, so renames in Linear take effect without a
//! restart.

use crate::config::TrackerConfig;
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use sdk::{NewIssue, Ticketing, TicketingError};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const STATES_QUERY: &str = "query TeamStates($teamId: String!) {
  team(id: $teamId) { states { nodes { id name } } }
}";

const LABELS_QUERY: &str = "query TeamLabels($teamId: String!) {
  team(id: $teamId) { labels(first: 250) { nodes { id name } } }
}";

const LABEL_CREATE: &str = "mutation CreateLabel($input: IssueLabelCreateInput!) {
  issueLabelCreate(input: $input) { success issueLabel { id name } }
}";

const ISSUE_CREATE: &str = "mutation CreateIssue($input: IssueCreateInput!) {
  issueCreate(input: $input) { success issue { id identifier title url } }
}";

const ISSUE_UPDATE: &str = "mutation UpdateIssue($id: String!, $stateId: String!) {
  issueUpdate(id: $id, input: { stateId: $stateId }) { success issue { identifier state { name } } }
}";

/// A named node (workflow state or label) in the team
#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    id: String,
    name: String,
}

fn nodes_at(data: &Value, pointer: &str) -> Result<Vec<Node>, TicketingError> {
    let nodes = data
        .pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| TicketingError::Api(format!("missing {} in response", pointer)))?;

    Ok(nodes
        .iter()
        .filter_map(|n| {
            Some(Node {
                id: n.get("id")?.as_str()?.to_string(),
                name: n.get("name")?.as_str()?.to_string(),
            })
        })
        .collect())
}

/// Case-insensitive name lookup
fn find_by_name<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    let wanted = name.trim().to_lowercase();
    nodes.iter().find(|n| n.name.trim().to_lowercase() == wanted)
}

/// Linear API client
pub struct LinearClient {
    api_url: String,
    team_id: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl LinearClient {
    pub fn new(config: &TrackerConfig, api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            api_url: config.api_url.clone(),
            team_id: config.team_id.clone(),
            api_key,
            client,
        }
    }

    fn require_team(&self) -> Result<&str, TicketingError> {
        if self.team_id.trim().is_empty() {
            return Err(TicketingError::NotConfigured(
                "tracker.team_id is empty".to_string(),
            ));
        }
        Ok(&self.team_id)
    }

    /// Run one GraphQL operation and return its `data` object
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, TicketingError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", self.api_key.expose())
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| TicketingError::Request(scrub(&e.to_string())))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TicketingError::Unauthorized);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TicketingError::Api(format!("HTTP {}: {}", status, e)))?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(TicketingError::Api(scrub(&messages.join("; "))));
        }

        if !status.is_success() {
            return Err(TicketingError::Api(format!("HTTP {}", status)));
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| TicketingError::Api("response has no data".to_string()))
    }

    async fn team_states(&self) -> Result<Vec<Node>, TicketingError> {
        let team_id = self.require_team()?;
        let data = self
            .graphql(STATES_QUERY, json!({ "teamId": team_id }))
            .await?;
        nodes_at(&data, "/team/states/nodes")
    }

    async fn team_labels(&self) -> Result<Vec<Node>, TicketingError> {
        let team_id = self.require_team()?;
        let data = self
            .graphql(LABELS_QUERY, json!({ "teamId": team_id }))
            .await?;
        nodes_at(&data, "/team/labels/nodes")
    }

    async fn create_label(&self, name: &str) -> Result<String, TicketingError> {
        let team_id = self.require_team()?;
        let data = self
            .graphql(
                LABEL_CREATE,
                json!({ "input": { "teamId": team_id, "name": name } }),
            )
            .await?;

        let id = data
            .pointer("/issueLabelCreate/issueLabel/id")
            .and_then(Value::as_str)
            .ok_or_else(|| TicketingError::Api(format!("label '{}' was not created", name)))?;

        info!(label = name, "Created tracker label");
        Ok(id.to_string())
    }

    /// Map label names to ids, creating labels the team does not have yet
    async fn resolve_label_ids(&self, names: &[String]) -> Result<Vec<String>, TicketingError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self.team_labels().await?;
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            match find_by_name(&existing, name) {
                Some(node) => ids.push(node.id.clone()),
                None => ids.push(self.create_label(name).await?),
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl Ticketing for LinearClient {
    async fn create_issue(&self, issue: &NewIssue) -> Result<String, TicketingError> {
        let team_id = self.require_team()?.to_string();
        let label_ids = self.resolve_label_ids(&issue.labels).await?;

        let mut input = json!({
            "teamId": team_id,
            "title": issue.title,
            "description": issue.description,
        });
        if !label_ids.is_empty() {
            input["labelIds"] = json!(label_ids);
        }

        let data = self
            .graphql(ISSUE_CREATE, json!({ "input": input }))
            .await?;

        if data.pointer("/issueCreate/success").and_then(Value::as_bool) != Some(true) {
            return Err(TicketingError::Api("issueCreate was not successful".to_string()));
        }

        let identifier = data
            .pointer("/issueCreate/issue/identifier")
            .and_then(Value::as_str)
            .ok_or_else(|| TicketingError::Api("issueCreate returned no issue".to_string()))?;

        debug!(identifier, title = %issue.title, "Created issue");
        Ok(identifier.to_string())
    }

    async fn update_status(&self, issue_id: &str, state_name: &str) -> Result<(), TicketingError> {
        let states = self.team_states().await?;
        let state = find_by_name(&states, state_name)
            .ok_or_else(|| TicketingError::StateNotFound(state_name.to_string()))?;

        let data = self
            .graphql(
                ISSUE_UPDATE,
                json!({ "id": issue_id, "stateId": state.id }),
            )
            .await?;

        match data.pointer("/issueUpdate/success").and_then(Value::as_bool) {
            Some(true) => {
                debug!(issue_id, state = %state.name, "Updated issue state");
                Ok(())
            }
            _ => match data.pointer("/issueUpdate/issue") {
                None | Some(Value::Null) => Err(TicketingError::IssueNotFound(issue_id.to_string())),
                Some(_) => Err(TicketingError::Api("issueUpdate was not successful".to_string())),
            },
        }
    }
}
