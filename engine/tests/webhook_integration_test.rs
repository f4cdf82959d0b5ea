//! End-to-end tests: HTTP webhook in, tracker write out
//!
//! A real webhook server and dispatcher run on an ephemeral port with fake
//! capabilities and a fake tracker behind them.

mod common;

use common::{FakeTracker, Team};
use foreman_engine::config::DispatcherConfig;
use foreman_engine::db::{Database, RunStatus};
use foreman_engine::dispatcher::Dispatcher;
use sdk::DispatchHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use webhook_server::{signature, WebhookServer, WebhookServerConfig, LINEAR_SIGNATURE_HEADER};

const SECRET: &str = "whsec_test";

struct Harness {
    _dir: TempDir,
    db: Database,
    dispatcher: Arc<Dispatcher>,
    server: WebhookServer,
    base: String,
    client: reqwest::Client,
}

async fn harness(team: &Team, tracker: Arc<FakeTracker>, disabled: bool) -> Harness {
    harness_with_secret(team, tracker, disabled, Some(SECRET)).await
}

async fn harness_with_secret(
    team: &Team,
    tracker: Arc<FakeTracker>,
    disabled: bool,
    linear_secret: Option<&str>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("foreman.db")).await.unwrap();
    let config = DispatcherConfig {
        workers: 2,
        queue_capacity: 8,
        claim_ttl_secs: 600,
        shutdown_grace_secs: 10,
    };
    let dispatcher = Dispatcher::start(
        Arc::new(common::orchestrator(team, tracker)),
        db.runs(),
        db.claims(config.claim_ttl_secs),
        &config,
    );

    let mut server = WebhookServer::new(
        WebhookServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            disabled,
            linear_secret: linear_secret.map(str::to_string),
            github_secret: None,
        },
        Arc::clone(&dispatcher) as Arc<dyn DispatchHandle>,
    );
    let addr = server.start().await.unwrap();

    Harness {
        _dir: dir,
        db,
        dispatcher,
        server,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

impl Harness {
    async fn post_linear(&self, payload: &Value, signed: bool) -> (u16, Value) {
        let body = payload.to_string();
        let mut request = self
            .client
            .post(format!("{}/webhook/linear", self.base))
            .header("content-type", "application/json");
        if signed {
            request = request.header(LINEAR_SIGNATURE_HEADER, signature::sign(SECRET, body.as_bytes()));
        }
        let response = request.body(body).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn shutdown(mut self) -> Database {
        self.server.stop().await;
        assert!(self.dispatcher.shutdown().await);
        self.db
    }
}

fn issue_event(id: &str, title: &str, labels: &[&str], state: &str) -> Value {
    json!({
        "type": "Issue",
        "action": "update",
        "data": {
            "id": id,
            "identifier": "ENG-42",
            "title": title,
            "description": "From the webhook",
            "labels": { "nodes": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>() },
            "state": { "name": state }
        }
    })
}

#[tokio::test]
async fn test_signed_issue_event_runs_to_done() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let harness = harness(&team, Arc::clone(&tracker), false).await;

    let (status, body) = harness
        .post_linear(
            &issue_event("issue-1", "Markets API", &["ai-generated", "backend"], "Todo"),
            true,
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["job"], "execute(backend)");
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let db = harness.shutdown().await;
    let run = db.runs().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.item_ref, "ENG-42");
    assert_eq!(
        tracker.updates(),
        vec![("issue-1".to_string(), "Done".to_string())]
    );
}

#[tokio::test]
async fn test_unsigned_event_is_rejected_before_dispatch() {
    let team = Team::new();
    let harness = harness(&team, Arc::new(FakeTracker::default()), false).await;

    let (status, body) = harness
        .post_linear(&issue_event("issue-2", "[AI] Add search", &[], "Todo"), false)
        .await;

    assert_eq!(status, 401);
    assert_eq!(body["status"], "error");
    let db = harness.shutdown().await;
    assert!(db.runs().recent_runs(10).await.unwrap().is_empty());
    assert!(team.invoked().is_empty());
}

#[tokio::test]
async fn test_redelivery_is_skipped() {
    let team = Team::new().slow(Duration::from_millis(200));
    let harness = harness(&team, Arc::new(FakeTracker::with_states(&["Done"])), false).await;
    let event = issue_event("issue-3", "[frontend] Markets page", &[], "Todo");

    let (_, first) = harness.post_linear(&event, true).await;
    let (status, second) = harness.post_linear(&event, true).await;

    assert_eq!(first["status"], "accepted");
    assert_eq!(status, 200);
    assert_eq!(second["status"], "skipped");
    assert_eq!(second["reason"], "duplicate delivery");

    harness.shutdown().await;
    assert_eq!(team.invoked().len(), 1);
}

#[tokio::test]
async fn test_done_item_is_skipped() {
    let team = Team::new();
    let harness = harness(&team, Arc::new(FakeTracker::default()), false).await;

    let (status, body) = harness
        .post_linear(
            &issue_event("issue-4", "Markets API", &["ai-generated", "backend"], "Done"),
            true,
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "skipped");
    harness.shutdown().await;
    assert!(team.invoked().is_empty());
}

#[tokio::test]
async fn test_disabled_switch_acknowledges_only() {
    let team = Team::new();
    let harness = harness(&team, Arc::new(FakeTracker::default()), true).await;

    let (status, body) = harness
        .post_linear(&issue_event("issue-5", "[AI] Add search", &[], "Todo"), true)
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "disabled");
    harness.shutdown().await;
    assert!(team.invoked().is_empty());
}

#[tokio::test]
async fn test_manual_trigger_runs_pipeline() {
    let team = Team::new();
    let harness = harness(&team, Arc::new(FakeTracker::default()), false).await;

    let response = harness
        .client
        .post(format!("{}/trigger", harness.base))
        .json(&json!({ "requirement": "Add a prediction market", "pipeline": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["job"], "pipeline");

    harness.shutdown().await;
    assert_eq!(team.invoked(), common::full_pipeline());
}

#[tokio::test]
async fn test_without_linear_secret_unsigned_events_dispatch() {
    let team = Team::new();
    let tracker = Arc::new(FakeTracker::with_states(&["Done"]));
    let harness = harness_with_secret(&team, Arc::clone(&tracker), false, None).await;

    let (status, body) = harness
        .post_linear(
            &issue_event("issue-6", "Markets API", &["ai-generated", "backend"], "Todo"),
            false,
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "accepted");
    harness.shutdown().await;
    assert_eq!(team.invoked().len(), 1);
}
