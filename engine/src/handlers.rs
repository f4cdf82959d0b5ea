//! Command handlers for CLI operations
//!
//! - serve: webhook server plus worker pool until a shutdown signal
//! - run: one pipeline in the foreground
//! - classify: show the routing decision for an item
//! - history: recent runs from the ledger
//! - secret: manage keychain entries

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use crate::capability::CapabilityRegistry;
use crate::cli::SecretAction;
use crate::config::Config;
use crate::db::Database;
use crate::dispatcher::Dispatcher;
use crate::llm::provider_from_config;
use crate::router::classify_with_trace;
use crate::secrets::{
    SecretCache, SecretManager, GITHUB_WEBHOOK_SECRET, KNOWN_SECRETS, LINEAR_API_KEY,
    WEBHOOK_SECRET,
};
use crate::tracker::{LinearClient, Unconfigured};
use crate::workflows::{Orchestrator, StateNames};
use sdk::{
    CapabilityKind, DispatchHandle, Outcome, OutcomeStatus, StageStatus, Ticketing, TrackedItem,
};
use webhook_server::{WebhookServer, WebhookServerConfig};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Wire the orchestrator from configuration and resolved secrets
///
/// A missing tracker key is not fatal: workflows still run and every
/// tracker write is reported as a warning.
pub fn build_orchestrator(config: &Config, secrets: &Arc<SecretCache>) -> Result<Orchestrator> {
    let provider = provider_from_config(&config.llm, Arc::clone(secrets))?;
    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "LLM provider ready"
    );
    let registry = Arc::new(CapabilityRegistry::from_provider(provider));

    let ticketing: Arc<dyn Ticketing> = match secrets.get(LINEAR_API_KEY)? {
        Some(key) if !key.is_empty() => Arc::new(LinearClient::new(&config.tracker, key)),
        _ => {
            tracing::warn!("{} is not set; tracker writes will be skipped", LINEAR_API_KEY);
            Arc::new(Unconfigured::new(format!("{} is not set", LINEAR_API_KEY)))
        }
    };

    Ok(Orchestrator::new(
        registry,
        ticketing,
        config.conventions.clone(),
        StateNames::from(&config.tracker),
        config.pipeline.stage_kinds()?,
    ))
}

fn secret_cache() -> Arc<SecretCache> {
    Arc::new(SecretCache::new(Arc::new(SecretManager::default())))
}

/// Run the webhook server until SIGINT or SIGTERM
pub async fn handle_serve(config: &Config, port: Option<u16>, format: OutputFormat) -> Result<()> {
    let secrets = secret_cache();
    let orchestrator = Arc::new(build_orchestrator(config, &secrets)?);

    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let claims = database.claims(config.dispatcher.claim_ttl_secs);
    match claims.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => tracing::info!(purged, "Expired claims removed"),
        Err(e) => tracing::warn!("Failed to purge expired claims: {:#}", e),
    }

    let dispatcher = Dispatcher::start(orchestrator, database.runs(), claims, &config.dispatcher);

    let server_config = WebhookServerConfig {
        bind: config.server.bind.clone(),
        port: port.unwrap_or(config.server.port),
        disabled: config.server.disabled,
        linear_secret: secrets
            .get(WEBHOOK_SECRET)?
            .map(|s| s.expose().to_string()),
        github_secret: secrets
            .get(GITHUB_WEBHOOK_SECRET)?
            .map(|s| s.expose().to_string()),
    };

    let handle: Arc<dyn DispatchHandle> = Arc::clone(&dispatcher) as Arc<dyn DispatchHandle>;
    let mut server = WebhookServer::new(server_config, handle);
    let addr = server.start().await?;

    match format {
        OutputFormat::Text => {
            println!("Foreman listening on http://{}", addr);
            if config.server.disabled {
                println!("  Dispatch is disabled; webhooks are acknowledged only");
            }
            println!("  Press Ctrl+C to stop");
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "listening",
                "address": addr.to_string(),
                "disabled": config.server.disabled,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    server.stop().await;
    let drained = dispatcher.shutdown().await;
    if !drained {
        tracing::warn!("Exiting with runs still in flight");
    }
    database.close().await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}

/// Run the pipeline for a requirement in the foreground
///
/// The run is recorded in the ledger so it shows up in `history`.
pub async fn handle_run(
    requirement: String,
    stages: Vec<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let requirement = requirement.trim().to_string();
    if requirement.is_empty() {
        bail!("Requirement must not be empty");
    }

    let orchestrator = build_orchestrator(config, &secret_cache())?;
    let kinds = if stages.is_empty() {
        orchestrator.stages().to_vec()
    } else {
        stages
            .iter()
            .map(|s| s.parse::<CapabilityKind>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let runs = database.runs();

    let item = TrackedItem::manual(requirement.clone());
    let run_id = uuid::Uuid::new_v4().to_string();
    if let Err(e) = runs.create_run(&run_id, &item, "pipeline").await {
        tracing::warn!("Failed to record run: {:#}", e);
    }
    if let Err(e) = runs.mark_running(&run_id).await {
        tracing::warn!("Failed to mark run as running: {:#}", e);
    }

    if let OutputFormat::Text = format {
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        println!("Running pipeline: {}", names.join(" -> "));
        println!("Requirement: {}", requirement);
        println!();
    }

    let start = Instant::now();
    let outcome = orchestrator.run_stages(&kinds, &item).await;
    let duration_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

    if let Err(e) = runs.complete_run(&run_id, &outcome, duration_ms).await {
        tracing::warn!("Failed to record run outcome: {:#}", e);
    }
    database.close().await?;

    match format {
        OutputFormat::Text => print_outcome(&outcome, duration_ms),
        OutputFormat::Json => {
            let output = json!({
                "run_id": run_id,
                "duration_ms": duration_ms,
                "outcome": outcome,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if outcome.status == OutcomeStatus::Failed {
        bail!("{}", outcome.message);
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, duration_ms: i64) {
    for stage in &outcome.stages {
        let mark = match stage.status {
            StageStatus::Completed => "✓",
            StageStatus::NotApplicable => "-",
            StageStatus::Failed => "✗",
        };
        println!("{} {} ({}ms)", mark, stage.name, stage.duration_ms);
        if !stage.output.is_empty() {
            for line in stage.output.lines() {
                println!("    {}", line);
            }
        }
        println!();
    }

    match outcome.status {
        OutcomeStatus::Failed => println!("✗ {}", outcome.message),
        _ => println!("✓ {}", outcome.message),
    }
    println!("  Duration: {}ms", duration_ms);
    for warning in &outcome.warnings {
        println!("  Warning: {}", warning);
    }
}

/// Show how an item would be routed
pub fn handle_classify(
    title: String,
    labels: Vec<String>,
    state: String,
    format: OutputFormat,
) -> Result<()> {
    let item = TrackedItem::new("", title)
        .with_labels(labels)
        .with_state(state);
    let (decision, rule) = classify_with_trace(&item);

    match format {
        OutputFormat::Text => {
            println!("Decision: {}", decision);
            println!("  Rule: {}", rule);
        }
        OutputFormat::Json => {
            let output = json!({
                "decision": decision.to_string(),
                "rule": rule,
                "title": item.title,
                "labels": item.labels,
                "state": item.state,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show recent runs from the ledger
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let runs = database
        .runs()
        .recent_runs(i64::try_from(limit).unwrap_or(i64::MAX))
        .await
        .context("Failed to fetch run history")?;

    match format {
        OutputFormat::Text => {
            if runs.is_empty() {
                println!("No runs in history");
                return Ok(());
            }

            println!("Run History (last {} runs):", limit);
            println!();

            for run in &runs {
                println!("Run ID: {}", run.id);
                println!("  Item: {} ({})", run.item_ref, run.source);
                println!("  Job: {}", run.job);
                println!("  Status: {}", run.status.as_str());

                if let Some(failure) = &run.failure {
                    println!("  Failure: {}", failure);
                }
                if let Some(message) = &run.message {
                    println!("  Message: {}", message);
                }
                if let Some(duration) = run.duration_ms {
                    println!("  Duration: {}ms", duration);
                }

                let created = chrono::DateTime::from_timestamp(run.created_at, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!("  Created: {}", created);

                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "runs": runs,
                "count": runs.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Manage keychain secrets
pub fn handle_secret(action: SecretAction, format: OutputFormat) -> Result<()> {
    let manager = SecretManager::default();

    match action {
        SecretAction::Set { key } => {
            if !KNOWN_SECRETS.contains(&key.as_str()) {
                tracing::warn!("'{}' is not a secret foreman reads", key);
            }

            if let OutputFormat::Text = format {
                eprintln!("Enter value for {} (input is read from stdin):", key);
            }
            let mut value = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut value)
                .context("Failed to read secret from stdin")?;
            let value = value.trim();
            if value.is_empty() {
                bail!("Secret value must not be empty");
            }

            manager.set_secret(&key, value)?;
            print_secret_result(format, &key, "stored")?;
        }
        SecretAction::Remove { key } => {
            manager.delete_secret(&key)?;
            print_secret_result(format, &key, "removed")?;
        }
        SecretAction::Status => match format {
            OutputFormat::Text => {
                println!("Secrets:");
                for key in KNOWN_SECRETS {
                    println!("  {:<24} {}", key, manager.source_of(key));
                }
            }
            OutputFormat::Json => {
                let secrets: Vec<_> = KNOWN_SECRETS
                    .iter()
                    .map(|key| json!({ "key": key, "source": manager.source_of(key).to_string() }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "secrets": secrets }))?);
            }
        },
    }

    Ok(())
}

fn print_secret_result(format: OutputFormat, key: &str, action: &str) -> Result<()> {
    match format {
        OutputFormat::Text => println!("✓ Secret '{}' {}", key, action),
        OutputFormat::Json => {
            let output = json!({ "key": key, "status": action });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_handler_runs_without_config() {
        handle_classify(
            "Add search".to_string(),
            vec!["ai-generated".to_string(), "backend".to_string()],
            "Todo".to_string(),
            OutputFormat::Json,
        )
        .unwrap();
    }

    #[test]
    fn test_build_orchestrator_with_ollama_needs_no_keys() {
        let mut config = Config::default();
        config.llm.default_provider = "ollama".to_string();

        let secrets = Arc::new(SecretCache::new(Arc::new(SecretManager::new(
            "foreman-test-no-such-service",
        ))));
        secrets.insert(LINEAR_API_KEY, crate::secrets::SecretString::new(""));

        let orchestrator = build_orchestrator(&config, &secrets).unwrap();
        assert_eq!(orchestrator.stages().len(), config.pipeline.stages.len());
    }

    #[tokio::test]
    async fn test_history_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.core.data_dir = dir.path().to_path_buf();

        handle_history(5, &config, OutputFormat::Json).await.unwrap();
    }
}
