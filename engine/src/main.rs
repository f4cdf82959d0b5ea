// Foreman
// Main entry point for the foreman binary

use clap::Parser;
use foreman_engine::cli::{Cli, Command};
use foreman_engine::config::Config;
use foreman_engine::handlers::{
    handle_classify, handle_history, handle_run, handle_secret, handle_serve, OutputFormat,
};
use foreman_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Classification and secret management work without a config file
    match cli.command {
        Command::Classify {
            title,
            labels,
            state,
        } => {
            init_telemetry_with_level(cli.log.as_deref().unwrap_or("warn"));
            return handle_classify(title, labels, state, format);
        }
        Command::Secret { action } => {
            init_telemetry_with_level(cli.log.as_deref().unwrap_or("warn"));
            return handle_secret(action, format);
        }
        _ => {}
    }

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!("Foreman v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { port } => handle_serve(&config, port, format).await,
        Command::Run {
            requirement,
            stages,
        } => handle_run(requirement, stages, &config, format).await,
        Command::History { limit } => handle_history(limit, &config, format).await,
        Command::Classify { .. } | Command::Secret { .. } => Ok(()),
    }
}
