//! CLI interface for Foreman
//!
//! Commands and global flags, defined with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Foreman
///
/// Routes tracker webhooks to an AI development team: big requests are
/// decomposed into sub-issues, concrete tasks are executed by the matching
/// capability, and the outcome is written back to the tracker.
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the webhook server and worker pool
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the multi-stage pipeline for a requirement in the foreground
    Run {
        /// The requirement to work on
        requirement: String,

        /// Comma-separated stages overriding the configured pipeline
        #[arg(long, value_delimiter = ',')]
        stages: Vec<String>,
    },

    /// Show how an item would be routed, without running anything
    Classify {
        /// Item title
        #[arg(long, default_value = "")]
        title: String,

        /// Item label (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Current workflow state
        #[arg(long, default_value = "")]
        state: String,
    },

    /// Show recent runs
    History {
        /// Number of runs to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage secrets stored in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a secret, reading the value from stdin
    Set {
        /// Secret name (e.g. linear_api_key)
        key: String,
    },

    /// Remove a secret from the keychain
    Remove {
        /// Secret name
        key: String,
    },

    /// Show where each known secret is resolved from
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["foreman", "serve"]);
        assert!(matches!(cli.command, Command::Serve { port: None }));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["foreman", "--json", "--log", "debug", "history"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "foreman",
            "run",
            "Add a prediction market",
            "--stages",
            "database,backend",
        ]);
        if let Command::Run {
            requirement,
            stages,
        } = cli.command
        {
            assert_eq!(requirement, "Add a prediction market");
            assert_eq!(stages, vec!["database", "backend"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_classify_command() {
        let cli = Cli::parse_from([
            "foreman",
            "classify",
            "--title",
            "Add search",
            "--label",
            "ai-generated",
            "--label",
            "backend",
            "--state",
            "Todo",
        ]);
        if let Command::Classify {
            title,
            labels,
            state,
        } = cli.command
        {
            assert_eq!(title, "Add search");
            assert_eq!(labels, vec!["ai-generated", "backend"]);
            assert_eq!(state, "Todo");
        } else {
            panic!("Expected Classify command");
        }
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["foreman", "history", "--limit", "20"]);
        assert!(matches!(cli.command, Command::History { limit: 20 }));
    }

    #[test]
    fn test_secret_command() {
        let cli = Cli::parse_from(["foreman", "secret", "set", "linear_api_key"]);
        assert!(matches!(
            cli.command,
            Command::Secret {
                action: SecretAction::Set { .. }
            }
        ));
    }
}
