//! Fleet console CLI
//!
//! A command-line tool for browsing reconciled fleet state and issuing
//! operator commands through the fleet console.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{operations, parse_target, sessions, streams};
use fleet_core::command::Command;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Fleet console CLI
#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about = "CLI for the Fleet Console", long_about = None)]
pub struct Cli {
    /// Console API URL (can also be set via FLEETCTL_API_URL env var)
    #[arg(long, env = "FLEETCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct Target {
    /// Entity kind (deployment, statefulset, daemonset, cronjob, pod, node, ...)
    pub kind: String,

    /// Entity as [namespace/]name
    pub target: String,
}

#[derive(Args)]
pub struct Wait {
    /// Wait until the entity converges
    #[arg(long)]
    pub wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "330")]
    pub timeout: u64,
}

impl Wait {
    fn options(&self) -> operations::WaitOptions {
        operations::WaitOptions {
            enabled: self.wait,
            timeout: Duration::from_secs(self.timeout),
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the reconciled view of a kind
    Get {
        /// Entity kind, singular or plural
        kind: String,

        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by status (e.g. OFFLINE, ONLINE_REGISTERED_READY)
        #[arg(long)]
        status: Option<String>,

        /// Reload the stream before showing it
        #[arg(long)]
        refresh: bool,
    },

    /// Reload a stream from both sources
    Reload {
        /// Entity kind, singular or plural
        kind: String,
    },

    /// Scale a deployment or statefulset
    Scale {
        #[command(flatten)]
        target: Target,

        /// Desired replica count
        #[arg(long)]
        replicas: u32,

        #[command(flatten)]
        wait: Wait,
    },

    /// Restart the pods of a workload
    Restart {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        wait: Wait,
    },

    /// Roll a workload back
    Rollback {
        #[command(flatten)]
        target: Target,

        /// Revision to roll back to (previous revision if omitted)
        #[arg(long)]
        revision: Option<i64>,

        #[command(flatten)]
        wait: Wait,
    },

    /// Update the image of a workload
    SetImage {
        #[command(flatten)]
        target: Target,

        /// New image reference
        image: String,

        /// Container to update (first container if omitted)
        #[arg(long, short)]
        container: Option<String>,

        #[command(flatten)]
        wait: Wait,
    },

    /// Suspend a cronjob
    Suspend {
        #[command(flatten)]
        target: Target,
    },

    /// Resume a cronjob
    Resume {
        #[command(flatten)]
        target: Target,
    },

    /// Delete an entity
    Delete {
        #[command(flatten)]
        target: Target,
    },

    /// Show convergence sessions
    Sessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("fleetctl=debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load()?;
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url.as_deref()))?;
    let default_ns = config.default_namespace.as_deref();
    let format = cli.format;

    let no_wait = operations::WaitOptions {
        enabled: false,
        timeout: Duration::ZERO,
        interval: Duration::ZERO,
    };

    let (command, target, wait) = match cli.command {
        Commands::Get {
            kind,
            namespace,
            status,
            refresh,
        } => {
            return streams::get_stream(&client, &kind, namespace, status, refresh, format).await;
        }
        Commands::Reload { kind } => return streams::reload_stream(&client, &kind, format).await,
        Commands::Sessions => return sessions::list_sessions(&client, format).await,
        Commands::Scale {
            target,
            replicas,
            wait,
        } => (Command::Scale { replicas }, target, wait.options()),
        Commands::Restart { target, wait } => (Command::Restart, target, wait.options()),
        Commands::Rollback {
            target,
            revision,
            wait,
        } => (Command::Rollback { revision }, target, wait.options()),
        Commands::SetImage {
            target,
            image,
            container,
            wait,
        } => (Command::UpdateImage { container, image }, target, wait.options()),
        Commands::Suspend { target } => (Command::Suspend, target, no_wait),
        Commands::Resume { target } => (Command::Resume, target, no_wait),
        Commands::Delete { target } => (Command::Delete, target, no_wait),
    };

    let identity = parse_target(&target.kind, &target.target, default_ns)?;
    operations::run_command(&client, command, identity, wait, format).await
}
