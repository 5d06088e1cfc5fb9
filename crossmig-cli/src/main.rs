// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Crossmig CLI
//!
//! Command-line interface for cross-architecture container migration.

use clap::{Parser, Subcommand};

mod commands;

/// Crossmig - Cross-architecture container migration via checkpoint/restore
#[derive(Parser)]
#[command(name = "crossmig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file path (built-in defaults when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check container compatibility for migration
    Check {
        /// Container ID to check
        container_id: String,

        /// Target architecture
        #[arg(long, default_value = "aarch64")]
        target_arch: String,
    },

    /// Migrate a container to a target host
    Migrate {
        /// Container ID to migrate
        container_id: String,

        /// Target host (adb:<serial> or user@host)
        target_host: String,

        /// Source architecture
        #[arg(long, default_value = "x86_64")]
        source_arch: String,

        /// Target architecture
        #[arg(long, default_value = "aarch64")]
        target_arch: String,

        /// Don't preserve established network connections
        #[arg(long)]
        no_preserve_networking: bool,

        /// Don't preserve volume state
        #[arg(long)]
        no_preserve_volumes: bool,

        /// Don't roll back on failure
        #[arg(long)]
        no_rollback: bool,

        /// Run prerequisite and compatibility checks only, no side effects
        #[arg(long)]
        dry_run: bool,
    },

    /// List tracked migrations
    List,

    /// Cancel an in-flight migration
    Cancel {
        /// Container ID to cancel
        container_id: String,
    },

    /// Validate a settings file
    Validate {
        /// Path to the settings file
        file: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Check {
            container_id,
            target_arch,
        } => commands::check::execute(cli.config.as_deref(), &container_id, &target_arch),
        Commands::Migrate {
            container_id,
            target_host,
            source_arch,
            target_arch,
            no_preserve_networking,
            no_preserve_volumes,
            no_rollback,
            dry_run,
        } => commands::migrate::execute(
            cli.config.as_deref(),
            commands::migrate::MigrateArgs {
                container_id,
                target_host,
                source_arch,
                target_arch,
                preserve_networking: !no_preserve_networking,
                preserve_volumes: !no_preserve_volumes,
                rollback_on_failure: !no_rollback,
                dry_run,
            },
        ),
        Commands::List => commands::list::execute(cli.config.as_deref()),
        Commands::Cancel { container_id } => {
            commands::cancel::execute(cli.config.as_deref(), &container_id)
        }
        Commands::Validate { file } => commands::validate::execute(&file),
    }
}
