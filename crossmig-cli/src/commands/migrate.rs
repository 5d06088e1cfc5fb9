// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crossmig migrate` command - Migrate a container to a target host.

use crossmig_core::{
    Architecture, ContainerId, MigrationConfig, MigrationResult, TargetHost,
};

use super::check::print_compatibility_report;

/// Parsed migrate arguments.
pub struct MigrateArgs {
    pub container_id: String,
    pub target_host: String,
    pub source_arch: String,
    pub target_arch: String,
    pub preserve_networking: bool,
    pub preserve_volumes: bool,
    pub rollback_on_failure: bool,
    pub dry_run: bool,
}

pub fn execute(
    config: Option<&str>,
    args: MigrateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let container_id = ContainerId::new(args.container_id.as_str())?;
    let target_host = TargetHost::parse(args.target_host.as_str())?;

    let mut migration = MigrationConfig::new(container_id.clone(), target_host);
    migration.source_arch = Architecture::new(args.source_arch.as_str())?;
    migration.target_arch = Architecture::new(args.target_arch.as_str())?;
    migration.preserve_networking = args.preserve_networking;
    migration.preserve_volumes = args.preserve_volumes;
    migration.rollback_on_failure = args.rollback_on_failure;

    let orchestrator = super::build_orchestrator(config)?;

    if args.dry_run {
        println!("=== DRY RUN MODE ===");
        println!("Checking migration prerequisites and compatibility...");

        let report = orchestrator.validate_migration_prerequisites(&migration);
        if !report.is_ok() {
            println!("Prerequisites validation failed:");
            for error in &report.errors {
                println!("  • {}", error);
            }
            std::process::exit(1);
        }
        println!("✓ Prerequisites validation passed");

        let compatibility = orchestrator
            .check_container_compatibility(&container_id, &migration.target_arch);
        print_compatibility_report(&compatibility);

        if compatibility.is_compatible {
            println!("✓ Container is compatible for migration");
            println!("Migration would proceed in normal mode");
            return Ok(());
        }
        println!("✗ Container has compatibility issues");
        println!("Migration would fail in normal mode");
        std::process::exit(1);
    }

    println!(
        "Starting migration of container {} to {}",
        migration.container_id, migration.target_host
    );
    println!("This may take several minutes...");

    let result = orchestrator.migrate_container(&migration);
    print_migration_result(&result);

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_migration_result(result: &MigrationResult) {
    println!();
    println!("=== Migration Result ===");
    println!("Status: {}", result.status);
    println!("Success: {}", if result.success { "✓" } else { "✗" });
    println!("Container ID: {}", result.container_id);

    if let Some(elapsed) = result.migration_time {
        println!("Migration Time: {:.2} seconds", elapsed.as_secs_f64());
    }

    if let Some(ref path) = result.source_checkpoint_path {
        println!("Source Checkpoint: {}", path.display());
    }

    if let Some(ref path) = result.target_checkpoint_path {
        println!("Target Checkpoint: {}", path);
    }

    if let Some(ref error) = result.error_message {
        println!("Error: {}", error);
    }

    if !result.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &result.warnings {
            println!("  • {}", warning);
        }
    }
    println!();
}
