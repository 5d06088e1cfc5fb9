// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crossmig check` command - Check container compatibility.

use crossmig_core::{Architecture, CompatibilityCheck, ContainerId};

pub fn execute(
    config: Option<&str>,
    container_id: &str,
    target_arch: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let container_id = ContainerId::new(container_id)?;
    let target_arch = Architecture::new(target_arch)?;

    tracing::info!(container_id = %container_id, target_arch = %target_arch, "Checking compatibility");

    let orchestrator = super::build_orchestrator(config)?;
    let compatibility = orchestrator.check_container_compatibility(&container_id, &target_arch);

    print_compatibility_report(&compatibility);

    if compatibility.is_compatible {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

pub fn print_compatibility_report(compatibility: &CompatibilityCheck) {
    let mark = |flag: bool| if flag { "✓" } else { "✗" };

    println!();
    println!("=== Container Compatibility Report ===");
    println!("Overall Compatible:      {}", mark(compatibility.is_compatible));
    println!(
        "Architecture Compatible: {}",
        mark(compatibility.architecture_compatible)
    );
    println!(
        "Kernel Compatible:       {}",
        mark(compatibility.kernel_compatible)
    );
    println!(
        "Runtime Compatible:      {}",
        mark(compatibility.runtime_compatible)
    );

    if !compatibility.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &compatibility.issues {
            println!("  • {}", issue);
        }
    }

    if !compatibility.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for rec in &compatibility.recommendations {
            println!("  • {}", rec);
        }
    }
    println!();
}
