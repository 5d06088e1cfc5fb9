// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `crossmig validate` command - Validate a settings file.

use crossmig_core::ConfigLoader;

pub fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating settings");

    match ConfigLoader::load_file(file) {
        Ok(settings) => {
            println!("✓ Settings are valid");
            println!();
            println!("Resolved Settings:");
            println!("  Work Directory:       {}", settings.work_dir.display());
            println!(
                "  Checkpoint Directory: {}",
                settings.checkpoint_dir.display()
            );
            println!(
                "  Checkpoint Binary:    {}",
                settings
                    .checkpoint_binary
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(discovered)".to_string())
            );
            println!("  Remote Work Dir:      {}", settings.remote_work_dir);
            println!();
            println!("Timeouts:");
            println!("  Probe:      {}s", settings.timeouts.probe().as_secs());
            println!("  Shell:      {}s", settings.timeouts.shell().as_secs());
            println!("  Transfer:   {}s", settings.timeouts.transfer().as_secs());
            println!(
                "  Checkpoint: {}s",
                settings.timeouts.checkpoint().as_secs()
            );
            println!("  Restore:    {}s", settings.timeouts.restore().as_secs());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Settings validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
