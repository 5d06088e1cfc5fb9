//! CLI command handlers.

pub mod cancel;
pub mod check;
pub mod list;
pub mod migrate;
pub mod validate;

use crossmig_core::{ConfigLoader, MigrationOrchestrator, Settings};

/// Load settings from an explicit file, or fall back to built-in defaults.
pub fn load_settings(config: Option<&str>) -> Result<Settings, Box<dyn std::error::Error>> {
    match config {
        Some(path) => Ok(ConfigLoader::load_file(path)?),
        None => Ok(Settings::default()),
    }
}

/// Build an orchestrator over the real system runner.
pub fn build_orchestrator(
    config: Option<&str>,
) -> Result<MigrationOrchestrator, Box<dyn std::error::Error>> {
    let settings = load_settings(config)?;
    Ok(MigrationOrchestrator::with_system_runner(settings)?)
}
