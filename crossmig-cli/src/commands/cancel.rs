//! `crossmig cancel` command - Cancel an in-flight migration.
//!
//! Cancellation is cooperative: the tracked attempt is flagged and stops at
//! its next stage boundary. An already-dispatched external command is not
//! interrupted.

use crossmig_core::ContainerId;

pub fn execute(config: Option<&str>, container_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let container_id = ContainerId::new(container_id)?;
    let orchestrator = super::build_orchestrator(config)?;

    if orchestrator.cancel_migration(&container_id) {
        println!(
            "Migration for container {} cancelled successfully",
            container_id
        );
        Ok(())
    } else {
        println!("Failed to cancel migration for container {}", container_id);
        std::process::exit(1);
    }
}
