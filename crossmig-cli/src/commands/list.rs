//! `crossmig list` command - List tracked migrations.

pub fn execute(config: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = super::build_orchestrator(config)?;
    let migrations = orchestrator.list_active_migrations();

    if migrations.is_empty() {
        println!("No active migrations");
        return Ok(());
    }

    println!("=== Active Migrations ===");
    for migration in &migrations {
        println!("Container: {}", migration.container_id);
        println!("Status: {}", migration.status);
        if let Some(ref error) = migration.error_message {
            println!("Error: {}", error);
        }
        println!();
    }

    Ok(())
}
