//! Initialize command.

use console::style;

use crate::config::Settings;

/// Create the data directories and database schema.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context()?;
    ctx.init_schema().await?;

    println!(
        "{} Initialized repurpose in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
