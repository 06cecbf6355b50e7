//! One-shot expiry sweep.

use chrono::Utc;
use console::style;

use crate::config::Settings;
use crate::server::AppState;

/// Run a single cleanup sweep and print what it removed.
pub async fn cmd_cleanup(settings: &Settings) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings)?;
    state.db.init_schema().await?;

    let report = state.cleanup.sweep_once(Utc::now()).await?;

    println!(
        "{} Removed {} expired session(s)",
        style("✓").green(),
        report.sessions_deleted
    );
    println!("  Stored files deleted: {}", report.objects_deleted);
    if report.object_errors > 0 {
        println!(
            "  {} {} stored file(s) could not be deleted",
            style("!").yellow(),
            report.object_errors
        );
    }
    println!("  Upload events pruned: {}", report.upload_events_pruned);

    Ok(())
}
