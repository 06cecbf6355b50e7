//! API server command.

use std::net::SocketAddr;
use std::time::Duration;

use console::style;

use crate::config::Settings;
use crate::server::AppState;

/// Prepare the database, resume unfinished jobs, start the sweeper and serve.
pub async fn cmd_serve(mut settings: Settings, bind: Option<&str>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        let (host, port) = parse_bind_address(bind, settings.server.port);
        settings.server.host = host;
        settings.server.port = port;
    }
    let addr: SocketAddr = settings.bind_addr().map_err(|e| anyhow::anyhow!(e))?;

    settings.ensure_directories()?;
    let state = AppState::from_settings(&settings)?;

    println!("{} Running database migrations...", style("→").cyan());
    match state.db.init_schema().await {
        Ok(()) => println!("  {} Database ready", style("✓").green()),
        Err(e) => {
            eprintln!("  {} Migration failed: {}", style("✗").red(), e);
            return Err(anyhow::anyhow!("Database migration failed: {}", e));
        }
    }

    let resumed = state.jobs.resume_pending().await?;
    if resumed > 0 {
        println!(
            "  {} Resumed {} unfinished transcription job(s)",
            style("✓").green(),
            resumed
        );
    }

    let sweeper = state
        .cleanup
        .clone()
        .spawn(Duration::from_secs(settings.session.cleanup_interval_secs.max(1)));

    println!("{} Starting repurpose server at http://{}", style("→").cyan(), addr);
    println!("  Press Ctrl+C to stop");

    let result = crate::server::serve(state, addr).await;
    sweeper.abort();
    result
}

/// Parse a bind address that can be:
/// - Just a port: "8000" -> 127.0.0.1:8000
/// - Just a host: "0.0.0.0" -> 0.0.0.0:{default_port}
/// - Host and port: "0.0.0.0:8000" -> 0.0.0.0:8000
fn parse_bind_address(bind: &str, default_port: u16) -> (String, u16) {
    if let Ok(port) = bind.parse::<u16>() {
        return ("127.0.0.1".to_string(), port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    (bind.to_string(), default_port)
}
