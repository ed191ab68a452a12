use std::sync::Arc;

use tributary::{BackgroundScheduler, SourceRegistry};

use crate::commands::shared::{CliResult, open_manager};
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown;

/// Run background syncs for `users` until Ctrl+C.
///
/// With `once`, every user is synced a single time and the command returns
/// when those runs finish.
pub(crate) async fn handle_serve(
    config: &Config,
    sources: Arc<SourceRegistry>,
    users: Vec<String>,
    once: bool,
) -> CliResult {
    if users.is_empty() {
        return Err("no users to sync; set scheduler.users or pass --users".into());
    }

    let reporter = Arc::new(ProgressReporter::logging());
    let scheduler = Arc::new(BackgroundScheduler::new(config.scheduler_config()));

    for user in &users {
        let manager = open_manager(
            config,
            Arc::clone(&sources),
            user,
            Some(reporter.as_callback()),
        )
        .await?;
        scheduler.register(Arc::new(manager));
    }

    if once {
        for handle in scheduler.tick() {
            handle.await?;
        }
        return Ok(());
    }

    let shutdown = shutdown::setup_shutdown_handler();
    match Arc::clone(&scheduler).spawn(shutdown) {
        Some(handle) => {
            tracing::info!(users = ?scheduler.registered_users(), "Serving background sync");
            handle.await?;
        }
        None => println!("Background sync is disabled (scheduler.enabled = false)."),
    }

    Ok(())
}
