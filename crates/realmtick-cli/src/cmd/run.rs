use anyhow::Context;
use realmtick_core::config::Config;
use realmtick_runtime::{RunMode, Runtime};
use std::path::Path;
use tokio::sync::watch;
use tracing::{info, warn};

/// Run the selected services until Ctrl-C, then drain and exit.
pub fn run(root: &Path, mode: RunMode) -> anyhow::Result<()> {
    let config = Config::load_effective(root).context("failed to load config")?;
    for w in config.validate() {
        warn!(level = ?w.level, "{}", w.message);
    }
    let runtime = Runtime::open(root, config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, shutting down"),
                Err(e) => {
                    // Dropping the sender would read as a shutdown.
                    warn!(error = %e, "cannot listen for interrupts");
                    std::future::pending::<()>().await;
                }
            }
            let _ = shutdown_tx.send(true);
        });

        info!(mode = %mode, root = %root.display(), "realmtick starting");
        runtime.run(mode, shutdown_rx).await
    })
}
