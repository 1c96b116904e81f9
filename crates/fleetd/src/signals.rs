//! Signal handling for graceful orchestrator shutdown.
//!
//! Cross-platform signal handling so the daemon can kill its worker
//! processes and drain the proxy before exiting.

use tokio::signal;
use tracing::info;

/// Waits for a termination signal (SIGINT/SIGTERM on Unix; Ctrl+C on
/// Windows).
///
/// Returns `Ok(())` when a shutdown signal is received, or an error if
/// signal handler setup failed.
pub async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
