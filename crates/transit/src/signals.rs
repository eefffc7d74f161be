//! Signal handling for graceful shutdown.
//!
//! The first SIGINT/SIGTERM (Ctrl+C on Windows) initiates shutdown on the
//! shared [`ShutdownState`]; the application installs a second listener
//! afterwards that exits immediately.

use tokio::signal;
use tracing::info;
use transit_event_system::ShutdownState;

/// Waits for a termination signal, then initiates shutdown on `shutdown_state`.
pub async fn setup_signal_handlers(shutdown_state: &ShutdownState) -> Result<(), Box<dyn std::error::Error>> {
    wait_for_signal().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    shutdown_state.initiate_shutdown();
    Ok(())
}

/// Resolves on the next termination signal.
pub async fn wait_for_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}
