//! # Process termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves on the first of:
//! - unix: `SIGINT`, `SIGTERM`, `SIGQUIT` (and Ctrl-C)
//! - elsewhere: Ctrl-C

/// Resolves once the process is asked to terminate.
///
/// Fails only if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut int = signal(SignalKind::interrupt())?;

    let which = tokio::select! {
        _ = tokio::signal::ctrl_c() => "ctrl-c",
        _ = int.recv() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = which, "termination signal received");
    Ok(())
}

/// Resolves once the process is asked to terminate.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
