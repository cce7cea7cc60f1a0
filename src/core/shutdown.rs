//! # Cross-platform OS signal handling.
//!
//! Provides [`wait_for_signal`], an async helper that completes when the
//! process receives a termination signal. Used by
//! [`ClusterManager::run_until_shutdown`](crate::ClusterManager::run_until_shutdown).
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use crate::error::ClusterError;

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or
/// [`ClusterError::Signal`] if listener registration fails.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<(), ClusterError> {
    use tokio::signal::unix::{signal, SignalKind};

    let register = |kind: SignalKind| {
        signal(kind).map_err(|e| ClusterError::Signal {
            detail: e.to_string(),
        })
    };
    let mut sigint = register(SignalKind::interrupt())?;
    let mut sigterm = register(SignalKind::terminate())?;
    let mut sigquit = register(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or
/// [`ClusterError::Signal`] if listener registration fails.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<(), ClusterError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ClusterError::Signal {
            detail: e.to_string(),
        })
}
