//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT and SIGTERM (ctrl-c off unix)
//! - Translate the first one received into a [`Shutdown`] trigger

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Register termination handlers and trigger `shutdown` on the first signal.
///
/// Registration happens before this returns, so a failure surfaces here
/// rather than as a process that can never be stopped.
#[cfg(unix)]
pub fn listen(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = name, "Termination signal received");
        shutdown.trigger();
    }))
}

#[cfg(not(unix))]
pub fn listen(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!(signal = "ctrl-c", "Termination signal received"),
            Err(e) => tracing::error!(error = %e, "Cannot listen for ctrl-c, shutting down"),
        }
        shutdown.trigger();
    }))
}
