//! Process lifecycle: termination signals, daemon mode and cleanup.

use crate::error::ServerError;
use crate::store::LogStore;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Signal that ended the accept loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Register SIGINT and SIGTERM handlers.
///
/// Must be called from inside the runtime and before the accept loop starts.
/// The handlers stay registered for as long as the returned future lives.
pub fn install_signals() -> Result<impl Future<Output = ShutdownSignal>, ServerError> {
    let mut interrupt = signal(SignalKind::interrupt()).map_err(ServerError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(ServerError::Signal)?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        }
    })
}

/// Fork once and let the parent exit with success.
///
/// Called after the listening socket is bound and before the async runtime
/// exists; the child inherits the socket and carries on as the server.
/// The session and standard streams are left as they are.
pub fn daemonize() -> Result<(), ServerError> {
    // SAFETY: no runtime or worker threads have been started yet
    match unsafe { libc::fork() } {
        -1 => Err(ServerError::Fork(std::io::Error::last_os_error())),
        0 => {
            info!(pid = std::process::id(), "Running in background");
            Ok(())
        }
        child => {
            info!(child, "Daemon started, parent exiting");
            std::process::exit(0);
        }
    }
}

/// How long blocking file work left by aborted handlers may keep running
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Stop the runtime, then delete the log store.
///
/// Aborted handlers may still have file operations queued on the blocking
/// pool; an in-flight append-mode open would recreate the file, so the pool
/// is drained before the file is removed.
pub fn shutdown(runtime: Runtime, store: &LogStore, signal: ShutdownSignal) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    finish(store, signal);
}

/// Delete the log store after a termination signal.
pub fn finish(store: &LogStore, signal: ShutdownSignal) {
    info!(signal = %signal, "Caught signal, exiting");

    if let Err(e) = store.remove() {
        error!(path = %store.path().display(), error = %e, "Failed to remove log store");
    }
}
