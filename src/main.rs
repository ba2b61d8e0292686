//! aesdsocket: a shared append-log socket server
//!
//! Every client connection streams bytes into one log file on disk and gets
//! the whole file sent back once it stops sending.
//!
//! Features:
//! - Task-per-connection handling with panics contained to the task
//! - SIGINT/SIGTERM remove the log file and exit cleanly
//! - Optional daemon mode (`-d`), forked after the socket is bound
//! - Configuration via CLI arguments or TOML file
//! - Logging to syslog or stderr

mod config;
mod error;
mod handler;
mod lifecycle;
mod listener;
mod logging;
mod server;
mod store;

use config::Config;
use error::ServerError;
use lifecycle::ShutdownSignal;
use server::{Server, ServerContext};
use tokio::net::TcpListener;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    logging::init(&config);

    info!(
        host = ?config.host,
        port = config.port,
        data_file = %config.data_file.display(),
        daemon = config.daemon,
        buffer_size = config.buffer_size,
        io_timeout_secs = ?config.io_timeout_secs,
        "Starting aesdsocket"
    );

    let ctx = ServerContext::from_config(&config);
    if config.fresh_start {
        ctx.store.remove()?;
    }

    let addrs = listener::candidates(config.host.as_deref(), config.port)?;
    let listener = listener::bind_first(&addrs)?;

    // Fork before any runtime threads exist
    if config.daemon {
        lifecycle::daemonize()?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    let store = ctx.store.clone();
    let signal = runtime.block_on(serve(listener, ctx))?;
    lifecycle::shutdown(runtime, &store, signal);

    Ok(())
}

/// Run the accept loop until a termination signal arrives.
async fn serve(
    listener: std::net::TcpListener,
    ctx: ServerContext,
) -> Result<ShutdownSignal, Box<dyn std::error::Error>> {
    let shutdown = lifecycle::install_signals()?;

    let local = listener.local_addr()?;
    let listener = TcpListener::from_std(listener).map_err(|e| ServerError::Listen(local, e))?;

    Ok(Server::new(listener, ctx).run(shutdown).await)
}
