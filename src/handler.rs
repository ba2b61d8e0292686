//! Per-connection exchange: receive, append, read back, send.
//!
//! There is no request framing. The handler keeps reading while the socket
//! fills the whole receive buffer; the first short read (or EOF) ends the
//! exchange. A read that exactly fills the buffer is never taken as the end.

use crate::server::ServerContext;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, trace};

/// Outcome of a completed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    /// Bytes received from the peer and appended to the store
    pub received: usize,
    /// Bytes of log contents sent back
    pub sent: usize,
}

/// Handle a single client connection.
///
/// Errors are logged here and never escape the task.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, ctx: Arc<ServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match exchange(&mut stream, &ctx).await {
        Ok(done) => {
            debug!(peer = %peer, received = done.received, sent = done.sent, "Exchange complete");
        }
        Err(e) => {
            error!(peer = %peer, error = %e, "Connection failed");
        }
    }

    info!("Closed connection from {}", peer.ip());
}

/// Run one exchange over `stream` against the shared store.
pub async fn exchange<S>(stream: &mut S, ctx: &ServerContext) -> io::Result<Exchange>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut appender = ctx.store.appender().await?;
    let mut buffer = BytesMut::zeroed(ctx.buffer_size);
    let mut received = 0;

    loop {
        let n = with_timeout(ctx.io_timeout, stream.read(&mut buffer[..])).await?;
        if n == 0 {
            trace!("Peer closed its write side");
            break;
        }

        appender.append(&buffer[..n]).await?;
        received += n;

        if n < buffer.len() {
            break;
        }
    }
    drop(appender);

    let contents = ctx.store.read_all().await?;
    with_timeout(ctx.io_timeout, stream.write_all(&contents)).await?;
    with_timeout(ctx.io_timeout, stream.shutdown()).await?;

    Ok(Exchange {
        received,
        sent: contents.len(),
    })
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer timed out"))?,
        None => fut.await,
    }
}
