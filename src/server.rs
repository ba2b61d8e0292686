//! TCP accept loop.
//!
//! Each accepted connection runs in its own task so the loop can go straight
//! back to accepting. Tasks are tracked in a `JoinSet` and reaped as they
//! finish; a panic inside one handler is contained to its task.

use crate::config::Config;
use crate::handler::handle_connection;
use crate::lifecycle::ShutdownSignal;
use crate::store::LogStore;
use std::future::Future;
#[cfg(test)]
use std::io;
#[cfg(test)]
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// State shared by the accept loop and every connection handler
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub store: LogStore,
    /// Receive buffer capacity; a read shorter than this ends an exchange
    pub buffer_size: usize,
    pub io_timeout: Option<Duration>,
}

impl ServerContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: LogStore::new(&config.data_file),
            buffer_size: config.buffer_size,
            io_timeout: config.io_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub fn new(listener: TcpListener, ctx: ServerContext) -> Self {
        Server {
            listener,
            ctx: Arc::new(ctx),
        }
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// In-flight handlers are aborted, not awaited, once shutdown fires. The
    /// listening socket is closed when this returns.
    pub async fn run<F>(self, shutdown: F) -> ShutdownSignal
    where
        F: Future<Output = ShutdownSignal>,
    {
        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        info!("Waiting for connections");

        let signal = loop {
            tokio::select! {
                signal = &mut shutdown => break signal,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Accepted connection from {}", peer.ip());
                        let ctx = Arc::clone(&self.ctx);
                        handlers.spawn(handle_connection(stream, peer, ctx));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },

                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    reap(finished);
                }
            }
        };

        if !handlers.is_empty() {
            debug!(in_flight = handlers.len(), "Aborting connection handlers");
        }
        handlers.abort_all();

        signal
    }
}

fn reap(finished: Result<(), tokio::task::JoinError>) {
    match finished {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Connection handler panicked"),
        Err(e) => debug!(error = %e, "Connection handler cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    struct Harness {
        addr: SocketAddr,
        ctx: Arc<ServerContext>,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<ShutdownSignal>,
        _dir: tempfile::TempDir,
    }

    async fn start(buffer_size: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServerContext {
            store: LogStore::new(dir.path().join("socketdata")),
            buffer_size,
            io_timeout: None,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(listener, ctx);
        let addr = server.local_addr().unwrap();
        let ctx = Arc::clone(server.context());

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(server.run(async move {
            let _ = stopped.await;
            ShutdownSignal::Interrupt
        }));

        Harness {
            addr,
            ctx,
            stop,
            task,
            _dir: dir,
        }
    }

    async fn send(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_hello_world_scenario() {
        let harness = start(1024).await;

        assert_eq!(send(harness.addr, b"hello\n").await, b"hello\n");
        assert_eq!(send(harness.addr, b"world\n").await, b"hello\nworld\n");

        harness.stop.send(()).unwrap();
        assert_eq!(harness.task.await.unwrap(), ShutdownSignal::Interrupt);
    }

    #[tokio::test]
    async fn test_sequential_connections_return_prefix_concatenation() {
        let harness = start(16).await;
        let payloads: Vec<Vec<u8>> = (0..5)
            .map(|i| format!("line {i}\n").into_bytes())
            .collect();

        let mut expected = Vec::new();
        for payload in &payloads {
            expected.extend_from_slice(payload);
            assert_eq!(send(harness.addr, payload).await, expected);
        }

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_connections_do_not_corrupt_store() {
        let harness = start(1024).await;
        let payloads: Vec<Vec<u8>> = (0..16)
            .map(|i| format!("client-{i:02}:{}\n", "x".repeat(i + 1)).into_bytes())
            .collect();

        let mut clients = JoinSet::new();
        for payload in payloads.clone() {
            let addr = harness.addr;
            clients.spawn(async move { send(addr, &payload).await });
        }
        while let Some(reply) = clients.join_next().await {
            assert!(!reply.unwrap().is_empty());
        }

        let contents = harness.ctx.store.read_all().await.unwrap();
        let total: usize = payloads.iter().map(Vec::len).sum();
        assert_eq!(contents.len(), total);
        for payload in &payloads {
            assert!(
                contents.windows(payload.len()).any(|w| w == &payload[..]),
                "payload {:?} was split",
                String::from_utf8_lossy(payload)
            );
        }

        harness.stop.send(()).unwrap();
        harness.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stalled_handler() {
        let harness = start(1024).await;

        // Connect but never send; the handler blocks in its first read.
        let _idle = TcpStream::connect(harness.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.stop.send(()).unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(5), harness.task)
            .await
            .expect("run did not return")
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Interrupt);
    }

    #[tokio::test]
    async fn test_failed_peers_do_not_affect_others() {
        let harness = start(1024).await;

        // One peer never sends, so its handler blocks in its first read.
        let _stalled = TcpStream::connect(harness.addr).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), send(harness.addr, b"ok\n"))
            .await
            .expect("healthy peer was blocked by a stalled one");
        assert_eq!(reply, b"ok\n");

        // Another peer resets its connection without sending anything.
        let reset = TcpStream::connect(harness.addr).await.unwrap();
        socket2::SockRef::from(&reset)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(reset);

        let reply = tokio::time::timeout(Duration::from_secs(5), send(harness.addr, b"again\n"))
            .await
            .expect("healthy peer was blocked by a reset one");
        assert_eq!(reply, b"ok\nagain\n");

        harness.stop.send(()).unwrap();
        assert_eq!(harness.task.await.unwrap(), ShutdownSignal::Interrupt);
    }

    #[tokio::test]
    async fn test_reap_contains_panicked_handler() {
        let mut handlers = JoinSet::new();
        handlers.spawn(async {
            panic!("handler blew up");
        });
        handlers.spawn(async {});

        let mut panicked = 0;
        let mut completed = 0;
        while let Some(finished) = handlers.join_next().await {
            match &finished {
                Err(e) if e.is_panic() => panicked += 1,
                Ok(()) => completed += 1,
                Err(e) => panic!("unexpected join error: {e}"),
            }
            reap(finished);
        }

        assert_eq!(panicked, 1);
        assert_eq!(completed, 1);
    }
}
