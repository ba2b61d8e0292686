//! Listening socket setup.
//!
//! Candidate addresses are tried in order and the first one that binds wins.
//! Without a configured host the candidates are the IPv4 and IPv6 wildcard
//! addresses. SO_REUSEADDR lets a restarted server rebind straight away.

use crate::error::ServerError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use tracing::{info, warn};

/// Pending connection queue length
const BACKLOG: i32 = 10;

/// Addresses to try binding, in preference order.
pub fn candidates(host: Option<&str>, port: u16) -> Result<Vec<SocketAddr>, ServerError> {
    match host {
        None => Ok(vec![
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
        ]),
        Some(host) => (host, port)
            .to_socket_addrs()
            .map(Iterator::collect)
            .map_err(|e| ServerError::Resolve(format!("{host}:{port}"), e)),
    }
}

/// Bind and listen on the first candidate that accepts a bind.
///
/// The returned socket is non-blocking, ready to hand to tokio.
pub fn bind_first(addrs: &[SocketAddr]) -> Result<std::net::TcpListener, ServerError> {
    let mut failures = Vec::new();

    for &addr in addrs {
        match bind_one(addr) {
            Ok(socket) => {
                socket
                    .listen(BACKLOG)
                    .map_err(|e| ServerError::Listen(addr, e))?;
                socket
                    .set_nonblocking(true)
                    .map_err(|e| ServerError::Listen(addr, e))?;

                info!(address = %addr, "Listening");
                return Ok(socket.into());
            }
            Err(e) => {
                warn!(address = %addr, error = %e, "Bind failed, trying next address");
                failures.push((addr, e));
            }
        }
    }

    Err(ServerError::Bind(failures))
}

fn bind_one(addr: SocketAddr) -> std::io::Result<socket2::Socket> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    Ok(socket)
}
