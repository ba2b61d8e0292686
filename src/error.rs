//! Setup errors. Every variant is fatal: the process exits non-zero.

use std::io;
use std::net::SocketAddr;

#[derive(Debug)]
pub enum ServerError {
    /// Host/port could not be resolved to any address
    Resolve(String, io::Error),
    /// Socket creation or bind failed on every candidate address
    Bind(Vec<(SocketAddr, io::Error)>),
    Listen(SocketAddr, io::Error),
    Signal(io::Error),
    Fork(io::Error),
    Runtime(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Resolve(target, e) => write!(f, "Failed to resolve '{target}': {e}"),
            ServerError::Bind(attempts) if attempts.is_empty() => {
                write!(f, "Failed to bind: no candidate addresses")
            }
            ServerError::Bind(attempts) => {
                write!(f, "Failed to bind")?;
                for (addr, e) in attempts {
                    write!(f, "; {addr}: {e}")?;
                }
                Ok(())
            }
            ServerError::Listen(addr, e) => write!(f, "Failed to listen on {addr}: {e}"),
            ServerError::Signal(e) => write!(f, "Failed to install signal handler: {e}"),
            ServerError::Fork(e) => write!(f, "Failed to fork daemon: {e}"),
            ServerError::Runtime(e) => write!(f, "Failed to start runtime: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Resolve(_, e)
            | ServerError::Listen(_, e)
            | ServerError::Signal(e)
            | ServerError::Fork(e)
            | ServerError::Runtime(e) => Some(e),
            ServerError::Bind(_) => None,
        }
    }
}
