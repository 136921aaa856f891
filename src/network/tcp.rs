//! TCP connection setup
//!
//! Sockets are configured through socket2 before connecting. A clone of
//! the live stream is parked in a [`SocketInterrupt`] so another thread can
//! shut it down and unblock a pending read.

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::error::NetworkError;

/// Resolve `host:port`, trying every address in turn
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, NetworkError> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::Resolve(format!("{}: {}", host, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(NetworkError::Resolve(format!("{}: no addresses", host)));
    }
    Ok(addrs)
}

/// Open a TCP stream with no-delay and the given read timeout.
///
/// `timeout` also bounds each connect attempt.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, NetworkError> {
    let mut last_error = None;

    for addr in resolve(host, port)? {
        match connect_addr(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(NetworkError::ConnectionFailed(
        last_error.map_or_else(|| "no addresses".to_string(), |e| e.to_string()),
    ))
}

fn connect_addr(addr: &SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.connect_timeout(&SockAddr::from(*addr), timeout)?;
    Ok(socket.into())
}

/// Lets a stop request unblock a socket read on another thread
#[derive(Clone, Default)]
pub struct SocketInterrupt {
    slot: Arc<Mutex<Option<TcpStream>>>,
}

impl SocketInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a handle to `stream` so [`interrupt`](Self::interrupt) can reach it
    pub fn register(&self, stream: &TcpStream) -> std::io::Result<()> {
        *self.slot.lock() = Some(stream.try_clone()?);
        Ok(())
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }

    /// Shut down the registered stream, failing any blocked read on it
    pub fn interrupt(&self) {
        if let Some(stream) = self.slot.lock().take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                tracing::debug!("Socket shutdown failed: {}", e);
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.slot.lock().is_some()
    }
}
