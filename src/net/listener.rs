//! Listener loops with backpressure.
//!
//! # Responsibilities
//! - Bind TCP and UDP sockets for the engines
//! - Enforce a max_connections limit on TCP accepts via semaphore
//! - Keep accepting until the owning engine cancels the loop
//!
//! Connections and datagrams are handed to nobody here: query answering and
//! tunnelling belong to the handlers plugged into the engines, so the loops
//! only account for traffic and release it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Maximum size of a datagram read by [`drain_udp`].
const MAX_DATAGRAM: usize = 65_535;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limit was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Connection limit closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
            ListenerError::Closed => None,
        }
    }
}

impl ListenerError {
    /// The underlying I/O error, if any.
    pub fn into_io(self) -> std::io::Error {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => e,
            ListenerError::Closed => std::io::Error::other("connection limit closed"),
        }
    }
}

/// A bounded TCP listener that limits concurrent connections.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to `addr`, allowing at most `max_connections` live connections.
    pub async fn bind(addr: SocketAddr, max_connections: usize) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Accept connections on `listener` until `token` is cancelled.
pub async fn drain_tcp(listener: Listener, label: &'static str, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer, permit)) => {
                    tracing::debug!(listener = label, peer = %peer, "No handler attached, closing connection");
                    drop(stream);
                    drop(permit);
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(listener = label, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
    tracing::debug!(listener = label, "Listener loop stopped");
}

/// Bind a UDP socket, mapping failures like [`Listener::bind`].
pub async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket, ListenerError> {
    let socket = UdpSocket::bind(addr).await.map_err(ListenerError::Bind)?;
    if let Ok(local) = socket.local_addr() {
        tracing::info!(address = %local, "UDP socket bound");
    }
    Ok(socket)
}

/// Receive datagrams on `socket` until `token` is cancelled.
pub async fn drain_udp(socket: UdpSocket, label: &'static str, token: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, peer)) => {
                    tracing::debug!(listener = label, peer = %peer, len, "No handler attached, discarding datagram");
                }
                Err(e) => {
                    tracing::warn!(listener = label, error = %e, "Receive failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
    tracing::debug!(listener = label, "Listener loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_limit() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 2).await.unwrap();
        assert_eq!(listener.max_connections(), 2);
        assert_eq!(listener.available_permits(), 2);

        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, peer, _permit) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());
        assert_eq!(listener.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = Listener::bind("127.0.0.1:0".parse().unwrap(), 1).await.unwrap();
        let addr = first.local_addr().unwrap();
        let err = Listener::bind(addr, 1).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind(_)));
    }

    #[tokio::test]
    async fn test_drain_stops_on_cancel() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 4).await.unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(drain_tcp(listener, "test", token.clone()));
        token.cancel();
        task.await.unwrap();
    }
}
