//! Engine contract and the engines shipped with the binary.
//!
//! # Data Flow
//! ```text
//! DnsConfig    → dns::DnsEngine::build    → Box<dyn Engine>
//! TunnelConfig → tunnel::TunnelEngine::build → Box<dyn Engine>
//!     → lifecycle::orchestrator (start, wait for shutdown, close)
//! ```
//!
//! # Design Decisions
//! - Each engine owns its configuration; nothing is shared after handoff
//! - `start` returns once every listener is bound; the loops run on tasks
//! - `close` cancels the loops and waits for them to finish

pub mod dns;
pub mod tunnel;

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::net::listener::{bind_udp, drain_tcp, drain_udp, Listener, ListenerError};

pub use dns::{DnsConfig, DnsEngine};
pub use tunnel::{TunnelConfig, TunnelEngine};

/// Error type for engine construction and lifecycle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine}: cannot bind {listener} listener on {addr}: {source}")]
    Bind {
        engine: &'static str,
        listener: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: engine already started")]
    AlreadyStarted(&'static str),

    #[error("{engine}: {message}")]
    Failed {
        engine: &'static str,
        message: String,
    },
}

/// A long-running network engine configured once at startup.
#[async_trait]
pub trait Engine: Send {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Bind listeners and begin serving. Returns once the engine is running.
    async fn start(&mut self) -> Result<(), EngineError>;

    /// Stop serving and release every listener.
    async fn close(&mut self) -> Result<(), EngineError>;
}

pub type BoxedEngine = Box<dyn Engine>;

/// Background loops of a started engine.
pub(crate) struct EngineTasks {
    engine: &'static str,
    token: CancellationToken,
    tasks: JoinSet<()>,
    addrs: Vec<SocketAddr>,
}

impl EngineTasks {
    pub(crate) fn new(engine: &'static str) -> Self {
        Self {
            engine,
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
            addrs: Vec::new(),
        }
    }

    /// Bind a bounded TCP listener and spawn its accept loop.
    pub(crate) async fn listen_tcp(
        &mut self,
        listener: &'static str,
        addr: SocketAddr,
        max_connections: usize,
    ) -> Result<SocketAddr, EngineError> {
        let bound = Listener::bind(addr, max_connections)
            .await
            .map_err(|e| self.bind_error(listener, addr, e))?;
        let local = bound.local_addr().unwrap_or(addr);
        let token = self.token.clone();
        self.spawn(local, drain_tcp(bound, listener, token));
        Ok(local)
    }

    /// Bind a UDP socket and spawn its receive loop.
    pub(crate) async fn listen_udp(
        &mut self,
        listener: &'static str,
        addr: SocketAddr,
    ) -> Result<SocketAddr, EngineError> {
        let socket = bind_udp(addr)
            .await
            .map_err(|e| self.bind_error(listener, addr, e))?;
        let local = socket.local_addr().unwrap_or(addr);
        let token = self.token.clone();
        self.spawn(local, drain_udp(socket, listener, token));
        Ok(local)
    }

    fn spawn<F>(&mut self, addr: SocketAddr, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::info_span!("engine", name = self.engine, %addr);
        self.addrs.push(addr);
        self.tasks.spawn(task.instrument(span));
    }

    fn bind_error(&self, listener: &'static str, addr: SocketAddr, err: ListenerError) -> EngineError {
        EngineError::Bind {
            engine: self.engine,
            listener,
            addr,
            source: err.into_io(),
        }
    }

    pub(crate) fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Cancel every loop and wait for all of them to exit.
    pub(crate) async fn shutdown(mut self) -> Result<(), EngineError> {
        self.token.cancel();

        let mut failed = None;
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    failed = Some(e.to_string());
                }
            }
        }

        match failed {
            Some(message) => Err(EngineError::Failed {
                engine: self.engine,
                message,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for EngineTasks {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
