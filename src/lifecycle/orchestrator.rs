//! Engine orchestration.
//!
//! # State Machine
//! ```text
//! Created → Starting → Running → ShuttingDown → Stopped
//!              │
//!              └── build/start failure → Stopped (error returned)
//! ```
//!
//! # Design Decisions
//! - Engines are built and started one after the other: DNS, then tunnel
//! - No partial-running state: a start failure closes what already started
//!   and returns the error
//! - Shutdown closes DNS before tunnel; a close error is logged and the
//!   other engine is still closed

use tokio::sync::watch;

use crate::engine::{BoxedEngine, DnsConfig, Engine, EngineError, TunnelConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

/// Lifecycle state of the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Starts both engines, waits for shutdown and stops them.
pub struct Orchestrator {
    state: watch::Sender<State>,
}

impl Orchestrator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(State::Created);
        Self { state }
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    fn transition(&self, next: State) {
        let prev = self.state.send_replace(next);
        tracing::debug!(from = ?prev, to = ?next, "Lifecycle transition");
    }

    /// Run the proxy until `shutdown` is triggered.
    ///
    /// Returns an error only when an engine cannot be built or started; in
    /// that case `Running` is never reached.
    pub async fn run<D, T>(
        &self,
        dns_config: DnsConfig,
        tunnel_config: TunnelConfig,
        build_dns: D,
        build_tunnel: T,
        shutdown: Shutdown,
    ) -> Result<(), EngineError>
    where
        D: FnOnce(DnsConfig) -> Result<BoxedEngine, EngineError>,
        T: FnOnce(TunnelConfig) -> Result<BoxedEngine, EngineError>,
    {
        self.transition(State::Starting);

        let mut dns = match start(build_dns(dns_config)).await {
            Ok(engine) => engine,
            Err(e) => {
                self.transition(State::Stopped);
                return Err(e);
            }
        };

        let mut tunnel = match start(build_tunnel(tunnel_config)).await {
            Ok(engine) => engine,
            Err(e) => {
                close(dns.as_mut()).await;
                self.transition(State::Stopped);
                return Err(e);
            }
        };

        self.transition(State::Running);
        tracing::info!("Proxy running");

        shutdown.wait().await;

        self.transition(State::ShuttingDown);
        tracing::info!("Stopping proxy");

        close(dns.as_mut()).await;
        close(tunnel.as_mut()).await;

        self.transition(State::Stopped);
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

async fn start(built: Result<BoxedEngine, EngineError>) -> Result<BoxedEngine, EngineError> {
    let mut engine = built?;
    engine.start().await?;
    metrics::set_engine_up(engine.name(), true);
    tracing::info!(engine = engine.name(), "Engine started");
    Ok(engine)
}

async fn close(engine: &mut dyn Engine) {
    let name = engine.name();
    if let Err(e) = engine.close().await {
        tracing::warn!(engine = name, error = %e, "Engine did not close cleanly");
    }
    metrics::set_engine_up(name, false);
}
