//! Tunnel engine configuration and lifecycle.
//!
//! The tunnel accepts TLS and plain HTTP connections addressed to redirected
//! domains. Routing by SNI or `Host`, forwarding, blocking, dropping and rate
//! limiting are applied by the connection handler according to
//! [`TunnelConfig`].

use std::collections::BTreeMap;
use std::net::SocketAddr;

use async_trait::async_trait;

use crate::config::merge::redact_url;
use crate::config::validation::AddressSpec;
use crate::engine::{BoxedEngine, Engine, EngineError, EngineTasks};

const ENGINE: &str = "tunnel";

/// Concurrent connections allowed per tunnel listener.
const MAX_CONNECTIONS: usize = 10_000;

/// Tunnel engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    /// Listener for TLS connections.
    pub tls_listen_addr: AddressSpec,

    /// Listener for plain HTTP connections.
    pub http_listen_addr: AddressSpec,

    /// Proxy URL for connections matching `forward_rules`. Empty disables forwarding.
    pub forward_proxy: String,

    /// Wildcards of connections sent through the forward proxy. When empty and
    /// a forward proxy is set, every connection is forwarded.
    pub forward_rules: Vec<String>,

    /// Wildcards of connections that are rejected.
    pub block_rules: Vec<String>,

    /// Wildcards of connections that are held open and withheld.
    pub drop_rules: Vec<String>,

    /// Shared rate limit in bytes per second; zero means unlimited.
    pub bandwidth_rate: f64,

    /// Per-wildcard rate overrides, taking precedence over `bandwidth_rate`.
    pub bandwidth_rules: BTreeMap<String, f64>,
}

/// Owns the tunnel listeners described by a [`TunnelConfig`].
pub struct TunnelEngine {
    config: TunnelConfig,
    tasks: Option<EngineTasks>,
}

impl TunnelEngine {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            tasks: None,
        }
    }

    /// Builder used by the orchestrator.
    pub fn build(config: TunnelConfig) -> Result<BoxedEngine, EngineError> {
        Ok(Box::new(Self::new(config)))
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Addresses actually bound, once started.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.tasks
            .as_ref()
            .map(|t| t.local_addrs().to_vec())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Engine for TunnelEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        if self.tasks.is_some() {
            return Err(EngineError::AlreadyStarted(ENGINE));
        }

        let cfg = &self.config;
        tracing::info!(
            tls = %cfg.tls_listen_addr,
            http = %cfg.http_listen_addr,
            forward_proxy = %redact_url(&cfg.forward_proxy),
            forward_rules = cfg.forward_rules.len(),
            block_rules = cfg.block_rules.len(),
            drop_rules = cfg.drop_rules.len(),
            bandwidth_rate = cfg.bandwidth_rate,
            bandwidth_rules = cfg.bandwidth_rules.len(),
            "Starting tunnel engine"
        );

        let mut tasks = EngineTasks::new(ENGINE);
        tasks
            .listen_tcp("tls", cfg.tls_listen_addr.socket_addr(), MAX_CONNECTIONS)
            .await?;
        tasks
            .listen_tcp("http", cfg.http_listen_addr.socket_addr(), MAX_CONNECTIONS)
            .await?;

        self.tasks = Some(tasks);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await?;
            tracing::info!("Tunnel engine stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Settings;
    use crate::config::validation::to_tunnel_config;

    fn loopback_config() -> TunnelConfig {
        let settings = Settings {
            tls_address: "127.0.0.1".into(),
            tls_port: 0,
            http_address: "127.0.0.1".into(),
            http_port: 0,
            ..Settings::default()
        };
        to_tunnel_config(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_start_and_close() {
        let mut engine = TunnelEngine::new(loopback_config());
        engine.start().await.unwrap();
        assert_eq!(engine.local_addrs().len(), 2);

        let http = engine.local_addrs()[1];
        assert!(tokio::net::TcpStream::connect(http).await.is_ok());

        engine.close().await.unwrap();
        assert!(engine.local_addrs().is_empty());
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = Settings {
            tls_address: "127.0.0.1".into(),
            tls_port: taken.local_addr().unwrap().port(),
            http_address: "127.0.0.1".into(),
            http_port: 0,
            ..Settings::default()
        };

        let mut engine = TunnelEngine::new(to_tunnel_config(&settings).unwrap());
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::Bind { engine: "tunnel", listener: "tls", .. }));
        assert!(engine.local_addrs().is_empty());
    }
}
