//! DNS engine configuration and lifecycle.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;

use crate::config::validation::AddressSpec;
use crate::engine::{BoxedEngine, Engine, EngineError, EngineTasks};

const ENGINE: &str = "dns";

/// Concurrent TCP connections allowed per DNS listener.
const MAX_TCP_CONNECTIONS: usize = 1024;

/// DNS engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsConfig {
    /// Plain DNS listener (UDP and TCP).
    pub listen_addr: AddressSpec,

    /// DNS-over-TLS listener; `None` when disabled.
    pub tls_listen_addr: Option<AddressSpec>,

    /// DNS-over-HTTPS listener; `None` when disabled.
    pub https_listen_addr: Option<AddressSpec>,

    /// DNS-over-QUIC listener; `None` when disabled.
    pub quic_listen_addr: Option<AddressSpec>,

    /// Certificate for the encrypted listeners. May be empty.
    pub tls_cert_file: String,

    /// Private key for the encrypted listeners. May be empty.
    pub tls_key_file: String,

    /// Resolver that receives queries which are not rewritten.
    pub upstream: String,

    /// Wildcards of domains whose answers are rewritten.
    pub redirect_rules: Vec<String>,

    /// Wildcards of domains whose queries get no answer.
    pub drop_rules: Vec<String>,

    /// Target of rewritten A answers.
    pub redirect_ipv4_to: Option<Ipv4Addr>,

    /// Target of rewritten AAAA answers.
    pub redirect_ipv6_to: Option<Ipv6Addr>,

    pub cache_enabled: bool,
    pub cache_size_bytes: usize,
    pub cache_min_ttl: u32,
    pub cache_max_ttl: u32,
}

/// Owns the DNS listeners described by a [`DnsConfig`].
pub struct DnsEngine {
    config: DnsConfig,
    tasks: Option<EngineTasks>,
}

impl DnsEngine {
    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            tasks: None,
        }
    }

    /// Builder used by the orchestrator.
    pub fn build(config: DnsConfig) -> Result<BoxedEngine, EngineError> {
        Ok(Box::new(Self::new(config)))
    }

    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Addresses actually bound, once started.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.tasks
            .as_ref()
            .map(|t| t.local_addrs().to_vec())
            .unwrap_or_default()
    }

    async fn bind_all(&self) -> Result<EngineTasks, EngineError> {
        let mut tasks = EngineTasks::new(ENGINE);
        let cfg = &self.config;

        let addr = cfg.listen_addr.socket_addr();
        let udp = tasks.listen_udp("udp", addr).await?;
        // TCP shares the UDP port, which matters when the port was ephemeral.
        tasks
            .listen_tcp("tcp", SocketAddr::new(addr.ip(), udp.port()), MAX_TCP_CONNECTIONS)
            .await?;

        if let Some(listener) = cfg.tls_listen_addr {
            tasks.listen_tcp("dot", listener.socket_addr(), MAX_TCP_CONNECTIONS).await?;
        }
        if let Some(listener) = cfg.https_listen_addr {
            tasks.listen_tcp("doh", listener.socket_addr(), MAX_TCP_CONNECTIONS).await?;
        }
        if let Some(listener) = cfg.quic_listen_addr {
            tasks.listen_udp("doq", listener.socket_addr()).await?;
        }

        Ok(tasks)
    }
}

#[async_trait]
impl Engine for DnsEngine {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        if self.tasks.is_some() {
            return Err(EngineError::AlreadyStarted(ENGINE));
        }

        let cfg = &self.config;
        tracing::info!(
            listen = %cfg.listen_addr,
            dot = ?cfg.tls_listen_addr.map(|a| a.to_string()),
            doh = ?cfg.https_listen_addr.map(|a| a.to_string()),
            doq = ?cfg.quic_listen_addr.map(|a| a.to_string()),
            upstream = %cfg.upstream,
            redirect_rules = cfg.redirect_rules.len(),
            drop_rules = cfg.drop_rules.len(),
            cache_enabled = cfg.cache_enabled,
            "Starting DNS engine"
        );

        // A failed bind drops the partial task set, which cancels its loops.
        self.tasks = Some(self.bind_all().await?);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        match self.tasks.take() {
            Some(tasks) => {
                tasks.shutdown().await?;
                tracing::info!("DNS engine stopped");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
