//! Configuration bootstrap and lifecycle for a DNS-rewriting resolver paired
//! with an SNI/HTTP tunnel.

pub mod cli;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use cli::Cli;
pub use config::{ResolvedSettings, Settings};
pub use engine::{DnsConfig, Engine, TunnelConfig};
pub use lifecycle::Shutdown;
