//! Configuration validation and translation.
//!
//! # Responsibilities
//! - Reject settings the engines cannot safely start with
//! - Turn merged settings into one [`DnsConfig`] and one [`TunnelConfig`]
//!
//! # Design Decisions
//! - Fail fast: the first violation aborts, checks run in a fixed order
//! - Encrypted DNS listeners without both address and port are disabled,
//!   not rejected
//! - Cache and TTL bounds are passed through untouched; the DNS engine owns them
//! - Translation is a pure function of [`ResolvedSettings`]

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;

use crate::config::merge::ResolvedSettings;
use crate::config::schema::Settings;
use crate::engine::dns::DnsConfig;
use crate::engine::tunnel::TunnelConfig;

/// A semantic error in the merged settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{setting}: {value:?} is not a valid IP address")]
    InvalidAddress { setting: &'static str, value: String },

    #[error("{setting} must be an {expected} address: {value}")]
    WrongFamily {
        setting: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("either dns_redirect_ipv4_to or dns_redirect_ipv6_to must be specified")]
    MissingRedirectTarget,

    #[error("{setting}: rate {value} must be a finite, non-negative number of bytes per second")]
    InvalidBandwidthRate { setting: String, value: f64 },
}

/// A validated listen address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpec {
    ip: IpAddr,
    port: u16,
}

impl AddressSpec {
    fn parse(setting: &'static str, address: &str, port: u16) -> Result<Self, ValidationError> {
        let ip = parse_ip(setting, address)?;
        Ok(Self { ip, port })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

fn parse_ip(setting: &'static str, value: &str) -> Result<IpAddr, ValidationError> {
    value
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::InvalidAddress {
            setting,
            value: value.to_string(),
        })
}

/// An optional listener is enabled only when both its address and port are set.
fn optional_listener(
    setting: &'static str,
    address: &str,
    port: u16,
) -> Result<Option<AddressSpec>, ValidationError> {
    if address.is_empty() || port == 0 {
        return Ok(None);
    }
    AddressSpec::parse(setting, address, port).map(Some)
}

fn redirect_ipv4(value: &str) -> Result<Option<Ipv4Addr>, ValidationError> {
    const SETTING: &str = "dns_redirect_ipv4_to";
    if value.is_empty() {
        return Ok(None);
    }
    match parse_ip(SETTING, value)? {
        IpAddr::V4(v4) => Ok(Some(v4)),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => Ok(Some(v4)),
            None => Err(ValidationError::WrongFamily {
                setting: SETTING,
                value: value.to_string(),
                expected: "IPv4",
            }),
        },
    }
}

fn redirect_ipv6(value: &str) -> Result<Option<Ipv6Addr>, ValidationError> {
    const SETTING: &str = "dns_redirect_ipv6_to";
    if value.is_empty() {
        return Ok(None);
    }
    match parse_ip(SETTING, value)? {
        IpAddr::V6(v6) => Ok(Some(v6)),
        IpAddr::V4(_) => Err(ValidationError::WrongFamily {
            setting: SETTING,
            value: value.to_string(),
            expected: "IPv6",
        }),
    }
}

fn check_rate(setting: String, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidBandwidthRate { setting, value })
    }
}

/// Build the DNS engine configuration.
pub fn to_dns_config(settings: &Settings) -> Result<DnsConfig, ValidationError> {
    let listen_addr = AddressSpec::parse("dns_address", &settings.dns_address, settings.dns_port)?;
    let tls_listen_addr = optional_listener("dot_address", &settings.dot_address, settings.dot_port)?;
    let https_listen_addr = optional_listener("doh_address", &settings.doh_address, settings.doh_port)?;
    let quic_listen_addr = optional_listener("doq_address", &settings.doq_address, settings.doq_port)?;

    let redirect_ipv4_to = redirect_ipv4(&settings.dns_redirect_ipv4_to)?;
    let redirect_ipv6_to = redirect_ipv6(&settings.dns_redirect_ipv6_to)?;
    if redirect_ipv4_to.is_none() && redirect_ipv6_to.is_none() {
        return Err(ValidationError::MissingRedirectTarget);
    }

    Ok(DnsConfig {
        listen_addr,
        tls_listen_addr,
        https_listen_addr,
        quic_listen_addr,
        tls_cert_file: settings.tls_cert_file.clone(),
        tls_key_file: settings.tls_key_file.clone(),
        upstream: settings.dns_upstream.clone(),
        redirect_rules: settings.dns_redirect_rules.clone(),
        drop_rules: settings.dns_drop_rules.clone(),
        redirect_ipv4_to,
        redirect_ipv6_to,
        cache_enabled: settings.dns_cache_enabled,
        cache_size_bytes: settings.dns_cache_size,
        cache_min_ttl: settings.dns_cache_min_ttl,
        cache_max_ttl: settings.dns_cache_max_ttl,
    })
}

/// Build the tunnel engine configuration.
pub fn to_tunnel_config(settings: &Settings) -> Result<TunnelConfig, ValidationError> {
    let tls_listen_addr = AddressSpec::parse("tls_address", &settings.tls_address, settings.tls_port)?;
    let http_listen_addr = AddressSpec::parse("http_address", &settings.http_address, settings.http_port)?;

    check_rate("bandwidth_rate".to_string(), settings.bandwidth_rate)?;
    for (pattern, rate) in &settings.bandwidth_rules {
        check_rate(format!("bandwidth_rules[{pattern}]"), *rate)?;
    }

    Ok(TunnelConfig {
        tls_listen_addr,
        http_listen_addr,
        forward_proxy: settings.forward_proxy.clone(),
        forward_rules: settings.forward_rules.clone(),
        block_rules: settings.block_rules.clone(),
        drop_rules: settings.drop_rules.clone(),
        bandwidth_rate: settings.bandwidth_rate,
        bandwidth_rules: settings.bandwidth_rules.clone(),
    })
}

/// Validate `resolved` and split it into the two engine configurations.
pub fn translate(resolved: &ResolvedSettings) -> Result<(DnsConfig, TunnelConfig), ValidationError> {
    let settings = resolved.settings();
    let dns = to_dns_config(settings)?;
    let tunnel = to_tunnel_config(settings)?;
    Ok((dns, tunnel))
}
