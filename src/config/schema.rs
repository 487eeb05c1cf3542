//! Configuration schema definitions.
//!
//! This module defines every recognized setting, its built-in default and the
//! descriptor table the merger and the startup log consult. Field names are
//! the YAML keys; long CLI flags are listed in [`SETTINGS`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// DNS cache size used when nothing else is configured (64 MiB).
pub const DEFAULT_CACHE_SIZE_BYTES: usize = 64 * 1024 * 1024;

/// Fully merged settings for both engines.
///
/// `Settings::default()` is the compiled-in defaults layer: pure, deterministic
/// and infallible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// IP address the DNS server listens on.
    pub dns_address: String,

    /// Port the DNS server listens on.
    pub dns_port: u16,

    /// Upstream resolver for queries that are not rewritten.
    pub dns_upstream: String,

    /// IPv4 address A answers are rewritten to.
    pub dns_redirect_ipv4_to: String,

    /// IPv6 address AAAA answers are rewritten to.
    pub dns_redirect_ipv6_to: String,

    /// Wildcards selecting the domains whose answers are rewritten.
    pub dns_redirect_rules: Vec<String>,

    /// Path to a file with additional redirect wildcards.
    pub dns_redirect_rules_file: String,

    /// Wildcards selecting DNS queries that get no answer at all.
    pub dns_drop_rules: Vec<String>,

    /// Enables the DNS response cache.
    pub dns_cache_enabled: bool,

    /// DNS cache size in bytes.
    pub dns_cache_size: usize,

    /// Minimum TTL of cached entries in seconds.
    pub dns_cache_min_ttl: u32,

    /// Maximum TTL of cached entries in seconds.
    pub dns_cache_max_ttl: u32,

    /// IP address the tunnel listens on for plain HTTP.
    pub http_address: String,

    /// Port the tunnel listens on for plain HTTP.
    pub http_port: u16,

    /// IP address the tunnel listens on for TLS.
    pub tls_address: String,

    /// Port the tunnel listens on for TLS.
    pub tls_port: u16,

    /// DNS-over-TLS listen address.
    pub dot_address: String,

    /// DNS-over-TLS listen port.
    pub dot_port: u16,

    /// DNS-over-HTTPS listen address.
    pub doh_address: String,

    /// DNS-over-HTTPS listen port.
    pub doh_port: u16,

    /// DNS-over-QUIC listen address.
    pub doq_address: String,

    /// DNS-over-QUIC listen port.
    pub doq_port: u16,

    /// Certificate (PEM) for the encrypted DNS listeners.
    pub tls_cert_file: String,

    /// Private key (PEM) for the encrypted DNS listeners.
    pub tls_key_file: String,

    /// Global rate limit in bytes per second shared by all connections.
    /// Zero means unlimited.
    pub bandwidth_rate: f64,

    /// Per-wildcard rates overriding `bandwidth_rate`.
    pub bandwidth_rules: BTreeMap<String, f64>,

    /// SOCKS/HTTP/HTTPS proxy URL matching connections are forwarded to.
    pub forward_proxy: String,

    /// Wildcards selecting connections sent through `forward_proxy`.
    pub forward_rules: Vec<String>,

    /// Path to a file with additional forward wildcards.
    pub forward_rules_file: String,

    /// Wildcards selecting connections that are rejected.
    pub block_rules: Vec<String>,

    /// Path to a file with additional block wildcards.
    pub block_rules_file: String,

    /// Wildcards selecting connections that are held open and withheld.
    pub drop_rules: Vec<String>,

    /// Path to a file with additional drop wildcards.
    pub drop_rules_file: String,

    /// Write DEBUG-level logs.
    pub verbose: bool,

    /// Log file path; stdout when empty.
    pub output: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dns_address: "0.0.0.0".to_string(),
            dns_port: 53,
            dns_upstream: "8.8.8.8".to_string(),
            dns_redirect_ipv4_to: String::new(),
            dns_redirect_ipv6_to: String::new(),
            dns_redirect_rules: vec!["*".to_string()],
            dns_redirect_rules_file: String::new(),
            dns_drop_rules: Vec::new(),
            dns_cache_enabled: true,
            dns_cache_size: DEFAULT_CACHE_SIZE_BYTES,
            dns_cache_min_ttl: 60,
            dns_cache_max_ttl: 3600,
            http_address: "0.0.0.0".to_string(),
            http_port: 80,
            tls_address: "0.0.0.0".to_string(),
            tls_port: 443,
            dot_address: "0.0.0.0".to_string(),
            dot_port: 853,
            doh_address: "0.0.0.0".to_string(),
            doh_port: 8443,
            doq_address: "0.0.0.0".to_string(),
            doq_port: 8853,
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            bandwidth_rate: 0.0,
            bandwidth_rules: BTreeMap::new(),
            forward_proxy: String::new(),
            forward_rules: Vec::new(),
            forward_rules_file: String::new(),
            block_rules: Vec::new(),
            block_rules_file: String::new(),
            drop_rules: Vec::new(),
            drop_rules_file: String::new(),
            verbose: false,
            output: String::new(),
        }
    }
}

/// A partial set of settings supplied by one source (YAML file or flags).
///
/// `None` means "not supplied by this source" and never overrides a lower
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsLayer {
    pub dns_address: Option<String>,
    pub dns_port: Option<u16>,
    pub dns_upstream: Option<String>,
    pub dns_redirect_ipv4_to: Option<String>,
    pub dns_redirect_ipv6_to: Option<String>,
    pub dns_redirect_rules: Option<Vec<String>>,
    pub dns_redirect_rules_file: Option<String>,
    pub dns_drop_rules: Option<Vec<String>>,
    pub dns_cache_enabled: Option<bool>,
    pub dns_cache_size: Option<usize>,
    pub dns_cache_min_ttl: Option<u32>,
    pub dns_cache_max_ttl: Option<u32>,
    pub http_address: Option<String>,
    pub http_port: Option<u16>,
    pub tls_address: Option<String>,
    pub tls_port: Option<u16>,
    pub dot_address: Option<String>,
    pub dot_port: Option<u16>,
    pub doh_address: Option<String>,
    pub doh_port: Option<u16>,
    pub doq_address: Option<String>,
    pub doq_port: Option<u16>,
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,
    pub bandwidth_rate: Option<f64>,
    pub bandwidth_rules: Option<BTreeMap<String, f64>>,
    pub forward_proxy: Option<String>,
    pub forward_rules: Option<Vec<String>>,
    pub forward_rules_file: Option<String>,
    pub block_rules: Option<Vec<String>>,
    pub block_rules_file: Option<String>,
    pub drop_rules: Option<Vec<String>>,
    pub drop_rules_file: Option<String>,
    pub verbose: Option<bool>,
    pub output: Option<String>,
}

/// Where the effective value of a setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Compiled-in default.
    Default,
    /// YAML configuration file.
    File,
    /// Command-line flag.
    Flag,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Default => write!(f, "default"),
            Origin::File => write!(f, "file"),
            Origin::Flag => write!(f, "flag"),
        }
    }
}

/// Value type of a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    String,
    Integer,
    Boolean,
    Float,
    StringList,
    RateMap,
}

/// Static description of one recognized setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDescriptor {
    /// YAML key, also the field name in [`Settings`].
    pub name: &'static str,
    /// Long command-line flag, without the leading dashes.
    pub flag: &'static str,
    pub kind: SettingKind,
    pub description: &'static str,
}

const fn setting(
    name: &'static str,
    flag: &'static str,
    kind: SettingKind,
    description: &'static str,
) -> SettingDescriptor {
    SettingDescriptor {
        name,
        flag,
        kind,
        description,
    }
}

/// Every recognized setting, in the order they are documented.
pub const SETTINGS: &[SettingDescriptor] = &[
    setting("dns_address", "dns-address", SettingKind::String, "IP address the DNS server listens on"),
    setting("dns_port", "dns-port", SettingKind::Integer, "Port the DNS server listens on"),
    setting("dns_upstream", "dns-upstream", SettingKind::String, "Upstream resolver for queries that are not rewritten"),
    setting("dns_redirect_ipv4_to", "dns-redirect-ipv4-to", SettingKind::String, "IPv4 address A answers are rewritten to"),
    setting("dns_redirect_ipv6_to", "dns-redirect-ipv6-to", SettingKind::String, "IPv6 address AAAA answers are rewritten to"),
    setting("dns_redirect_rules", "dns-redirect-rule", SettingKind::StringList, "Wildcard of domains redirected to the tunnel"),
    setting("dns_redirect_rules_file", "dns-redirect-rules-file", SettingKind::String, "File with redirect wildcards, one per line"),
    setting("dns_drop_rules", "dns-drop-rule", SettingKind::StringList, "Wildcard of domains whose queries are dropped"),
    setting("dns_cache_enabled", "dns-cache-enabled", SettingKind::Boolean, "Enable DNS response caching"),
    setting("dns_cache_size", "dns-cache-size", SettingKind::Integer, "DNS cache size in bytes"),
    setting("dns_cache_min_ttl", "dns-cache-min-ttl", SettingKind::Integer, "Minimum TTL of cached entries in seconds"),
    setting("dns_cache_max_ttl", "dns-cache-max-ttl", SettingKind::Integer, "Maximum TTL of cached entries in seconds"),
    setting("http_address", "http-address", SettingKind::String, "IP address of the plain HTTP tunnel listener"),
    setting("http_port", "http-port", SettingKind::Integer, "Port of the plain HTTP tunnel listener"),
    setting("tls_address", "tls-address", SettingKind::String, "IP address of the TLS tunnel listener"),
    setting("tls_port", "tls-port", SettingKind::Integer, "Port of the TLS tunnel listener"),
    setting("dot_address", "dot-address", SettingKind::String, "IP address of the DNS-over-TLS listener"),
    setting("dot_port", "dot-port", SettingKind::Integer, "Port of the DNS-over-TLS listener"),
    setting("doh_address", "doh-address", SettingKind::String, "IP address of the DNS-over-HTTPS listener"),
    setting("doh_port", "doh-port", SettingKind::Integer, "Port of the DNS-over-HTTPS listener"),
    setting("doq_address", "doq-address", SettingKind::String, "IP address of the DNS-over-QUIC listener"),
    setting("doq_port", "doq-port", SettingKind::Integer, "Port of the DNS-over-QUIC listener"),
    setting("tls_cert_file", "tls-cert-file", SettingKind::String, "TLS certificate for encrypted DNS"),
    setting("tls_key_file", "tls-key-file", SettingKind::String, "TLS private key for encrypted DNS"),
    setting("bandwidth_rate", "bandwidth-rate", SettingKind::Float, "Shared rate limit in bytes per second"),
    setting("bandwidth_rules", "bandwidth-rule", SettingKind::RateMap, "Per-wildcard rate as PATTERN:RATE"),
    setting("forward_proxy", "forward-proxy", SettingKind::String, "Proxy URL matching connections are forwarded to"),
    setting("forward_rules", "forward-rule", SettingKind::StringList, "Wildcard of connections sent through the forward proxy"),
    setting("forward_rules_file", "forward-rules-file", SettingKind::String, "File with forward wildcards, one per line"),
    setting("block_rules", "block-rule", SettingKind::StringList, "Wildcard of connections that are rejected"),
    setting("block_rules_file", "block-rules-file", SettingKind::String, "File with block wildcards, one per line"),
    setting("drop_rules", "drop-rule", SettingKind::StringList, "Wildcard of connections that are withheld"),
    setting("drop_rules_file", "drop-rules-file", SettingKind::String, "File with drop wildcards, one per line"),
    setting("verbose", "verbose", SettingKind::Boolean, "Write DEBUG-level logs"),
    setting("output", "output", SettingKind::String, "Log file path; stdout when unset"),
];

/// Looks up a descriptor by YAML key.
pub fn descriptor(name: &str) -> Option<&'static SettingDescriptor> {
    SETTINGS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table_matches_settings_fields() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        let fields = value.as_object().unwrap();

        assert_eq!(fields.len(), SETTINGS.len());
        for d in SETTINGS {
            assert!(fields.contains_key(d.name), "no field for {}", d.name);
        }
    }

    #[test]
    fn test_descriptor_kinds_match_default_values() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        for d in SETTINGS {
            let v = &value[d.name];
            let ok = match d.kind {
                SettingKind::String => v.is_string(),
                SettingKind::Integer => v.is_u64(),
                SettingKind::Boolean => v.is_boolean(),
                SettingKind::Float => v.is_f64(),
                SettingKind::StringList => v.is_array(),
                SettingKind::RateMap => v.is_object(),
            };
            assert!(ok, "{} is not a {:?}", d.name, d.kind);
        }
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.dns_port, 53);
        assert_eq!(s.dns_upstream, "8.8.8.8");
        assert_eq!(s.dns_redirect_rules, vec!["*"]);
        assert!(s.dns_cache_enabled);
        assert_eq!(s.dns_cache_size, 64 * 1024 * 1024);
        assert_eq!((s.dns_cache_min_ttl, s.dns_cache_max_ttl), (60, 3600));
        assert_eq!((s.tls_port, s.http_port), (443, 80));
        assert_eq!((s.dot_port, s.doh_port, s.doq_port), (853, 8443, 8853));
        assert!(s.dns_redirect_ipv4_to.is_empty());
        assert_eq!(Settings::default(), s);
    }

    #[test]
    fn test_descriptor_lookup() {
        assert_eq!(descriptor("dns_port").unwrap().flag, "dns-port");
        assert!(descriptor("listener").is_none());
    }
}
