//! Command-line interface.
//!
//! Every setting has a long flag; flag names are listed in
//! [`crate::config::schema::SETTINGS`]. A flag left off the command line
//! stays `None` and never overrides the YAML file or the defaults.
//!
//! Boolean flags take an optional `=value`: `--verbose` means true and
//! `--dns-cache-enabled=false` turns caching off. List flags are
//! repeatable and replace the whole list from lower layers.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;

use crate::config::schema::SettingsLayer;

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(
    name = "redirect-proxy",
    about = "DNS-rewriting resolver and SNI/HTTP tunnel",
    disable_version_flag = true
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Print the version and exit
    #[arg(long)]
    pub version: bool,

    /// IP address the DNS server listens on
    #[arg(long = "dns-address", value_name = "IP")]
    pub dns_address: Option<String>,

    /// Port the DNS server listens on
    #[arg(long = "dns-port", value_name = "PORT")]
    pub dns_port: Option<u16>,

    /// Upstream resolver for queries that are not rewritten
    #[arg(long = "dns-upstream", value_name = "ADDR")]
    pub dns_upstream: Option<String>,

    /// IPv4 address A answers are rewritten to
    #[arg(long = "dns-redirect-ipv4-to", value_name = "IP")]
    pub dns_redirect_ipv4_to: Option<String>,

    /// IPv6 address AAAA answers are rewritten to
    #[arg(long = "dns-redirect-ipv6-to", value_name = "IP")]
    pub dns_redirect_ipv6_to: Option<String>,

    /// Wildcard of domains redirected to the tunnel (repeatable)
    #[arg(long = "dns-redirect-rule", value_name = "PATTERN")]
    pub dns_redirect_rules: Option<Vec<String>>,

    /// File with redirect wildcards, one per line
    #[arg(long = "dns-redirect-rules-file", value_name = "PATH")]
    pub dns_redirect_rules_file: Option<String>,

    /// Wildcard of domains whose queries are dropped (repeatable)
    #[arg(long = "dns-drop-rule", value_name = "PATTERN")]
    pub dns_drop_rules: Option<Vec<String>>,

    /// Enable DNS response caching
    #[arg(
        long = "dns-cache-enabled",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub dns_cache_enabled: Option<bool>,

    /// DNS cache size in bytes
    #[arg(long = "dns-cache-size", value_name = "BYTES")]
    pub dns_cache_size: Option<usize>,

    /// Minimum TTL of cached entries in seconds
    #[arg(long = "dns-cache-min-ttl", value_name = "SECS")]
    pub dns_cache_min_ttl: Option<u32>,

    /// Maximum TTL of cached entries in seconds
    #[arg(long = "dns-cache-max-ttl", value_name = "SECS")]
    pub dns_cache_max_ttl: Option<u32>,

    /// IP address of the plain HTTP tunnel listener
    #[arg(long = "http-address", value_name = "IP")]
    pub http_address: Option<String>,

    /// Port of the plain HTTP tunnel listener
    #[arg(long = "http-port", value_name = "PORT")]
    pub http_port: Option<u16>,

    /// IP address of the TLS tunnel listener
    #[arg(long = "tls-address", value_name = "IP")]
    pub tls_address: Option<String>,

    /// Port of the TLS tunnel listener
    #[arg(long = "tls-port", value_name = "PORT")]
    pub tls_port: Option<u16>,

    /// IP address of the DNS-over-TLS listener
    #[arg(long = "dot-address", value_name = "IP")]
    pub dot_address: Option<String>,

    /// Port of the DNS-over-TLS listener
    #[arg(long = "dot-port", value_name = "PORT")]
    pub dot_port: Option<u16>,

    /// IP address of the DNS-over-HTTPS listener
    #[arg(long = "doh-address", value_name = "IP")]
    pub doh_address: Option<String>,

    /// Port of the DNS-over-HTTPS listener
    #[arg(long = "doh-port", value_name = "PORT")]
    pub doh_port: Option<u16>,

    /// IP address of the DNS-over-QUIC listener
    #[arg(long = "doq-address", value_name = "IP")]
    pub doq_address: Option<String>,

    /// Port of the DNS-over-QUIC listener
    #[arg(long = "doq-port", value_name = "PORT")]
    pub doq_port: Option<u16>,

    /// TLS certificate for encrypted DNS
    #[arg(long = "tls-cert-file", value_name = "PATH")]
    pub tls_cert_file: Option<String>,

    /// TLS private key for encrypted DNS
    #[arg(long = "tls-key-file", value_name = "PATH")]
    pub tls_key_file: Option<String>,

    /// Shared rate limit in bytes per second (0 = unlimited)
    #[arg(long = "bandwidth-rate", value_name = "BYTES")]
    pub bandwidth_rate: Option<f64>,

    /// Per-wildcard rate as PATTERN:RATE (repeatable)
    #[arg(long = "bandwidth-rule", value_name = "PATTERN:RATE", value_parser = parse_bandwidth_rule)]
    pub bandwidth_rules: Option<Vec<(String, f64)>>,

    /// Proxy URL matching connections are forwarded to
    #[arg(long = "forward-proxy", value_name = "URL")]
    pub forward_proxy: Option<String>,

    /// Wildcard of connections sent through the forward proxy (repeatable)
    #[arg(long = "forward-rule", value_name = "PATTERN")]
    pub forward_rules: Option<Vec<String>>,

    /// File with forward wildcards, one per line
    #[arg(long = "forward-rules-file", value_name = "PATH")]
    pub forward_rules_file: Option<String>,

    /// Wildcard of connections that are rejected (repeatable)
    #[arg(long = "block-rule", value_name = "PATTERN")]
    pub block_rules: Option<Vec<String>>,

    /// File with block wildcards, one per line
    #[arg(long = "block-rules-file", value_name = "PATH")]
    pub block_rules_file: Option<String>,

    /// Wildcard of connections that are withheld (repeatable)
    #[arg(long = "drop-rule", value_name = "PATTERN")]
    pub drop_rules: Option<Vec<String>>,

    /// File with drop wildcards, one per line
    #[arg(long = "drop-rules-file", value_name = "PATH")]
    pub drop_rules_file: Option<String>,

    /// Write DEBUG-level logs
    #[arg(
        short = 'v',
        long = "verbose",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub verbose: Option<bool>,

    /// Log file path; stdout when unset
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<String>,
}

impl Cli {
    /// Convert the flags into a settings layer. Flags that were not given
    /// stay `None`.
    pub fn into_layer(self) -> SettingsLayer {
        SettingsLayer {
            dns_address: self.dns_address,
            dns_port: self.dns_port,
            dns_upstream: self.dns_upstream,
            dns_redirect_ipv4_to: self.dns_redirect_ipv4_to,
            dns_redirect_ipv6_to: self.dns_redirect_ipv6_to,
            dns_redirect_rules: self.dns_redirect_rules,
            dns_redirect_rules_file: self.dns_redirect_rules_file,
            dns_drop_rules: self.dns_drop_rules,
            dns_cache_enabled: self.dns_cache_enabled,
            dns_cache_size: self.dns_cache_size,
            dns_cache_min_ttl: self.dns_cache_min_ttl,
            dns_cache_max_ttl: self.dns_cache_max_ttl,
            http_address: self.http_address,
            http_port: self.http_port,
            tls_address: self.tls_address,
            tls_port: self.tls_port,
            dot_address: self.dot_address,
            dot_port: self.dot_port,
            doh_address: self.doh_address,
            doh_port: self.doh_port,
            doq_address: self.doq_address,
            doq_port: self.doq_port,
            tls_cert_file: self.tls_cert_file,
            tls_key_file: self.tls_key_file,
            bandwidth_rate: self.bandwidth_rate,
            bandwidth_rules: self
                .bandwidth_rules
                .map(|rules| rules.into_iter().collect()),
            forward_proxy: self.forward_proxy,
            forward_rules: self.forward_rules,
            forward_rules_file: self.forward_rules_file,
            block_rules: self.block_rules,
            block_rules_file: self.block_rules_file,
            drop_rules: self.drop_rules,
            drop_rules_file: self.drop_rules_file,
            verbose: self.verbose,
            output: self.output,
        }
    }
}

/// Parse `PATTERN:RATE`. The rate follows the last colon.
fn parse_bandwidth_rule(raw: &str) -> Result<(String, f64), String> {
    let (pattern, rate) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATTERN:RATE, got '{raw}'"))?;
    if pattern.is_empty() {
        return Err(format!("empty pattern in '{raw}'"));
    }
    let rate = rate
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid rate in '{raw}': {e}"))?;
    Ok((pattern.to_string(), rate))
}

/// Whether `--version` appears anywhere in `args`.
///
/// Checked before full parsing so that the version prints even when other
/// flags are malformed.
pub fn version_requested<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().any(|arg| {
        let arg: OsString = arg.into();
        arg == "--version"
    })
}

pub fn version_string() -> String {
    format!("redirect-proxy version: {}", env!("CARGO_PKG_VERSION"))
}

/// Process exit code for a flag parsing failure. Help output is not an error.
pub fn parse_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SETTINGS;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["redirect-proxy"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_every_setting_has_a_flag() {
        let command = Cli::command();
        for d in SETTINGS {
            assert!(
                command.get_arguments().any(|a| a.get_long() == Some(d.flag)),
                "missing --{}",
                d.flag
            );
        }
    }

    #[test]
    fn test_unset_flags_stay_absent() {
        let cli = parse(&[]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.into_layer(), SettingsLayer::default());
    }

    #[test]
    fn test_boolean_flags() {
        let layer = parse(&["--verbose", "--dns-cache-enabled=false"]).into_layer();
        assert_eq!(layer.verbose, Some(true));
        assert_eq!(layer.dns_cache_enabled, Some(false));
    }

    #[test]
    fn test_repeated_list_flags() {
        let layer = parse(&["--block-rule", "a.com", "--block-rule=*.b.com"]).into_layer();
        assert_eq!(
            layer.block_rules,
            Some(vec!["a.com".to_string(), "*.b.com".to_string()])
        );
        assert_eq!(layer.drop_rules, None);
    }

    #[test]
    fn test_bandwidth_rule_flag() {
        let layer = parse(&["--bandwidth-rule", "*.video.com:1024.5"]).into_layer();
        let rules = layer.bandwidth_rules.unwrap();
        assert_eq!(rules.get("*.video.com"), Some(&1024.5));

        assert!(parse_bandwidth_rule("no-rate").is_err());
        assert!(parse_bandwidth_rule(":10").is_err());
        assert!(parse_bandwidth_rule("a.com:fast").is_err());
    }

    #[test]
    fn test_invalid_port_is_a_parse_error() {
        let err = Cli::try_parse_from(["redirect-proxy", "--dns-port", "70000"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 1);
    }

    #[test]
    fn test_help_exits_successfully() {
        let err = Cli::try_parse_from(["redirect-proxy", "--help"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 0);
    }

    #[test]
    fn test_version_prescan() {
        assert!(version_requested(["redirect-proxy", "--dns-port=x", "--version"]));
        assert!(!version_requested(["redirect-proxy", "--verbose"]));
        assert!(version_string().starts_with("redirect-proxy version: "));
    }
}
