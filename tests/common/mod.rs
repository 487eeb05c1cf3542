//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use clap::Parser;
use tempfile::{NamedTempFile, TempDir};

use redirect_proxy::cli::Cli;

/// Write `content` to a fresh temporary file that lives as long as the handle.
pub fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Write `content` to `name` inside `dir` and return the full path.
pub fn write_in(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

/// Parse flags as if passed on the command line with `config` as the YAML file.
pub fn cli_with(config: &Path, flags: &[&str]) -> Cli {
    let mut argv = vec![
        "redirect-proxy".to_string(),
        "--config".to_string(),
        config.to_string_lossy().into_owned(),
    ];
    argv.extend(flags.iter().map(|f| f.to_string()));
    Cli::try_parse_from(argv).unwrap()
}

/// Flags that put the DNS and tunnel listeners on ephemeral loopback ports.
/// Port zero disables the encrypted DNS listeners.
pub const LOOPBACK_FLAGS: &[&str] = &[
    "--dns-address=127.0.0.1",
    "--dns-port=0",
    "--dot-port=0",
    "--doh-port=0",
    "--doq-port=0",
    "--tls-address=127.0.0.1",
    "--tls-port=0",
    "--http-address=127.0.0.1",
    "--http-port=0",
    "--dns-redirect-ipv4-to=127.0.0.1",
];
