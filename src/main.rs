//! redirect-proxy
//!
//! Answers DNS queries for selected domains with the proxy's own address and
//! tunnels the resulting TLS and HTTP connections.
//!
//! # Architecture Overview
//!
//! ```text
//!   defaults ─┐
//!   YAML ─────┼─▶ ResolvedSettings ─▶ translate ─┬─▶ DnsConfig ────▶ DNS engine
//!   flags ────┘                                  └─▶ TunnelConfig ─▶ tunnel engine
//!                                                         │
//!                              SIGINT/SIGTERM ─▶ Shutdown ─┘
//! ```

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;

use redirect_proxy::cli::{self, Cli};
use redirect_proxy::lifecycle::startup;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();

    if cli::version_requested(&args) {
        println!("{}", cli::version_string());
        return ExitCode::SUCCESS;
    }

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(cli::parse_exit_code(&e));
        }
    };

    match startup::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("redirect-proxy: {e}");
            ExitCode::FAILURE
        }
    }
}
