//! addrcheck - estimate whether email addresses will accept mail.
//! This is the binary executable of addrcheck-core.

#![warn(clippy::all, clippy::pedantic)]

use addrcheck_core::{Client, Config};
use clap::Parser;
use std::io::{self, BufRead};
use tracing_subscriber::EnvFilter;

/// Verify whether email addresses are likely to accept mail, without
/// sending any.
#[derive(Debug, Parser)]
struct Cli {
    /// Addresses to verify. If none are given, addresses are read one per
    /// line from stdin.
    addresses: Vec<String>,

    /// Hostname to present in `HELO`/`EHLO`, overriding `ADDRCHECK_SMTP_HELO_DOMAIN`.
    #[arg(long)]
    helo_domain: Option<String>,

    /// Base URL of the disposable-domain blocklist backend.
    #[arg(long)]
    blocklist_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(helo_domain) = cli.helo_domain {
        config.smtp_helo_domain = helo_domain;
    }
    if let Some(blocklist_url) = cli.blocklist_url {
        config.blocklist_backend_url = Some(blocklist_url);
    }

    let client = Client::new(config);

    let addresses = if cli.addresses.is_empty() {
        read_stdin_addresses()
    } else {
        cli.addresses
    };

    for address in &addresses {
        match client.verify(address).await {
            Ok(result) => match serde_json::to_string(&result) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("{address}: failed to serialize result: {e}"),
            },
            Err(e) => eprintln!("{address}: {e}"),
        }
    }
}

fn read_stdin_addresses() -> Vec<String> {
    io::stdin()
        .lock()
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
