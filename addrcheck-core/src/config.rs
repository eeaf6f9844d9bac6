//! Pipeline configuration (spec.md §6 "Configuration (enumerated)").

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hostname presented in `HELO`/`EHLO`.
    pub smtp_helo_domain: String,
    /// Envelope sender used as `MAIL FROM`. Never actually receives mail.
    pub probe_email: String,
    /// Admission gate width: max in-flight verifications per domain.
    pub max_concurrency_per_mx: usize,
    /// Per-MX-attempt and per-socket-read SMTP timeout, in milliseconds.
    pub smtp_timeout_ms: u64,
    /// TCP port used to connect to mail exchangers. Always 25 in production;
    /// overridable so tests can point the Prober at a local mock server.
    pub smtp_port: u16,
    /// Advisory retry-after for transient failures, consumed upstream.
    pub gray_retry_after_sec: u64,
    /// Where the (out-of-scope) refresh job fetches new disposable entries.
    pub disposable_list_url: Option<String>,

    /// DNS-over-HTTPS endpoint.
    pub doh_endpoint: String,
    /// Per-DoH-call timeout, in milliseconds.
    pub dns_timeout_ms: u64,
    /// Blocklist KV lookup timeout, in milliseconds.
    pub blocklist_timeout_ms: u64,
    /// Base URL for the blocklist key/value backend, if any is configured.
    pub blocklist_backend_url: Option<String>,

    /// Inner pipeline deadline enforced by the Domain Coordinator.
    pub inner_deadline_ms: u64,
    /// Outer deadline enforced around the whole `verify()` call.
    pub outer_deadline_ms: u64,

    /// Max entries retained per domain in the email-result cache.
    pub email_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp_helo_domain: "addrcheck.example.com".to_string(),
            probe_email: "verify-probe@addrcheck.example.com".to_string(),
            max_concurrency_per_mx: 5,
            smtp_timeout_ms: 5_000,
            smtp_port: 25,
            gray_retry_after_sec: 3_600,
            disposable_list_url: None,

            doh_endpoint: "https://cloudflare-dns.com/dns-query".to_string(),
            dns_timeout_ms: 5_000,
            blocklist_timeout_ms: 2_000,
            blocklist_backend_url: None,

            inner_deadline_ms: 10_000,
            outer_deadline_ms: 25_000,

            email_cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Load overrides from environment variables prefixed `ADDRCHECK_`
    /// (e.g. `ADDRCHECK_MAX_CONCURRENCY_PER_MX=10`), falling back to
    /// [`Config::default`] for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("ADDRCHECK_SMTP_HELO_DOMAIN") {
            config.smtp_helo_domain = v;
        }
        if let Ok(v) = std::env::var("ADDRCHECK_PROBE_EMAIL") {
            config.probe_email = v;
        }
        if let Ok(v) = std::env::var("ADDRCHECK_MAX_CONCURRENCY_PER_MX").and_then(|v| {
            v.parse::<usize>()
                .map_err(|_| std::env::VarError::NotPresent)
        }) {
            config.max_concurrency_per_mx = v;
        }
        if let Ok(v) = std::env::var("ADDRCHECK_SMTP_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().map_err(|_| std::env::VarError::NotPresent))
        {
            config.smtp_timeout_ms = v;
        }
        if let Ok(v) = std::env::var("ADDRCHECK_DISPOSABLE_LIST_URL") {
            config.disposable_list_url = Some(v);
        }
        if let Ok(v) = std::env::var("ADDRCHECK_BLOCKLIST_BACKEND_URL") {
            config.blocklist_backend_url = Some(v);
        }

        config
    }

    #[must_use]
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_millis(self.smtp_timeout_ms)
    }

    #[must_use]
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    #[must_use]
    pub fn blocklist_timeout(&self) -> Duration {
        Duration::from_millis(self.blocklist_timeout_ms)
    }

    #[must_use]
    pub fn inner_deadline(&self) -> Duration {
        Duration::from_millis(self.inner_deadline_ms)
    }

    #[must_use]
    pub fn outer_deadline(&self) -> Duration {
        Duration::from_millis(self.outer_deadline_ms)
    }
}
