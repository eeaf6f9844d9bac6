//! `addrcheck-core`: estimate whether an email address will accept mail,
//! without ever sending any. See each module for its slice of the pipeline:
//! syntax validation, registrable-domain splitting, a disposable-domain
//! blocklist client, a DNS-over-HTTPS resolver, an SMTP prober that drives
//! just enough of the protocol to read a `RCPT TO` response, a pure scoring
//! function, and the per-domain coordinator that ties them together.

mod blocklist;
mod cache;
mod config;
mod coordinator;
mod dns;
mod error;
mod scorer;
mod smtp;
mod suffix;
mod syntax;
mod types;

pub use blocklist::{BlocklistBackend, HttpKvBackend, StaticBackend};
pub use config::Config;
pub use error::{BackendError, VerifyError};
pub use types::{
    Address, CatchAll, DnsResult, MxRecord, SmtpProbeResult, SmtpResponse, Status,
    VerificationResult,
};

use blocklist::BlocklistClient;
use coordinator::DomainRegistry;
use dns::DohResolver;
use smtp::SmtpProber;
use tracing::{info, instrument};

/// Ties the pipeline together behind the single operation spec.md exposes to
/// its (out-of-scope) HTTP/queue collaborators. Construct one per process
/// (or per test); it owns the domain registry and is cheap to clone-by-`Arc`
/// if a caller needs to share it across tasks.
pub struct Client<B: BlocklistBackend = HttpKvBackend> {
    config: Config,
    registry: DomainRegistry,
    resolver: DohResolver,
    prober: SmtpProber,
    blocklist: BlocklistClient<B>,
}

impl Client<HttpKvBackend> {
    /// Builds a client with the real HTTP-backed blocklist client, wired
    /// from `config.blocklist_backend_url` (an empty backend if unset).
    #[must_use]
    pub fn new(config: Config) -> Self {
        let backend_url = config
            .blocklist_backend_url
            .clone()
            .unwrap_or_else(|| "http://localhost/blocklist".to_string());
        let backend = HttpKvBackend::new(backend_url);
        Self::with_blocklist_backend(config, backend)
    }
}

impl<B: BlocklistBackend> Client<B> {
    /// Builds a client with a caller-supplied blocklist backend, e.g.
    /// [`StaticBackend`] in tests.
    pub fn with_blocklist_backend(config: Config, backend: B) -> Self {
        let resolver = DohResolver::new(config.doh_endpoint.clone(), config.dns_timeout());
        let prober = SmtpProber::new(
            config.smtp_helo_domain.clone(),
            config.probe_email.clone(),
            config.smtp_timeout(),
        )
        .with_port(config.smtp_port);
        let blocklist = BlocklistClient::new(backend, config.blocklist_timeout());

        Self {
            config,
            registry: DomainRegistry::new(),
            resolver,
            prober,
            blocklist,
        }
    }

    /// Verifies one address end to end. Never returns `Err` for malformed
    /// input — that scores as a zero-score `UNDELIVERABLE` result instead,
    /// per spec.md's error-propagation policy. Returns `Err` only for
    /// `AdmissionRejected` (concurrency gate closed for this domain) and
    /// `InternalError`. The outer ~25s deadline around the whole pipeline
    /// is enforced here; the Domain Coordinator enforces its own inner
    /// ~10s deadline around the network stages.
    #[instrument(skip(self))]
    pub async fn verify(&self, raw_email: &str) -> Result<VerificationResult, VerifyError> {
        let Some(address) = syntax::validate(raw_email) else {
            let scored = scorer::score(&scorer::ScoreInput::SyntaxInvalid);
            return Ok(VerificationResult {
                email: raw_email.trim().to_lowercase(),
                status: scored.status,
                score: scored.score,
                reason: scored.reason,
                checked_at: VerificationResult::now_ms(),
                ttl: scored.ttl.as_millis() as u64,
            });
        };

        let outcome = tokio::time::timeout(
            self.config.outer_deadline(),
            self.registry.verify(
                address.clone(),
                &self.resolver,
                &self.prober,
                &self.blocklist,
                &self.config,
            ),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                info!(email = %address.full(), "outer deadline exceeded");
                Ok(VerificationResult {
                    email: address.full(),
                    status: Status::Timeout,
                    score: 0,
                    reason: Some("verification timed out".to_string()),
                    checked_at: VerificationResult::now_ms(),
                    ttl: scorer::timeout_ttl().as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_syntax_never_touches_the_network() {
        let client = Client::with_blocklist_backend(Config::default(), StaticBackend::default());
        let result = client.verify("not-an-email").await.unwrap();
        assert_eq!(result.status, Status::Undeliverable);
        assert_eq!(result.score, 0);
    }
}
