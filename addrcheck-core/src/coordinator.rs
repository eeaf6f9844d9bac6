//! Domain Coordinator (spec.md §4.6): the concurrency spine. Exactly one
//! logical coordinator exists per domain; all verification work for that
//! domain routes through it, giving it a single-writer boundary over the
//! domain's DNS/catch-all state without needing per-email locks.

use crate::blocklist::{BlocklistBackend, BlocklistClient};
use crate::cache::LruCacheWithTtl;
use crate::config::Config;
use crate::dns::DohResolver;
use crate::error::VerifyError;
use crate::scorer::{self, ScoreInput};
use crate::smtp::SmtpProber;
use crate::syntax;
use crate::types::Address;
use crate::types::{CatchAll, DomainCacheEntry, DnsResult, Status, VerificationResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Mutable per-domain state, guarded by a single `tokio::sync::Mutex` so
/// that DNS lookups and catch-all probes are coalesced: whichever task
/// holds the lock when state is missing is the one that does the I/O,
/// everyone else observes the result it leaves behind.
struct DomainState {
    entry: Option<DomainCacheEntry>,
}

pub struct DomainCoordinator {
    domain: String,
    state: Mutex<DomainState>,
    email_cache: LruCacheWithTtl<String, VerificationResult>,
    active_tasks: AtomicUsize,
    max_concurrency: usize,
}

impl DomainCoordinator {
    fn new(domain: String, config: &Config) -> Self {
        Self {
            domain,
            state: Mutex::new(DomainState { entry: None }),
            email_cache: LruCacheWithTtl::new(config.email_cache_capacity),
            active_tasks: AtomicUsize::new(0),
            max_concurrency: config.max_concurrency_per_mx,
        }
    }

    /// Steps 1-12 of spec.md §4.6's protocol, minus the outer ~25s deadline
    /// (that is the `Client`'s job, wrapping this whole call).
    #[instrument(skip(self, resolver, prober, blocklist), fields(domain = %self.domain))]
    async fn verify<B: BlocklistBackend>(
        &self,
        address: Address,
        resolver: &DohResolver,
        prober: &SmtpProber,
        blocklist: &BlocklistClient<B>,
        inner_deadline: std::time::Duration,
    ) -> Result<VerificationResult, VerifyError> {
        self.email_cache.evict_expired();

        // Check-and-increment must be one atomic step: a plain load-then-add
        // lets two threads both pass the check before either increments,
        // admitting one more verification than `max_concurrency` allows.
        let admitted = self
            .active_tasks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.max_concurrency).then_some(active + 1)
            });
        if admitted.is_err() {
            return Err(VerifyError::AdmissionRejected);
        }
        let _guard = ActiveTaskGuard { counter: &self.active_tasks };

        let email = address.full();

        if let Some(cached) = self.email_cache.get(&email) {
            debug!(email = %email, "email cache hit");
            return Ok(cached);
        }

        let outcome = tokio::time::timeout(
            inner_deadline,
            self.run_pipeline(&address, resolver, prober, blocklist),
        )
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(email = %email, "inner deadline exceeded");
                VerificationResult {
                    email: email.clone(),
                    status: Status::Timeout,
                    score: 0,
                    reason: Some("verification timed out".to_string()),
                    checked_at: VerificationResult::now_ms(),
                    ttl: scorer::timeout_ttl().as_millis() as u64,
                }
            }
        };

        if result.status != Status::Timeout {
            self.email_cache
                .insert(email, result.clone(), std::time::Duration::from_millis(result.ttl));
        }

        Ok(result)
    }

    async fn run_pipeline<B: BlocklistBackend>(
        &self,
        address: &Address,
        resolver: &DohResolver,
        prober: &SmtpProber,
        blocklist: &BlocklistClient<B>,
    ) -> VerificationResult {
        let disposable = blocklist.is_disposable(&address.domain).await;

        let dns = self.get_or_fetch_dns(&address.domain, resolver).await;

        if dns.is_invalid() {
            let scored = scorer::score(&ScoreInput::DnsInvalid);
            return build_result(address, scored);
        }

        let (smtp, catch_all) = if dns.has_mx {
            let probe = prober.verify(&address.full(), &dns.records).await;
            let catch_all = self.get_or_probe_catch_all(address, prober, &dns).await;
            (Some(probe), catch_all)
        } else {
            (None, CatchAll::Unknown)
        };

        let scored = scorer::score(&ScoreInput::Evaluated {
            disposable,
            catch_all,
            smtp,
        });
        build_result(address, scored)
    }

    /// Returns the cached DNS result for `domain`, fetching it if absent.
    /// The state lock is held across the fetch itself (not just the read and
    /// the write either side of it), so concurrent verifications for the
    /// same uncached domain never issue more than one DNS lookup — spec.md
    /// §3 invariant 3 and §8's "at most one in-flight DNS lookup per domain"
    /// property both depend on the lookup itself being single-flight, not
    /// just the cache write.
    async fn get_or_fetch_dns(&self, domain: &str, resolver: &DohResolver) -> DnsResult {
        let mut state = self.state.lock().await;
        if let Some(entry) = &state.entry {
            return entry.dns.clone();
        }
        let fetched = resolver.lookup(domain).await;
        state.entry = Some(DomainCacheEntry {
            dns: fetched.clone(),
            catch_all: CatchAll::Unknown,
            created_at: Instant::now(),
        });
        fetched
    }

    /// Returns the domain's catch-all status, running the probe if it
    /// hasn't been run yet. Same single-flight discipline as
    /// [`Self::get_or_fetch_dns`]: the lock is held across the probe itself,
    /// so two concurrent verifications racing to be "the first" at a domain
    /// can't both launch a catch-all probe — only whichever one acquires the
    /// lock first runs it, and the other observes the already-updated result
    /// once it gets the lock.
    async fn get_or_probe_catch_all(
        &self,
        address: &Address,
        prober: &SmtpProber,
        dns: &DnsResult,
    ) -> CatchAll {
        let mut state = self.state.lock().await;
        let current = state.entry.as_ref().map_or(CatchAll::Unknown, |e| e.catch_all);
        if current != CatchAll::Unknown {
            return current;
        }

        let is_catch_all = prober.test_catch_all(&address.domain, &dns.records).await;
        let catch_all = if is_catch_all { CatchAll::Yes } else { CatchAll::No };
        if let Some(entry) = state.entry.as_mut() {
            entry.catch_all = catch_all;
        }
        info!(domain = %address.domain, catch_all = ?catch_all, "catch-all probe complete");
        catch_all
    }
}

fn build_result(address: &Address, scored: scorer::Scored) -> VerificationResult {
    VerificationResult {
        email: address.full(),
        status: scored.status,
        score: scored.score,
        reason: scored.reason,
        checked_at: VerificationResult::now_ms(),
        ttl: scored.ttl.as_millis() as u64,
    }
}

struct ActiveTaskGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Sharded map of one [`DomainCoordinator`] per lowercased domain, created
/// lazily and kept for the process lifetime per spec.md's Lifecycle clause.
/// Grounded on the per-destination queue-manager pattern used by larger MTA
/// codebases in this space.
#[derive(Default)]
pub struct DomainRegistry {
    coordinators: DashMap<String, Arc<DomainCoordinator>>,
}

impl DomainRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, domain: &str, config: &Config) -> Arc<DomainCoordinator> {
        if let Some(existing) = self.coordinators.get(domain) {
            return Arc::clone(&existing);
        }
        Arc::clone(
            self.coordinators
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainCoordinator::new(domain.to_string(), config)))
                .value(),
        )
    }

    pub async fn verify<B: BlocklistBackend>(
        &self,
        address: Address,
        resolver: &DohResolver,
        prober: &SmtpProber,
        blocklist: &BlocklistClient<B>,
        config: &Config,
    ) -> Result<VerificationResult, VerifyError> {
        let coordinator = self.get_or_insert(&address.domain, config);
        coordinator
            .verify(address, resolver, prober, blocklist, config.inner_deadline())
            .await
    }
}
