//! Shared data model for the verification pipeline (spec.md §3).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A normalized, lowercased `local@domain` address, split at the `@` and
/// further split into registrable domain + subdomain labels by the
/// Registrable-Domain Helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub local: String,
    pub domain: String,
    pub registrable_domain: String,
    pub subdomain: Option<String>,
}

impl Address {
    #[must_use]
    pub fn full(&self) -> String {
        format!("{}@{}", self.local, self.domain)
    }
}

/// `(priority, exchange)` per RFC 5321. Lower priority is preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub priority: u16,
    pub exchange: String,
}

/// Result of an MX + A/AAAA lookup for one domain. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResult {
    pub has_mx: bool,
    pub records: Vec<MxRecord>,
    pub has_a: bool,
}

impl DnsResult {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            has_mx: false,
            records: Vec::new(),
            has_a: false,
        }
    }

    /// Domain has no usable mail path: no MX, and no A/AAAA to fall back on.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        !self.has_mx && !self.has_a
    }
}

/// A parsed SMTP status line. `code == 0` denotes "no parseable response".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    #[must_use]
    pub const fn unparseable() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }

    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.code >= 200 && self.code < 400
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.code >= 500 && self.code < 600
    }
}

/// Outcome of one `RCPT TO` attempt, across however many MXes were tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpProbeResult {
    pub success: bool,
    pub response: Option<SmtpResponse>,
    pub error: Option<String>,
}

/// Verdict attached to a [`VerificationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Deliverable,
    Risky,
    Unknown,
    Undeliverable,
    Timeout,
}

/// The final, cacheable outcome of a `verify(email)` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub email: String,
    pub status: Status,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "checkedAt")]
    pub checked_at: u64,
    pub ttl: u64,
}

impl VerificationResult {
    #[must_use]
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Tri-state catch-all flag: the probe runs at most once per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchAll {
    Unknown,
    Yes,
    No,
}

impl CatchAll {
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Yes => Some(true),
            Self::No => Some(false),
        }
    }
}

/// Per-domain cache entry: the DNS result plus whatever we know about
/// catch-all behavior so far.
#[derive(Debug, Clone)]
pub struct DomainCacheEntry {
    pub dns: DnsResult,
    pub catch_all: CatchAll,
    pub created_at: std::time::Instant,
}
