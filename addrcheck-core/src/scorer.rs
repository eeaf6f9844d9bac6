//! Scorer (spec.md §4.5): a deterministic, pure function from stage
//! outcomes to a score, a verdict, and a cache TTL. No I/O, no hidden
//! state — same inputs always produce the same [`Scored`] output.

use crate::types::{CatchAll, SmtpProbeResult, Status};
use std::time::Duration;

/// The stage outcomes the Scorer needs. Constructed by the Domain
/// Coordinator as it walks the pipeline; also directly constructible in
/// tests so every branch below is reachable without running the network
/// stages.
#[derive(Debug, Clone)]
pub enum ScoreInput {
    SyntaxInvalid,
    DnsInvalid,
    Evaluated {
        disposable: bool,
        catch_all: CatchAll,
        smtp: Option<SmtpProbeResult>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub score: u8,
    pub status: Status,
    pub reason: Option<String>,
    pub ttl: Duration,
}

/// Runs the additive scoring model and verdict derivation from spec.md §4.5.
#[must_use]
pub fn score(input: &ScoreInput) -> Scored {
    match input {
        ScoreInput::SyntaxInvalid => Scored {
            score: 0,
            status: Status::Undeliverable,
            reason: Some("Invalid email syntax".to_string()),
            ttl: ttl_for_score(0),
        },
        ScoreInput::DnsInvalid => Scored {
            score: 0,
            status: Status::Undeliverable,
            reason: Some("Domain has no valid mail server".to_string()),
            ttl: ttl_for_score(0),
        },
        ScoreInput::Evaluated {
            disposable,
            catch_all,
            smtp,
        } => score_evaluated(*disposable, *catch_all, smtp.as_ref()),
    }
}

fn score_evaluated(disposable: bool, catch_all: CatchAll, smtp: Option<&SmtpProbeResult>) -> Scored {
    let smtp_code: Option<u16> = smtp.and_then(|s| s.response.as_ref()).map(|r| u16::from(r.code));
    let smtp_success = smtp.is_some_and(|s| s.success);

    // Invariant (spec.md §3.2): a 5xx on RCPT TO is authoritative and always
    // yields a zero-score UNDELIVERABLE, overriding the disposable/catch-all
    // buckets below — it isn't just one more point contribution.
    if !smtp_success && smtp_code.is_some_and(|c| (500..600).contains(&c)) {
        return Scored {
            score: 0,
            status: Status::Undeliverable,
            reason: Some("mailbox does not exist".to_string()),
            ttl: ttl_for_score(0),
        };
    }

    let mut total: u16 = 0;
    let mut reasons: Vec<&str> = Vec::new();

    if disposable {
        total += 20;
        reasons.push("Disposable email domain");
    } else {
        total += 50;
    }

    match catch_all {
        CatchAll::Yes => {
            total += 20;
            reasons.push("catch-all domain");
        }
        CatchAll::No => total += 30,
        CatchAll::Unknown => {}
    }

    if smtp_success {
        total += 50;
    } else if let Some(code) = smtp_code.filter(|c| (400..500).contains(c)) {
        let _ = code;
        total += 10;
        reasons.push("temporary mailbox failure");
    }

    let score = u8::try_from(total.min(100)).unwrap_or(100);
    let status = derive_status(score, catch_all, smtp_code);
    let reason = if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(", "))
    };

    Scored {
        score,
        status,
        reason,
        ttl: ttl_for_score(score),
    }
}

/// Verdict derivation, evaluated top-down per spec.md §4.5.
fn derive_status(score: u8, catch_all: CatchAll, smtp_code: Option<u16>) -> Status {
    if score == 100 && catch_all != CatchAll::Yes {
        return Status::Deliverable;
    }
    if score >= 70 && catch_all == CatchAll::Yes {
        return Status::Risky;
    }
    if score < 70 || smtp_code.is_none() {
        return Status::Unknown;
    }
    if smtp_code.is_some_and(|c| c >= 500) {
        return Status::Undeliverable;
    }
    Status::Unknown
}

fn ttl_for_score(score: u8) -> Duration {
    if score >= 90 {
        Duration::from_secs(24 * 60 * 60)
    } else if score >= 70 {
        Duration::from_secs(12 * 60 * 60)
    } else if score >= 50 {
        Duration::from_secs(6 * 60 * 60)
    } else {
        Duration::from_secs(60 * 60)
    }
}

/// TTL attached to a synthetic `TIMEOUT` result, produced by the Coordinator
/// rather than the Scorer.
#[must_use]
pub fn timeout_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}
