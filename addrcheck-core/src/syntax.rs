//! Syntax Validator (spec.md §4.1): a cheap, deterministic, non-networking
//! gate on the address shape.

use crate::suffix;
use crate::types::Address;
use regex::Regex;
use std::sync::LazyLock;

// Dot-atom local part, e.g. `john.doe+tag`, per RFC 5322 §3.4.1 (comments /
// folding whitespace are intentionally unsupported, same simplification the
// teacher crate makes).
static DOT_ATOM: &str = r"[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*";

// Quoted-string local part, e.g. `"john doe"`.
static QUOTED: &str = r#""(?:[^"\\]|\\.)*""#;

static DOMAIN_LABELS: &str = r"[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}";

static DOMAIN_LITERAL: &str = r"\[[0-9A-Fa-f:.]+\]";

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:{DOT_ATOM}|{QUOTED})@(?:{DOMAIN_LABELS}|{DOMAIN_LITERAL})$"
    ))
    .expect("address regex is a valid, fixed pattern")
});

/// Validates and normalizes a raw address string. Never performs network
/// I/O. Returns the normalized split on success.
#[must_use]
pub fn validate(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    if !ADDRESS_RE.is_match(raw) {
        return None;
    }

    let (local, domain) = raw.rsplit_once('@')?;
    let domain = domain.to_lowercase();

    if domain.starts_with('[') {
        // Domain literal: no public-suffix concept applies.
        return Some(Address {
            local: local.to_string(),
            domain: domain.clone(),
            registrable_domain: domain,
            subdomain: None,
        });
    }

    let (registrable_domain, subdomain) = suffix::split(&domain)?;

    Some(Address {
        local: local.to_string(),
        domain,
        registrable_domain,
        subdomain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_address() {
        let addr = validate("Alice@Gmail.com").expect("valid address");
        assert_eq!(addr.local, "Alice");
        assert_eq!(addr.domain, "gmail.com");
        assert_eq!(addr.registrable_domain, "gmail.com");
        assert_eq!(addr.subdomain, None);
    }

    #[test]
    fn accepts_dotted_and_tagged_local_part() {
        assert!(validate("john.doe+tag@example.com").is_some());
    }

    #[test]
    fn accepts_quoted_local_part() {
        assert!(validate("\"john doe\"@example.com").is_some());
    }

    #[test]
    fn accepts_subdomain() {
        let addr = validate("hello@mail.example.co.uk").expect("valid address");
        assert_eq!(addr.registrable_domain, "example.co.uk");
        assert_eq!(addr.subdomain.as_deref(), Some("mail"));
    }

    #[test]
    fn accepts_domain_literal() {
        let addr = validate("hello@[192.168.1.1]").expect("valid address");
        assert_eq!(addr.domain, "[192.168.1.1]");
    }

    #[test]
    fn rejects_missing_at() {
        assert!(validate("not-an-email").is_none());
    }

    #[test]
    fn rejects_empty_local_or_domain() {
        assert!(validate("@").is_none());
        assert!(validate("local-part@").is_none());
        assert!(validate("@domain").is_none());
    }

    #[test]
    fn rejects_unknown_tld() {
        assert!(validate("hi@unknownHost").is_none());
        assert!(validate("hi@domain.zzzznotatld").is_none());
    }
}
