//! Registrable-Domain Helper (spec.md §2, §9): splits a hostname into its
//! registrable suffix (eTLD+1) and any subdomain labels, backed by an
//! embedded public-suffix-list snapshot so the split never needs a network
//! round trip.

/// Whether `domain`'s suffix is present on the public-suffix list. Used by
/// the Syntax Validator to reject bare hostnames and garbage TLDs.
#[must_use]
pub fn is_known_suffix(domain: &str) -> bool {
    psl::suffix(domain.as_bytes()).is_some_and(|s| s.is_known())
}

/// Splits `domain` into its registrable domain (eTLD+1) and, if present, the
/// subdomain labels sitting in front of it. Returns `None` if `domain` isn't
/// under a known public suffix.
///
/// `psl::domain` alone isn't enough here: the public-suffix algorithm falls
/// back to a wildcard `*` rule for any never-seen TLD, so it happily derives
/// a registrable domain for garbage like `nobody.invalidtld`. Gating on
/// `Suffix::is_known` is what actually rejects those, per spec.md §4.1.
#[must_use]
pub fn split(domain: &str) -> Option<(String, Option<String>)> {
    if !is_known_suffix(domain) {
        return None;
    }
    let registrable = psl::domain(domain.as_bytes())?;
    let registrable = String::from_utf8_lossy(registrable.as_bytes()).into_owned();

    let subdomain = domain
        .strip_suffix(&registrable)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    Some((registrable, subdomain))
}

/// Registrable domain only, for the Blocklist Client's parent-domain retry.
#[must_use]
pub fn registrable_domain(domain: &str) -> Option<String> {
    split(domain).map(|(registrable, _)| registrable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_domain() {
        assert_eq!(
            split("mail.example.co.uk"),
            Some(("example.co.uk".to_string(), Some("mail".to_string())))
        );
    }

    #[test]
    fn bare_registrable_domain_has_no_subdomain() {
        assert_eq!(split("gmail.com"), Some(("gmail.com".to_string(), None)));
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        assert!(!is_known_suffix("nobody.invalidtld"));
        assert!(split("nobody.invalidtld").is_none());
    }

    #[test]
    fn multi_level_subdomain_is_preserved() {
        let (registrable, subdomain) = split("a.b.c.example.com").unwrap();
        assert_eq!(registrable, "example.com");
        assert_eq!(subdomain.as_deref(), Some("a.b.c"));
    }
}
