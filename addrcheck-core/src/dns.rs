//! DNS Resolver (spec.md §4.3): MX + A/AAAA presence via DNS-over-HTTPS.

use crate::types::{DnsResult, MxRecord};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

#[derive(Debug, Deserialize, Default)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: i32,
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

const RTYPE_MX: u16 = 15;
const RTYPE_A: u16 = 1;
const RTYPE_AAAA: u16 = 28;

pub struct DohResolver {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl DohResolver {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Issues the MX + A query concurrently, and the AAAA query only if A
    /// came back empty. On any error, returns the all-false "no mail path"
    /// result — callers treat that uniformly with a genuinely empty domain.
    pub async fn lookup(&self, domain: &str) -> DnsResult {
        let (mx, a) = tokio::join!(self.query(domain, RTYPE_MX), self.query(domain, RTYPE_A));

        let mx = match mx {
            Ok(answers) => answers,
            Err(e) => {
                warn!(domain, error = %e, "MX lookup failed");
                return DnsResult::empty();
            }
        };

        let mut has_a = match a {
            Ok(answers) => !answers.is_empty(),
            Err(e) => {
                warn!(domain, error = %e, "A lookup failed");
                false
            }
        };

        if !has_a {
            match self.query(domain, RTYPE_AAAA).await {
                Ok(answers) => has_a = !answers.is_empty(),
                Err(e) => debug!(domain, error = %e, "AAAA lookup failed"),
            }
        }

        let mut records = parse_mx(&mx);
        // Stable sort: ties preserve DNS response (insertion) order.
        records.sort_by_key(|r| r.priority);

        DnsResult {
            has_mx: !records.is_empty(),
            records,
            has_a,
        }
    }

    async fn query(&self, domain: &str, record_type: u16) -> Result<Vec<DohAnswer>, String> {
        let url = format!("{}?name={domain}&type={record_type}", self.endpoint);

        let response = tokio::time::timeout(
            self.timeout,
            self.http
                .get(&url)
                .header("Accept", "application/dns-json")
                .send(),
        )
        .await
        .map_err(|_| "DoH request timed out".to_string())?
        .map_err(|e| e.to_string())?;

        let parsed: DohResponse = response.json().await.map_err(|e| e.to_string())?;

        if parsed.status != 0 {
            return Err(format!("DoH status {}", parsed.status));
        }

        Ok(parsed
            .answer
            .unwrap_or_default()
            .into_iter()
            .filter(|a| a.record_type == record_type)
            .collect())
    }
}

fn parse_mx(answers: &[DohAnswer]) -> Vec<MxRecord> {
    answers
        .iter()
        .filter_map(|a| {
            let (priority, exchange) = a.data.split_once(' ')?;
            let priority: u16 = priority.parse().ok()?;
            let exchange = exchange.trim_end_matches('.').to_lowercase();
            Some(MxRecord { priority, exchange })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_strips_trailing_dot() {
        let answers = vec![
            DohAnswer {
                record_type: RTYPE_MX,
                data: "10 mx2.example.com.".to_string(),
            },
            DohAnswer {
                record_type: RTYPE_MX,
                data: "5 MX1.Example.com.".to_string(),
            },
        ];
        let records = parse_mx(&answers);
        assert_eq!(
            records,
            vec![
                MxRecord {
                    priority: 10,
                    exchange: "mx2.example.com".to_string(),
                },
                MxRecord {
                    priority: 5,
                    exchange: "mx1.example.com".to_string(),
                },
            ]
        );
    }

    #[test]
    fn malformed_record_is_skipped() {
        let answers = vec![DohAnswer {
            record_type: RTYPE_MX,
            data: "not-a-priority mx.example.com.".to_string(),
        }];
        assert!(parse_mx(&answers).is_empty());
    }
}
