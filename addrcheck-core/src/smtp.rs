//! SMTP Prober (spec.md §4.4): speaks just enough SMTP to learn whether a
//! mailbox exists, never issuing `DATA`.

use crate::types::{MxRecord, SmtpProbeResult, SmtpResponse};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn};

const CATCH_ALL_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Either side of a (possibly TLS-upgraded) SMTP connection, exposing a
/// uniform line-oriented surface.
enum Connection {
    Plain(BufStream<TcpStream>),
    Tls(BufStream<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn connect(exchange: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((exchange, port)).await?;
        Ok(Self::Plain(BufStream::new(stream)))
    }

    async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        debug!(command = %line.trim_end(), "smtp >>>");
        match self {
            Self::Plain(s) => {
                s.write_all(line.as_bytes()).await?;
                s.flush().await
            }
            Self::Tls(s) => {
                s.write_all(line.as_bytes()).await?;
                s.flush().await
            }
        }
    }

    async fn read_line(&mut self, buf: &mut String) -> std::io::Result<usize> {
        match self {
            Self::Plain(s) => s.read_line(buf).await,
            Self::Tls(s) => s.read_line(buf).await,
        }
    }

    /// Consumes a plaintext connection and returns a TLS-wrapped one.
    /// `self` must be `Plain`; any other variant is a logic error upstream.
    async fn upgrade_to_tls(self, domain: &str) -> Result<Self, String> {
        let Self::Plain(buf_stream) = self else {
            return Err("connection is already TLS".to_string());
        };
        let stream = buf_stream.into_inner();

        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            roots
                .add(cert)
                .map_err(|e| format!("failed to add native cert: {e}"))?;
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| format!("invalid TLS server name {domain}: {e}"))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| format!("TLS handshake failed: {e}"))?;

        Ok(Self::Tls(BufStream::new(tls_stream)))
    }
}

/// Matches `^(\d{3})([ -])(.*)`. A line failing this is unparseable.
fn parse_response_line(line: &str) -> Option<(u16, bool, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() < 4 {
        return None;
    }
    let code: u16 = line.get(0..3)?.parse().ok()?;
    let sep = line.as_bytes()[3];
    let is_final = match sep {
        b' ' => true,
        b'-' => false,
        _ => return None,
    };
    Some((code, is_final, line[4..].to_string()))
}

/// Reads one complete SMTP response, draining `-` continuation lines until
/// the terminating line with a space separator.
async fn read_response(conn: &mut Connection) -> SmtpResponse {
    let mut messages = Vec::new();
    let mut code = None;

    loop {
        let mut line = String::new();
        match conn.read_line(&mut line).await {
            Ok(0) => return SmtpResponse::unparseable(),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "smtp read error");
                return SmtpResponse::unparseable();
            }
        }
        debug!(line = %line.trim_end(), "smtp <<<");

        let Some((line_code, is_final, message)) = parse_response_line(&line) else {
            return SmtpResponse::unparseable();
        };

        code.get_or_insert(line_code);
        messages.push(message);

        if is_final {
            break;
        }
    }

    SmtpResponse {
        code: code.unwrap_or(0),
        message: messages.join(" "),
    }
}

/// Outcome of one dialog attempt against a single MX, before the Prober
/// decides whether to try the next one.
enum DialogOutcome {
    RcptPositive(SmtpResponse),
    /// Authoritative negative answer: a 5xx on `RCPT TO`.
    RcptPermanent(SmtpResponse),
    /// Anything else that should cause the Prober to move to the next MX.
    RetryNextMx(String),
    /// STARTTLS was accepted but the handshake failed; the session is
    /// poisoned and must be reopened.
    TlsPoisoned,
}

pub struct SmtpProber {
    helo_domain: String,
    probe_email: String,
    timeout: Duration,
    port: u16,
}

impl SmtpProber {
    #[must_use]
    pub fn new(helo_domain: impl Into<String>, probe_email: impl Into<String>, timeout: Duration) -> Self {
        Self {
            helo_domain: helo_domain.into(),
            probe_email: probe_email.into(),
            timeout,
            port: 25,
        }
    }

    /// Overrides the SMTP port (default 25), for tests driving a local mock
    /// server.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Tries each MX in priority order until a conclusive answer or
    /// exhaustion, per spec.md §4.4.
    #[instrument(skip(self, mx_records, email), fields(domain = %to_domain(email)))]
    pub async fn verify(&self, email: &str, mx_records: &[MxRecord]) -> SmtpProbeResult {
        for mx in mx_records {
            match self.probe_one_mx(&mx.exchange, email).await {
                Ok(DialogOutcome::RcptPositive(response)) => {
                    return SmtpProbeResult {
                        success: true,
                        response: Some(response),
                        error: None,
                    };
                }
                Ok(DialogOutcome::RcptPermanent(response)) => {
                    return SmtpProbeResult {
                        success: false,
                        response: Some(response),
                        error: None,
                    };
                }
                Ok(DialogOutcome::RetryNextMx(reason)) => {
                    debug!(exchange = %mx.exchange, reason, "trying next MX");
                }
                Ok(DialogOutcome::TlsPoisoned) => {
                    debug!(exchange = %mx.exchange, "TLS session poisoned twice, trying next MX");
                }
                Err(reason) => {
                    debug!(exchange = %mx.exchange, reason, "mx attempt failed");
                }
            }
        }

        SmtpProbeResult {
            success: false,
            response: None,
            error: Some("all MX hosts exhausted without a conclusive answer".to_string()),
        }
    }

    /// Generates a random `probe-<8-10 base36 chars>@domain` address
    /// unlikely to exist and runs it through the same dialog. A positive
    /// `RCPT TO` implies the domain is catch-all.
    pub async fn test_catch_all(&self, domain: &str, mx_records: &[MxRecord]) -> bool {
        let local = random_probe_local_part();
        let email = format!("{local}@{domain}");
        self.verify(&email, mx_records).await.success
    }

    /// One MX, retrying once in plaintext if STARTTLS poisons the session.
    async fn probe_one_mx(&self, exchange: &str, rcpt_email: &str) -> Result<DialogOutcome, String> {
        let mut allow_starttls = true;
        loop {
            let attempt = tokio::time::timeout(
                self.timeout,
                self.dialog(exchange, allow_starttls, rcpt_email),
            )
            .await
            .map_err(|_| "smtp dialog timed out".to_string())?;

            match attempt {
                Ok(DialogOutcome::TlsPoisoned) if allow_starttls => {
                    allow_starttls = false;
                    continue;
                }
                other => return other,
            }
        }
    }

    async fn dialog(
        &self,
        exchange: &str,
        allow_starttls: bool,
        rcpt_email: &str,
    ) -> Result<DialogOutcome, String> {
        let mut conn = Connection::connect(exchange, self.port)
            .await
            .map_err(|e| format!("connect failed: {e}"))?;

        let banner = read_response(&mut conn).await;
        if !banner.is_positive() {
            return Ok(DialogOutcome::RetryNextMx(format!(
                "bad banner: {}",
                banner.code
            )));
        }

        if !self.helo(&mut conn).await? {
            return Ok(DialogOutcome::RetryNextMx("HELO rejected".to_string()));
        }

        if allow_starttls {
            conn.send_line("STARTTLS\r\n")
                .await
                .map_err(|e| format!("write failed: {e}"))?;
            let starttls_response = read_response(&mut conn).await;

            if starttls_response.is_positive() {
                match conn.upgrade_to_tls(exchange).await {
                    Ok(upgraded) => {
                        conn = upgraded;
                        if !self.helo(&mut conn).await? {
                            return Ok(DialogOutcome::RetryNextMx(
                                "HELO rejected after STARTTLS".to_string(),
                            ));
                        }
                    }
                    Err(reason) => {
                        debug!(exchange, reason, "STARTTLS upgrade failed");
                        return Ok(DialogOutcome::TlsPoisoned);
                    }
                }
            }
            // A negative STARTTLS reply is not an error: continue in plaintext.
        }

        conn.send_line(&format!("MAIL FROM:<{}>\r\n", self.probe_email))
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        let mail_from_response = read_response(&mut conn).await;
        if !mail_from_response.is_positive() {
            return Ok(DialogOutcome::RetryNextMx(format!(
                "MAIL FROM rejected: {}",
                mail_from_response.code
            )));
        }

        conn.send_line(&format!("RCPT TO:<{rcpt_email}>\r\n"))
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        let rcpt_response = read_response(&mut conn).await;

        let _ = conn.send_line("QUIT\r\n").await;

        if rcpt_response.is_positive() {
            Ok(DialogOutcome::RcptPositive(rcpt_response))
        } else if rcpt_response.is_permanent() {
            Ok(DialogOutcome::RcptPermanent(rcpt_response))
        } else {
            Ok(DialogOutcome::RetryNextMx(format!(
                "RCPT TO not conclusive: {}",
                rcpt_response.code
            )))
        }
    }

    async fn helo(&self, conn: &mut Connection) -> Result<bool, String> {
        conn.send_line(&format!("HELO {}\r\n", self.helo_domain))
            .await
            .map_err(|e| format!("write failed: {e}"))?;
        Ok(read_response(conn).await.is_positive())
    }
}

fn random_probe_local_part() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(8..=10);
    let suffix: String = (0..len)
        .map(|_| CATCH_ALL_CHARSET[rng.random_range(0..CATCH_ALL_CHARSET.len())] as char)
        .collect();
    format!("probe-{suffix}")
}

fn to_domain(email: &str) -> &str {
    email.rsplit_once('@').map_or(email, |(_, domain)| domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_response() {
        let (code, is_final, message) = parse_response_line("250 OK\r\n").unwrap();
        assert_eq!(code, 250);
        assert!(is_final);
        assert_eq!(message, "OK");
    }

    #[test]
    fn parses_continuation_line() {
        let (code, is_final, _) = parse_response_line("250-PIPELINING\r\n").unwrap();
        assert_eq!(code, 250);
        assert!(!is_final);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_response_line("nope").is_none());
    }

    #[test]
    fn probe_local_part_has_fixed_prefix_and_length_range() {
        for _ in 0..50 {
            let local = random_probe_local_part();
            assert!(local.starts_with("probe-"));
            let suffix_len = local.len() - "probe-".len();
            assert!((8..=10).contains(&suffix_len));
            assert!(local[6..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }
}
