//! Exercises the full `Client::verify` pipeline — DoH lookup, SMTP dialog,
//! scoring — against local mock servers standing in for the network,
//! grounded on the teacher crate's `integration_test.rs` mock-SMTP pattern.

use addrcheck_core::{Client, Config, StaticBackend};
use futures::{SinkExt, StreamExt};
use serial_test::serial;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};

/// A DoH endpoint that always answers with one MX record pointing at
/// `mx_host`, regardless of the query string.
async fn spawn_fake_doh(mx_host: &str) -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = format!(
        r#"{{"Status":0,"Answer":[{{"name":"example.com.","type":15,"TTL":300,"data":"10 {mx_host}."}}]}}"#
    );

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}/dns-query")
}

/// A queue of expected request/response pairs, shared across however many
/// TCP connections one verification opens (the main `RCPT TO` dialog and
/// the catch-all probe are each their own connection). A trailing `*` on
/// the expected request makes it a prefix match, needed for the catch-all
/// probe's randomized local part.
struct Script(VecDeque<(String, String)>);

impl Script {
    fn new(entries: &[(&str, &str)]) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self(
            entries
                .iter()
                .map(|(req, resp)| (req.to_string(), resp.to_string()))
                .collect(),
        )))
    }

    fn get_next(&mut self, actual: &str) -> String {
        let Some((expected, response)) = self.0.pop_front() else {
            panic!("expected no more SMTP commands but received '{actual}'");
        };
        let matches = expected
            .strip_suffix('*')
            .map_or_else(|| expected == actual, |prefix| actual.starts_with(prefix));
        assert!(matches, "expected SMTP command '{expected}' but got '{actual}'");
        response
    }
}

/// Binds to an ephemeral port on 127.0.0.1 and serves however many
/// connections the test drives against it, each pulling its commands from
/// the shared `script`. Returns the port to plug into `Config::smtp_port`.
async fn spawn_smtp_mock(script: &[(&str, &str)]) -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let script = Script::new(script);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let script = Arc::clone(&script);
            tokio::spawn(handle_connection(stream, script));
        }
    });

    port
}

async fn handle_connection(mut stream: TcpStream, script: Arc<Mutex<Script>>) {
    let (_, writer) = stream.split();
    let mut writer = BufWriter::new(writer);
    writer.write_all(b"220 mock SMTP server\r\n").await.unwrap();
    writer.flush().await.unwrap();

    let mut framed = Framed::new(stream, LinesCodec::new());
    while let Some(Ok(line)) = framed.next().await {
        if line == "QUIT" {
            break;
        }
        let response = script.lock().await.get_next(&line);
        framed.send(format!("{response}\r")).await.unwrap();
    }
}

/// Same contract as [`spawn_fake_doh`], but counts how many requests it
/// actually served — used to prove the coordinator's DNS lookup is
/// single-flight per domain rather than just asserting on behavior that
/// would look identical either way.
async fn spawn_counting_doh(mx_host: &str) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = format!(
        r#"{{"Status":0,"Answer":[{{"name":"example.com.","type":15,"TTL":300,"data":"10 {mx_host}."}}]}}"#
    );
    let hits = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let hits = Arc::clone(&hits);
        async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let body = body.clone();
                let hits = Arc::clone(&hits);
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        }
    });

    (format!("http://{addr}/dns-query"), hits)
}

/// A free-running SMTP mock for concurrency tests: unlike [`Script`], it
/// doesn't assert a fixed command order, since two concurrent verifications
/// interleave their dialogs unpredictably. It answers every `HELO`/`MAIL
/// FROM` positively and every `RCPT TO` positively too, except it reports
/// failure on catch-all probes (their local part is always `probe-`
/// prefixed) so the scorer still treats the domain as not-catch-all.
/// Counts total connections and how many carried a probe `RCPT TO`.
async fn spawn_counting_smtp_mock() -> (u16, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let catch_all_probes = Arc::new(AtomicUsize::new(0));

    tokio::spawn({
        let connections = Arc::clone(&connections);
        let catch_all_probes = Arc::clone(&catch_all_probes);
        async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handle_counting_connection(stream, Arc::clone(&catch_all_probes)));
            }
        }
    });

    (port, connections, catch_all_probes)
}

async fn handle_counting_connection(mut stream: TcpStream, catch_all_probes: Arc<AtomicUsize>) {
    let (_, writer) = stream.split();
    let mut writer = BufWriter::new(writer);
    writer.write_all(b"220 mock SMTP server\r\n").await.unwrap();
    writer.flush().await.unwrap();

    let mut framed = Framed::new(stream, LinesCodec::new());
    while let Some(Ok(line)) = framed.next().await {
        if line == "QUIT" {
            break;
        }
        if line.starts_with("STARTTLS") {
            framed.send("502 not implemented\r".to_string()).await.unwrap();
            continue;
        }
        if line.starts_with("RCPT TO:<probe-") {
            catch_all_probes.fetch_add(1, Ordering::SeqCst);
            framed.send("550 no\r".to_string()).await.unwrap();
            continue;
        }
        framed.send("250 OK\r".to_string()).await.unwrap();
    }
}

fn test_config(doh_endpoint: String, smtp_port: u16) -> Config {
    Config {
        doh_endpoint,
        smtp_port,
        smtp_helo_domain: "addrcheck-test.invalid".to_string(),
        probe_email: "probe@addrcheck-test.invalid".to_string(),
        ..Config::default()
    }
}

#[tokio::test]
#[serial]
async fn deliverable_address_scores_one_hundred() {
    let smtp_port = spawn_smtp_mock(&[
        ("HELO addrcheck-test.invalid", "250 OK"),
        ("STARTTLS", "502 not implemented"),
        ("MAIL FROM:<probe@addrcheck-test.invalid>", "250 OK"),
        ("RCPT TO:<hello@example.com>", "250 OK"),
        // catch-all probe, run on the first full verification for the domain.
        ("HELO addrcheck-test.invalid", "250 OK"),
        ("STARTTLS", "502 not implemented"),
        ("MAIL FROM:<probe@addrcheck-test.invalid>", "250 OK"),
        ("RCPT TO:<probe-*", "550 no"),
    ])
    .await;
    let doh = spawn_fake_doh("127.0.0.1").await;

    let client =
        Client::with_blocklist_backend(test_config(doh, smtp_port), StaticBackend::default());
    let result = client.verify("hello@example.com").await.unwrap();

    assert_eq!(result.score, 100);
    assert_eq!(result.status, addrcheck_core::Status::Deliverable);
}

#[tokio::test]
#[serial]
async fn permanent_rcpt_failure_is_undeliverable_with_zero_score() {
    let smtp_port = spawn_smtp_mock(&[
        ("HELO addrcheck-test.invalid", "250 OK"),
        ("STARTTLS", "502 not implemented"),
        ("MAIL FROM:<probe@addrcheck-test.invalid>", "250 OK"),
        ("RCPT TO:<ghost@example.com>", "550 no such user"),
        // catch-all probe still runs, even though the primary RCPT was conclusive.
        ("HELO addrcheck-test.invalid", "250 OK"),
        ("STARTTLS", "502 not implemented"),
        ("MAIL FROM:<probe@addrcheck-test.invalid>", "250 OK"),
        ("RCPT TO:<probe-*", "550 no"),
    ])
    .await;
    let doh = spawn_fake_doh("127.0.0.1").await;

    let client =
        Client::with_blocklist_backend(test_config(doh, smtp_port), StaticBackend::default());
    let result = client.verify("ghost@example.com").await.unwrap();

    assert_eq!(result.score, 0);
    assert_eq!(result.status, addrcheck_core::Status::Undeliverable);
}

#[tokio::test]
#[serial]
async fn concurrent_verifications_for_same_domain_share_dns_lookup_and_catch_all_probe() {
    let (smtp_port, connections, catch_all_probes) = spawn_counting_smtp_mock().await;
    let (doh, dns_hits) = spawn_counting_doh("127.0.0.1").await;

    let config = Config {
        max_concurrency_per_mx: 4,
        ..test_config(doh, smtp_port)
    };
    let client = Client::with_blocklist_backend(config, StaticBackend::default());

    let (result_a, result_b) =
        tokio::join!(client.verify("alice@example.com"), client.verify("bob@example.com"));

    assert_ne!(result_a.unwrap().status, addrcheck_core::Status::Timeout);
    assert_ne!(result_b.unwrap().status, addrcheck_core::Status::Timeout);

    assert_eq!(
        dns_hits.load(Ordering::SeqCst),
        1,
        "two verifications racing on an uncached domain must share one DNS lookup"
    );
    assert_eq!(
        catch_all_probes.load(Ordering::SeqCst),
        1,
        "the catch-all probe must run at most once per domain, not once per verification"
    );
    assert_eq!(
        connections.load(Ordering::SeqCst),
        3,
        "one RCPT dialog per address plus exactly one catch-all probe"
    );
}
