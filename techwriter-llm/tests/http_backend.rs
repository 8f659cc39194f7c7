//! OllamaBackend and Corrector against a minimal in-process HTTP responder.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use techwriter_core::{ClientConfig, PromptRegistry};
use techwriter_llm::{Corrector, FailureKind, OllamaBackend};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the responder does with each connection
#[derive(Clone)]
enum Behavior {
    Reply { status: &'static str, body: &'static str },
    /// Promise more body than is sent, then hang up
    Truncated { partial: &'static str },
    Stall,
}

struct Responder {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl Responder {
    async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));

        let (conn_count, seen) = (connections.clone(), bodies.clone());
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                conn_count.fetch_add(1, Ordering::SeqCst);
                let (behavior, seen) = (behavior.clone(), seen.clone());
                tokio::spawn(async move {
                    handle(stream, behavior, seen).await;
                });
            }
        });

        Self {
            addr,
            connections,
            bodies,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn handle(mut stream: TcpStream, behavior: Behavior, seen: Arc<Mutex<Vec<String>>>) {
    let body = read_request_body(&mut stream).await;
    seen.lock().unwrap().push(body);

    match behavior {
        Behavior::Reply { status, body } => {
            let _ = stream.write_all(response_head(status, body.len()).as_bytes()).await;
            let _ = stream.write_all(body.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Behavior::Truncated { partial } => {
            let _ = stream.write_all(response_head("200 OK", 100).as_bytes()).await;
            let _ = stream.write_all(partial.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        Behavior::Stall => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

fn response_head(status: &str, content_length: usize) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n",
        status, content_length
    )
}

async fn read_request_body(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body_start = header_end + 4;
        if buf.len() >= body_start + content_length {
            return String::from_utf8_lossy(&buf[body_start..body_start + content_length])
                .into_owned();
        }
    }
}

fn corrector(base_url: String, max_attempts: u32, timeout: Duration) -> Corrector {
    let config = ClientConfig {
        base_url,
        timeout,
        max_attempts,
    };
    let backend = OllamaBackend::new(&config).unwrap();
    let registry = PromptRegistry::builtin("tech-writer:latest").unwrap();
    Corrector::new(Arc::new(registry), Arc::new(backend), &config)
}

#[tokio::test]
async fn test_successful_generation() {
    let responder = Responder::start(Behavior::Reply {
        status: "200 OK",
        body: r#"{"model":"tech-writer:latest","response":"This is a test.","done":true}"#,
    })
    .await;

    let corrector = corrector(responder.base_url(), 3, Duration::from_secs(5));
    let correction = corrector.correct("default", "Ths is a tst.").await.unwrap();
    assert_eq!(correction.text, "This is a test.");
    assert_eq!(responder.connections(), 1);

    let sent: serde_json::Value =
        serde_json::from_str(&responder.bodies.lock().unwrap()[0]).unwrap();
    assert_eq!(sent["model"], "tech-writer:latest");
    assert_eq!(sent["prompt"], "Ths is a tst.");
    assert_eq!(sent["stream"], false);
}

#[tokio::test]
async fn test_missing_generated_text() {
    let responder = Responder::start(Behavior::Reply {
        status: "200 OK",
        body: r#"{"model":"tech-writer:latest","done":true}"#,
    })
    .await;

    let corrector = corrector(responder.base_url(), 3, Duration::from_secs(5));
    let err = corrector.correct("grammar", "teh cat").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BackendProtocol);
    assert_eq!(responder.connections(), 1);
}

#[tokio::test]
async fn test_error_status_is_not_retried() {
    let responder = Responder::start(Behavior::Reply {
        status: "404 Not Found",
        body: r#"{"error":"model \"tech-writer:latest\" not found, try pulling it first"}"#,
    })
    .await;

    let corrector = corrector(responder.base_url(), 3, Duration::from_secs(5));
    let err = corrector.correct("default", "teh cat").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BackendProtocol);
    assert!(err.to_string().contains("HTTP 404"));
    assert_eq!(responder.connections(), 1);
}

#[tokio::test]
async fn test_connection_dropped_mid_body_is_retried() {
    let responder = Responder::start(Behavior::Truncated {
        partial: r#"{"resp"#,
    })
    .await;

    let corrector = corrector(responder.base_url(), 3, Duration::from_secs(5));
    let err = corrector.correct("default", "teh cat").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BackendUnavailable);
    assert!(err.to_string().contains("after 3 attempt(s)"));
    assert_eq!(responder.connections(), 3);
}

#[tokio::test]
async fn test_stalled_server_times_out_each_attempt() {
    let responder = Responder::start(Behavior::Stall).await;

    let corrector = corrector(responder.base_url(), 2, Duration::from_millis(200));
    let err = corrector.correct("default", "teh cat").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BackendUnavailable);
    assert_eq!(responder.connections(), 2);
}

#[tokio::test]
async fn test_unreachable_server() {
    // Bind then drop to get a port nothing listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let corrector = corrector(format!("http://{}", addr), 3, Duration::from_secs(2));
    let err = corrector.correct("default", "teh cat").await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BackendUnavailable);
    assert!(err.to_string().contains("after 3 attempt(s)"));
}
