//! A throwaway HTTP/1.1 responder for exercising the clients end to end.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mdfilter_api::{AuthClient, Credentials, MangaDexClient};

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path including the raw query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Handler = dyn Fn(&Recorded) -> (u16, String) + Send + Sync;

pub struct MockServer {
    base: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub async fn start(handler: impl Fn(&Recorded) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let accept_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = accept_log.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler, log).await;
                });
            }
        });

        Self { base, log }
    }

    /// A server that accepts connections and never answers.
    pub async fn silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        Self {
            base,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path() == path).count()
    }
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).to_string();

    let request = Recorded {
        method,
        target,
        headers,
        body,
    };
    let (status, payload) = handler(&request);
    log.lock().unwrap().push(request);

    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        if status < 400 { "OK" } else { "Error" },
        payload.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "reader".into(),
        password: "hunter2".into(),
        client_id: "personal-client-abc".into(),
        client_secret: "s3cret".into(),
    }
}

/// Token endpoint at `/token`, status endpoints under `/api`.
pub fn mangadex_routes(statuses: &'static str) -> impl Fn(&Recorded) -> (u16, String) + Send + Sync {
    move |req| match req.path() {
        "/token" => (
            200,
            r#"{"access_token":"access-1","refresh_token":"refresh-1","expires_in":900,"token_type":"Bearer"}"#
                .to_string(),
        ),
        "/api/manga/status" => (200, statuses.to_string()),
        _ => (404, r#"{"result":"error"}"#.to_string()),
    }
}

pub fn auth_client(server: &MockServer, ttl: Duration) -> Arc<AuthClient> {
    let http = mdfilter_api::mangadex::http_client(Duration::from_secs(5)).unwrap();
    Arc::new(
        AuthClient::new(http, credentials())
            .with_token_url(server.url("/token"))
            .with_session_ttl(ttl),
    )
}

pub fn mangadex_client(server: &MockServer, ttl: Duration) -> MangaDexClient {
    let http = mdfilter_api::mangadex::http_client(Duration::from_secs(5)).unwrap();
    MangaDexClient::new(auth_client(server, ttl), http).with_base_url(server.url("/api"))
}
