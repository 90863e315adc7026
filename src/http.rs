//! Minimal HTTP collaborator used by media-gateway negotiation.

use anyhow::Result;
use async_trait::async_trait;
use ureq::Agent;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Blocking `ureq` agent driven through `spawn_blocking`.
///
/// The agent is configured so a 4xx/5xx reply comes back as an
/// `HttpResponse` for the caller to inspect; only transport-level problems
/// (unreachable host, broken connection) surface as `Err`.
#[derive(Clone)]
pub struct UreqHttpClient {
    agent: Agent,
}

impl UreqHttpClient {
    pub fn new() -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || {
            let response = match request.method.as_str() {
                "GET" => {
                    let mut req = agent.get(&request.url);
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    req.call()?
                }
                "POST" => {
                    let mut req = agent.post(&request.url);
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    match request.body {
                        Some(body) => req.send(&body[..])?,
                        None => req.send(&[])?,
                    }
                }
                method => return Err(anyhow::anyhow!("unsupported HTTP method: {method}")),
            };

            let status_code = response.status().as_u16();
            let body = response.into_body().read_to_vec()?;
            Ok(HttpResponse { status_code, body })
        })
        .await?
    }
}

pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Mock HTTP client returning a canned response and recording requests.
    #[derive(Debug, Default)]
    pub struct MockHttpClient {
        pub requests: Mutex<Vec<HttpRequest>>,
        pub status_code: Option<u16>,
        pub response_body: Vec<u8>,
    }

    impl MockHttpClient {
        pub fn respond_with(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                status_code: Some(status_code),
                response_body: body.into(),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests
                .lock()
                .map_err(|_| anyhow::anyhow!("request log poisoned"))?
                .push(request);
            match self.status_code {
                Some(status_code) => Ok(HttpResponse {
                    status_code,
                    body: self.response_body.clone(),
                }),
                None => Err(anyhow::anyhow!("gateway unreachable")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve exactly one canned HTTP response on a loopback port.
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    /// An error status is a response to inspect, not a transport error.
    #[tokio::test]
    async fn test_error_status_is_a_response_not_an_error() {
        let url = serve_once("503 Service Unavailable", "");
        let client = UreqHttpClient::new();
        let response = client
            .execute(HttpRequest::post(&url).body(b"v=0".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status_code, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_success_status_and_body_returned() {
        let url = serve_once("200 OK", "v=0 answer");
        let client = UreqHttpClient::new();
        let response = client
            .execute(
                HttpRequest::post(&url)
                    .header("Content-Type", "application/sdp")
                    .body(b"v=0".to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.is_success());
        assert_eq!(response.body, b"v=0 answer");
    }
}
