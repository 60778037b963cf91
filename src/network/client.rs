//! HTTP transport - executes requests with reqwest and records a timeline

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::models::{AuthType, HttpResponse, Request, RequestBody, ResponsePayload, Timeline, TransportResponse};
use crate::network::{Transport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Self {
        HttpTransport {
            client: create_client(timeout_secs),
            timeout_secs,
        }
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Protocol(e.to_string())
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Build a reqwest request from an already resolved request
async fn build_request(client: &reqwest::Client, request: &Request) -> Result<reqwest::RequestBuilder, TransportError> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| TransportError::Protocol(format!("invalid method: {}", e)))?;
    let mut req_builder = client.request(method, &request.url);

    for header in request.headers.enabled() {
        req_builder = req_builder.header(&header.key, &header.value);
    }

    match &request.auth {
        AuthType::Bearer(token) => {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", token));
        }
        AuthType::Basic { username, password } => {
            let credentials = format!("{}:{}", username, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            req_builder = req_builder.header("Authorization", format!("Basic {}", encoded));
        }
        AuthType::None => {}
    }

    match &request.body {
        RequestBody::Text(text) if !text.is_empty() => {
            req_builder = req_builder.body(text.clone());
        }
        RequestBody::File(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| TransportError::File {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            req_builder = req_builder.body(bytes);
        }
        _ => {}
    }

    Ok(req_builder)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Result<TransportResponse, TransportError> {
        if request.is_grpc() {
            return Err(TransportError::Unsupported(String::from(
                "gRPC targets need a gRPC transport",
            )));
        }

        let start = Instant::now();
        let mut timeline = Timeline::default();

        let req_builder = build_request(&self.client, request).await?;
        let prepared = start.elapsed();
        timeline.push("prepare", 0, millis(prepared));

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Canceled),
            result = req_builder.send() => result.map_err(|e| self.classify(e))?,
        };
        let headers_at = start.elapsed();
        timeline.push("headers", millis(prepared), millis(headers_at - prepared));

        let status = resp.status();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();

        let mut stream = resp.bytes_stream();
        let mut body = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Canceled),
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => body.extend_from_slice(&bytes),
                    Some(Err(e)) => return Err(TransportError::Body(e.to_string())),
                    None => break,
                },
            }
        }
        let done = start.elapsed();
        timeline.push("body", millis(headers_at), millis(done - headers_at));

        Ok(TransportResponse {
            payload: ResponsePayload::Http(HttpResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            timeline: Some(timeline),
            duration_ms: millis(done),
        })
    }
}

/// Create an HTTP client with the configured timeout
pub fn create_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrpcTarget, HttpMethod};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection: read the request, write `reply`, then hold
    /// the socket open for `linger`
    async fn serve_once(reply: &'static str, linger: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(linger).await;
        });
        format!("http://{}/ping", addr)
    }

    #[tokio::test]
    async fn test_grpc_is_unsupported() {
        let transport = HttpTransport::new(1);
        let mut request = Request::new(HttpMethod::POST, "localhost:50051");
        request.grpc = Some(GrpcTarget {
            service: "svc".into(),
            method: "Call".into(),
            message: String::new(),
        });
        let err = transport.send(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_missing_body_file() {
        let transport = HttpTransport::new(1);
        let mut request = Request::new(HttpMethod::POST, "http://127.0.0.1:9/");
        request.body = RequestBody::File("/definitely/not/here.json".into());
        let err = transport.send(&request, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::File { .. }));
    }

    #[tokio::test]
    async fn test_build_request_sets_auth_and_headers() {
        let client = create_client(1);
        let mut request = Request::new(HttpMethod::PUT, "http://localhost/x");
        request.headers.append("X-A", "1");
        request.auth = AuthType::Basic {
            username: "u".into(),
            password: "p".into(),
        };
        request.body = RequestBody::Text("hi".into());
        let built = build_request(&client, &request).await.unwrap().build().unwrap();
        assert_eq!(built.method(), reqwest::Method::PUT);
        assert_eq!(built.headers()["x-a"], "1");
        assert_eq!(built.headers()["authorization"], "Basic dTpw");
    }

    #[tokio::test]
    async fn test_send_records_status_body_and_timeline() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\nhello",
            Duration::from_millis(0),
        )
        .await;
        let transport = HttpTransport::new(5);
        let request = Request::new(HttpMethod::GET, url);
        let response = transport.send(&request, &CancellationToken::new()).await.unwrap();

        match &response.payload {
            ResponsePayload::Http(http) => {
                assert_eq!(http.status, 200);
                assert_eq!(http.reason, "OK");
                assert_eq!(http.body, "hello");
            }
            other => panic!("unexpected payload {:?}", other),
        }
        let timeline = response.timeline.unwrap();
        let phases: Vec<&str> = timeline.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(phases, ["prepare", "headers", "body"]);
    }

    #[tokio::test]
    async fn test_cancel_while_reading_body() {
        // Headers promise more body than the server ever sends
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nContent-Type: text/plain\r\n\r\npartial",
            Duration::from_secs(10),
        )
        .await;
        let transport = HttpTransport::new(30);
        let request = Request::new(HttpMethod::GET, url);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let err = transport.send(&request, &cancel).await.unwrap_err();
        assert!(matches!(err, TransportError::Canceled));
    }
}
