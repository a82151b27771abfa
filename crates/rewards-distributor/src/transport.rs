//! JSON over HTTP, with retries
//!
//! Every remote call of the distributor is a JSON POST: GraphQL queries to
//! the subgraphs and JSON-RPC calls to the Ethereum node. They all go
//! through a [`JsonTransport`] so the fetch logic can be exercised against
//! canned responses.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{DistributorError, DistributorResult};

/// Request timeout of a single HTTP call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// POST a JSON body and return the decoded JSON response
    async fn post_json(&self, url: &str, body: &Value) -> DistributorResult<Value>;
}

/// [`JsonTransport`] over a pooled `reqwest` client
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> DistributorResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> DistributorResult<Value> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

/// Run `op` until it succeeds, retrying transient failures with exponential
/// backoff.
pub async fn with_retry<T, F, Fut>(retry: &RetryConfig, what: &str, mut op: F) -> DistributorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DistributorResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    what, attempt, retry.max_retries, e, delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses and records every request body
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<DistributorResult<Value>>>,
        pub requests: Mutex<Vec<(String, Value)>>,
    }

    impl MockTransport {
        pub fn new(responses: impl IntoIterator<Item = DistributorResult<Value>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                requests: Mutex::default(),
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, i: usize) -> Value {
            self.requests.lock().unwrap()[i].1.clone()
        }
    }

    #[async_trait]
    impl JsonTransport for MockTransport {
        async fn post_json(&self, url: &str, body: &Value) -> DistributorResult<Value> {
            self.requests.lock().unwrap().push((url.to_string(), body.clone()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DistributorError::Rpc("no response queued".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Local HTTP endpoint answering every request with `status`, counting requests
    async fn serve_status(status: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicU32::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                read_request(&mut stream).await;
                let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, hits)
    }

    /// Consume headers and body so closing the socket does not reset it
    async fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let Ok(n) = stream.read(&mut buf).await else { return };
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request).to_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|len| len.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    async fn post_with_retry(url: &str, retry: &RetryConfig) -> DistributorResult<Value> {
        let transport = HttpTransport::new().unwrap();
        let body = json!({ "query": "{safes {id}}" });
        with_retry(retry, "test request", || transport.post_json(url, &body)).await
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, hits) = serve_status("400 Bad Request").await;

        let err = post_with_retry(&url, &fast_retry(3)).await.unwrap_err();
        assert!(matches!(err, DistributorError::Http(_)));
        assert!(!err.is_transient());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, hits) = serve_status("503 Service Unavailable").await;

        let err = post_with_retry(&url, &fast_retry(2)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refused_connections_are_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = post_with_retry(&url, &fast_retry(1)).await.unwrap_err();
        assert!(err.is_transient());
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&fast_retry(3), "flaky call", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DistributorError::Rpc("timeout".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: DistributorResult<()> = with_retry(&fast_retry(2), "dead call", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DistributorError::Rpc("down".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_parse_errors() {
        let calls = &AtomicU32::new(0);
        let result: DistributorResult<()> = with_retry(&fast_retry(5), "bad payload", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DistributorError::parse("garbage"))
        })
        .await;

        assert!(matches!(result, Err(DistributorError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
