//! HTTP transport seam and bounded retry.

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Performs one GET request and returns the response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, query: &[(String, String)]) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed transport with a per-request timeout
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, query: &[(String, String)]) -> Result<Vec<u8>, FetchError> {
        let mut target = url.clone();
        if !query.is_empty() {
            target.query_pairs_mut().extend_pairs(query);
        }
        debug!("GET {}", target);
        let response = self.client.get(target).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Run `op`, retrying transient failures up to `max_retries` times with
/// exponential backoff.
pub async fn with_retry<T, F, Fut>(
    what: &str,
    max_retries: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = max_retries + 1;
    let mut attempts = 0;
    let mut delay = backoff;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what, attempts, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
    }

    /// Local server answering one connection per entry with that status.
    async fn serve(responses: Vec<(u16, &'static str)>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        Url::parse(&format!("http://{}/query", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_stalled_server_times_out_as_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });
        let config = FetchConfig {
            timeout_secs: 1,
            ..FetchConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let url = Url::parse(&format!("http://{}/query", addr)).unwrap();

        let err = transport.get(&url, &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Http(ref e) if e.is_timeout()));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_status_errors() {
        let url = serve(vec![(503, ""), (404, "not here")]).await;
        let transport = HttpTransport::new(&FetchConfig::default()).unwrap();

        let unavailable = transport.get(&url, &[]).await.unwrap_err();
        assert!(matches!(unavailable, FetchError::Status { status: 503, .. }));
        assert!(unavailable.is_retryable());

        let missing = transport.get(&url, &[]).await.unwrap_err();
        assert!(matches!(missing, FetchError::Status { status: 404, .. }));
        assert!(!missing.is_retryable());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_server_error() {
        let url = serve(vec![(429, ""), (200, r#"{"count": 7}"#)]).await;
        let transport = HttpTransport::new(&FetchConfig::default()).unwrap();
        let query = vec![("f".to_string(), "json".to_string())];
        let (transport, url, query) = (&transport, &url, &query);

        let body = with_retry("count", 2, Duration::ZERO, || async move {
            transport.get(url, query).await
        })
        .await
        .unwrap();

        assert_eq!(body, br#"{"count": 7}"#.to_vec());
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("page", 3, Duration::ZERO, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FetchError::Status {
                    url: "http://example.com".to_string(),
                    status: 503,
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry("page", 2, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                url: "http://example.com".to_string(),
                status: 502,
            })
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry("page", 5, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Status {
                url: "http://example.com".to_string(),
                status: 404,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
