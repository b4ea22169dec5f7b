use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;

/// HTTP client that bounds every request with a timeout and retries
/// connection failures, timeouts and 5xx responses with exponential backoff.
/// 4xx responses are returned to the caller untouched.
#[derive(Clone)]
pub struct RetryingClient {
    client: Client,
    max_attempts: usize,
    base_backoff: Duration,
}

impl RetryingClient {
    pub fn new(timeout: Duration, max_attempts: usize) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(250),
        })
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn request<U: reqwest::IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(current) = builder.try_clone() else {
                // Streaming bodies cannot be replayed.
                return builder.send().await;
            };
            let last = attempt >= self.max_attempts;

            match current.send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, url = %response.url(), %status, "calendar provider response");
                    if status.is_server_error() && !last {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "calendar provider request failed");
                    if !last && is_transient(&err) {
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(8) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    async fn backoff(&self, attempt: usize) {
        let delay = self.backoff_delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::StatusCode;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(attempts: usize) -> RetryingClient {
        RetryingClient::new(Duration::from_secs(5), attempts)
            .unwrap()
            .with_base_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        Mock::given(method("GET"))
            .respond_with(move |_: &wiremock::Request| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let client = client(3);
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(2);
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(3);
        let response = client
            .send(client.request(Method::POST, server.uri()).json(&serde_json::json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn connection_failures_surface_after_retries() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(2);
        let result = client
            .send(client.request(Method::GET, format!("http://{}", addr)))
            .await;
        assert!(result.unwrap_err().is_connect());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let client = client(5);
        assert_eq!(client.backoff_delay(1), Duration::from_millis(5));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(10));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(20));
    }
}
