use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};

use crate::error::GreetKitError;

/// Default timeout applied to every outgoing request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A simple wrapper on an HTTP client for making requests. Sets defaults such as timeouts and
/// user-agent.
///
/// Requests are sent exactly once. Failures are surfaced to the caller, who decides whether a
/// fresh attempt makes sense.
#[derive(Debug, Clone)]
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
}

impl Request {
    /// Initializes a new `Request` with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Initializes a new `Request` with a custom timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("greetkit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `req`/`get`/`post`.
    ///
    /// Any response, whatever its status, is returned as `Ok`; only transport level failures are
    /// errors.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, GreetKitError> {
        let (client, request) = request_builder.build_split();
        let request = request.map_err(|err| GreetKitError::NetworkError {
            url: err
                .url()
                .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            status: None,
            error: format!("request build failed: {err}"),
        })?;
        let url = request.url().to_string();
        let method = request.method().clone();

        match client.execute(request).await {
            Ok(response) => {
                log::debug!("{method} {url} -> {}", response.status());
                Ok(response)
            }
            Err(err) => {
                let error = if err.is_timeout() {
                    format!("request timed out: {err}")
                } else if err.is_connect() {
                    format!("connection failed: {err}")
                } else {
                    format!("request failed: {err}")
                };
                log::warn!("{method} {url} failed: {error}");
                Err(GreetKitError::NetworkError {
                    url,
                    status: None,
                    error,
                })
            }
        }
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}
