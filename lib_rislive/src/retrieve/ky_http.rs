//! # HTTP Retrieval Utilities
//!
//! A small asynchronous API client around `reqwest`. It includes middleware
//! support for exponential backoff retries and standardized response handling:
//! non-2xx statuses are reported in the [`ApiResponse`], not as errors.

use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully decoded response body, if any.
    pub data: Option<T>,
    /// The raw body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// Transport settings for an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for a whole request, retries excluded.
    pub timeout: Duration,
    /// Transient failures (connect errors, 5xx, 429) are retried this many times.
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            user_agent: concat!("bgpvalidator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An asynchronous HTTP client bound to one endpoint.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// Every request goes to this URL; only the query string varies.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL or the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: &str, options: &ClientOptions) -> anyhow::Result<Self> {
        let url = Url::parse(base_url).with_context(|| format!("invalid base URL '{}'", base_url))?;

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { inner: client, base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GETs the endpoint and returns the body as text.
    ///
    /// # Errors
    /// Returns an error only if the request could not be executed or the body
    /// could not be read.
    pub async fn get_text(&self, query: &[(&str, &str)]) -> anyhow::Result<ApiResponse<String>> {
        let response = self.inner.get(self.base_url.clone()).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            Ok(ApiResponse {
                data: Some(body),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            Ok(ApiResponse {
                data: None,
                error_body: Some(body),
                status: status.as_u16(),
                success: false,
            })
        }
    }

    /// GETs the endpoint and decodes a 2xx body as JSON.
    ///
    /// # Errors
    /// In addition to [`get_text`](Self::get_text) failures, a 2xx body that
    /// does not decode into `T` is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, query: &[(&str, &str)]) -> anyhow::Result<ApiResponse<T>> {
        let response = self.get_text(query).await?;
        let data = match response.data {
            Some(body) => Some(
                serde_json::from_str::<T>(&body)
                    .with_context(|| format!("unexpected response body from {}", self.base_url))?,
            ),
            None => None,
        };

        Ok(ApiResponse {
            data,
            error_body: response.error_body,
            status: response.status,
            success: response.success,
        })
    }
}
