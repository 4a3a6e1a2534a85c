//! HTTP client with rate limiting and bounded concurrency for provider APIs.
//!
//! This module provides a wrapper around `reqwest::Client` that composes the
//! two per-provider limiters, outermost first:
//!
//! 1. A token bucket refilled at `requests_per_minute / 60` tokens per
//!    second, with burst capacity equal to the full per-minute quota.
//! 2. A concurrency semaphore of `max_connections` permits, so a provider's
//!    fixed-size connection pool is never exhausted.
//!
//! Both are applied around every provider API call. The byte-transfer phase
//! has its own *global* semaphore owned by the download queue, deliberately
//! decoupled from these limiters so API calls never starve under heavy
//! transfer load.
//!
//! # Example
//!
//! ```rust
//! use ripstream::http::Client;
//!
//! let client = Client::without_cookies(600, 6)?;
//! let request = client.get(url.parse()?);
//! let response = client.execute(request).await?;
//! ```

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{self, cookie::CookieStore, Method, Url};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Rate-limited HTTP client for a single provider.
///
/// Wraps `reqwest::Client` to provide:
/// * Token-bucket rate limiting per the provider's API quota
/// * A concurrency cap on in-flight API calls
/// * Optional cookie storage for cookie-authenticated providers
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to the underlying client without rate limiting.
    /// Byte transfers use this: they are gated by the global download
    /// semaphore instead.
    pub unlimited: reqwest::Client,

    /// Token bucket for API quota compliance.
    rate_limiter: DefaultDirectRateLimiter,

    /// Cap on concurrently in-flight API calls.
    semaphore: Arc<Semaphore>,

    /// Cookie storage, present for cookie-authenticated providers.
    pub cookie_jar: Option<Arc<dyn CookieStore>>,
}

impl Client {
    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Seconds per rate-limit window.
    const WINDOW: Duration = Duration::from_secs(60);

    /// Creates a new client with the given quota and concurrency cap.
    ///
    /// # Arguments
    ///
    /// * `requests_per_minute` - token bucket refill per minute; also the
    ///   burst capacity
    /// * `max_connections` - maximum concurrently in-flight API calls
    /// * `cookie_jar` - optional cookie storage implementation
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` if the HTTP client cannot be built or
    /// `requests_per_minute` is zero.
    pub fn new<C>(
        requests_per_minute: u32,
        max_connections: usize,
        cookie_jar: Option<C>,
    ) -> Result<Self>
    where
        C: CookieStore + 'static,
    {
        let cookie_jar = cookie_jar.map(|jar| Arc::new(jar));

        let mut http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ));

        if let Some(ref jar) = cookie_jar {
            http_client = http_client.cookie_provider(Arc::clone(jar));
        }

        // Rate limit our own requests as to not DoS the provider
        // infrastructure.
        let calls = NonZeroU32::new(requests_per_minute)
            .ok_or_else(|| Error::config("requests_per_minute is zero"))?;
        let replenish_interval = Self::WINDOW / requests_per_minute;
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| Error::config("quota time interval is zero"))?
            .allow_burst(calls);

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
            semaphore: Arc::new(Semaphore::new(max_connections.max(1))),
            cookie_jar: cookie_jar.map(|jar| jar as _), // coerce compiler to infer type
        })
    }

    /// Creates a new client without cookie storage.
    ///
    /// # Errors
    ///
    /// Returns error if client creation fails.
    pub fn without_cookies(requests_per_minute: u32, max_connections: usize) -> Result<Self> {
        // Need to specify a type that satisfies the trait bounds.
        Self::new(
            requests_per_minute,
            max_connections,
            None::<reqwest::cookie::Jar>,
        )
    }

    /// Builds a request with the specified method and URL.
    pub fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.unlimited.request(method, url)
    }

    /// Builds a GET request.
    pub fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Builds a POST request.
    pub fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Executes a request under both limiters.
    ///
    /// Waits for a concurrency permit, then for the token bucket, then
    /// performs the request. Responses with error status codes are *not*
    /// turned into errors here; callers decide what a status means.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Transport` on network failure.
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::cancelled(e.to_string()))?;
        self.rate_limiter.until_ready().await;
        request.send().await.map_err(Into::into)
    }

    /// Executes a request and deserializes the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Transport` on network failure and
    /// `ErrorKind::Parse` if the body is not valid JSON.
    pub async fn execute_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value> {
        let response = self.execute(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Into::into)
    }
}
