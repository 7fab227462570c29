//! Shared HTTP client with per-call timeout and transport retries
//!
//! GET requests are retried on timeouts, connection failures and 5xx
//! responses. POSTs are sent once; a failed delivery fails the batch, which
//! is redelivered in full on the next run.

use crate::retry::RetryPolicy;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use std::time::Duration;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, reqwest::Error> {
        Self::with_retry(
            timeout,
            RetryPolicy {
                initial_delay: INITIAL_RETRY_DELAY,
                max_delay: MAX_RETRY_DELAY,
                max_retries,
            },
        )
    }

    pub fn with_retry(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("diffwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    pub async fn get(&self, url: &Url) -> Result<Response, reqwest::Error> {
        let mut backoff = self.retry.start();
        let what = format!("GET {}", url);

        loop {
            match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_server_error() => {
                    log::debug!("GET {} returned {}", url, response.status());
                    if backoff.wait(&what).await.is_err() {
                        return Ok(response);
                    }
                }
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) => {
                    log::debug!("GET {} failed: {}", url, e);
                    if backoff.wait(&what).await.is_err() {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        self.client.post(url.clone()).json(body).send().await
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
