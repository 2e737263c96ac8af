use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Outbound HTTP with retry on transient failures.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay_ms: u64,
}

/// Status and body of a request that was sent without error mapping.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_timeout(user_agent, Duration::from_secs(180))
    }

    pub fn with_timeout(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay_ms: 1000,
        })
    }

    pub async fn post_json_raw(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let resp = self.send_with_retry(|| self.post(url, body, headers)).await?;
        let resp = check_status(resp).await?;
        resp.text().await.map_err(|e| Error::http(e.to_string()))
    }

    /// Like [`post_json_raw`](Self::post_json_raw) but hands back the response
    /// so the caller can consume the body incrementally.
    pub async fn post_json_streaming(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let resp = self.send_with_retry(|| self.post(url, body, headers)).await?;
        check_status(resp).await
    }

    /// Single attempt, any status accepted.
    pub async fn get_unchecked(&self, url: &str) -> Result<RawResponse> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))?;
        into_raw(resp).await
    }

    /// Single attempt, any status accepted.
    pub async fn post_json_unchecked(&self, url: &str, body: &serde_json::Value) -> Result<RawResponse> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))?;
        into_raw(resp).await
    }

    fn post(&self, url: &str, body: &str, headers: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = Error::http("no attempts made");
        let mut delay = self.base_delay_ms;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, delay_ms = delay, "retrying request");
                sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(30_000);
            }

            match build().send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    last_error = Error::http(e.to_string());
                    if e.is_timeout() || e.is_connect() {
                        warn!(attempt, "transient failure, will retry");
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(Error::RateLimit {
            platform: extract_domain(&url),
            retry_after_secs: retry_after,
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::api_with_status(
        extract_domain(&url),
        body,
        status.as_u16(),
    ))
}

async fn into_raw(resp: reqwest::Response) -> Result<RawResponse> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| Error::http(e.to_string()))?;
    Ok(RawResponse { status, body })
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
