use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How a request authenticates against the remote service.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    Header(&'a str, &'a str),
    Basic { username: &'a str, password: &'a str },
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay_ms: u64,
}

impl HttpClient {
    /// `timeout: None` leaves requests unbounded.
    pub fn new(user_agent: &str, timeout: Option<Duration>, max_retries: u32) -> Result<Self> {
        let mut builder = Client::builder().user_agent(user_agent);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            client,
            max_retries,
            base_delay_ms: 1000,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.request_with_retry(|| self.client.get(url).query(query))
            .await
    }

    pub async fn post_json_raw(&self, url: &str, body: &str, auth: Auth<'_>) -> Result<String> {
        self.request_with_retry(|| {
            let req = self
                .client
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json")
                .body(body.to_string());
            match auth {
                Auth::None => req,
                Auth::Header(k, v) => req.header(k, v),
                Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            }
        })
        .await
    }

    async fn request_with_retry<F>(&self, build: F) -> Result<String>
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
                Ok(resp) => return self.handle_response(resp).await,
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

    async fn handle_response(&self, resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let url = resp.url().to_string();

        if status.is_success() {
            return resp.text().await.map_err(|e| Error::http(e.to_string()));
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(Error::RateLimit {
                    platform: extract_domain(&url),
                    retry_after_secs: retry_after,
                })
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::api_with_status(
                    extract_domain(&url),
                    body,
                    status.as_u16(),
                ))
            }
        }
    }
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .and_then(|s| s.split('?').next())
        .unwrap_or("unknown")
        .to_string()
}
