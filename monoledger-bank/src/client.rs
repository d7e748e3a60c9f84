//! Monobank personal API client with throttle-aware retries.

use chrono::{DateTime, Utc};
use monoledger_core::Transaction;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::{Account, ClientInfo, WebhookAck, WebhookRegistration};
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.monobank.ua";

#[derive(Debug, Clone)]
pub struct MonoClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl MonoClient {
    pub fn new(token: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Token",
            HeaderValue::from_str(token).map_err(|_| ApiError::InvalidToken)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET `endpoint`, waiting out throttling per the retry policy.
    pub async fn request(&self, endpoint: &str) -> Result<Response, ApiError> {
        self.send(Method::GET, endpoint, None).await
    }

    /// POST a JSON body to `endpoint`; a throttled call re-sends the same body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        let payload = serde_json::to_vec(body)?;
        self.send(Method::POST, endpoint, Some(payload)).await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut attempt: u32 = 1;

        loop {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = &payload {
                req = req
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(%endpoint, error = %e, "bank API unreachable");
                    return Err(ApiError::Transport(e));
                }
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if !self.retry.allows(attempt + 1) {
                    warn!(%endpoint, attempt, "bank API still throttling, giving up");
                    return Err(ApiError::RateLimited { attempts: attempt });
                }
                warn!(
                    %endpoint,
                    attempt,
                    backoff_secs = self.retry.backoff.as_secs_f64(),
                    "too many requests, will try again after back-off"
                );
                tokio::time::sleep(self.retry.backoff).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(%endpoint, status = status.as_u16(), %body, "bank API error");
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            debug!(%endpoint, status = status.as_u16(), attempt, "bank API ok");
            return Ok(resp);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let bytes = self.request(endpoint).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn client_info(&self) -> Result<ClientInfo, ApiError> {
        self.get_json("/personal/client-info").await
    }

    /// True only when the token resolves to a client with a non-empty id.
    pub async fn validate(&self) -> bool {
        match self.client_info().await {
            Ok(info) => !info.client_id.is_empty(),
            Err(e) => {
                debug!(error = %e, "token validation failed");
                false
            }
        }
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, ApiError> {
        Ok(self.client_info().await?.accounts)
    }

    /// Statement for `account` from `from` (optionally until `to`), oldest window bound first.
    pub async fn statement(
        &self,
        account: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, ApiError> {
        self.get_json(&statement_path(account, from, to)).await
    }

    pub async fn set_webhook(&self, url: &str) -> Result<WebhookAck, ApiError> {
        let body = WebhookRegistration {
            web_hook_url: url.to_string(),
        };
        let bytes = self.post("/personal/webhook", &body).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn statement_path(account: &str, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> String {
    match to {
        Some(to) => format!(
            "/personal/statement/{account}/{}/{}",
            from.timestamp_millis(),
            to.timestamp_millis()
        ),
        None => format!("/personal/statement/{account}/{}", from.timestamp_millis()),
    }
}
