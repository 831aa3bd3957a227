//! Authenticated JSON client shared by the Key Vault, resource-manager and
//! App Service calls.
//!
//! Uses reqwest-middleware for transient retries; every request carries a
//! fresh `x-ms-client-request-id`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::auth::TokenSource;
use super::cloud::Endpoints;
use crate::config::Config;
use crate::errors::{AkvError, Result};
use crate::models::credential::Credential;

const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Base HTTP client (also used directly for token requests).
pub fn http_client(cfg: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(8)
        .timeout(cfg.http_timeout())
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AkvError::Http(format!("failed to build HTTP client: {}", e)))
}

/// One page of an ARM / Key Vault collection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    pub next_link: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Turns a non-success response body into [`AkvError::Provider`].
pub fn provider_error(status: StatusCode, body: &str) -> AkvError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => (env.error.code, env.error.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("Error").replace(' ', ""),
            body.chars().take(300).collect(),
        ),
    };
    AkvError::Provider {
        status: status.as_u16(),
        code,
        message: message.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

#[derive(Deserialize)]
struct AsyncOperation {
    #[serde(default)]
    status: String,
    error: Option<ErrorBody>,
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl RawResponse {
    fn json<T: DeserializeOwned>(&self) -> Result<T> {
        // Empty bodies (204, some 200s) deserialize as null.
        let text = if self.body.trim().is_empty() { "null" } else { &self.body };
        Ok(serde_json::from_str(text)?)
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

pub struct RestClient {
    client: ClientWithMiddleware,
    tokens: Arc<TokenSource>,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl RestClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenSource>, cfg: &Config) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(cfg.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            tokens,
            poll_interval: cfg.poll_interval(),
            poll_max_attempts: cfg.poll_max_attempts.max(1),
        }
    }

    /// Client authenticating as `credential` against `endpoints`.
    pub fn for_credential(credential: &Credential, endpoints: &Endpoints, cfg: &Config) -> Result<Self> {
        let http = http_client(cfg)?;
        let tokens = Arc::new(TokenSource::new(credential.clone(), endpoints.clone(), http.clone()));
        Ok(Self::new(http, tokens, cfg))
    }

    pub fn tokens(&self) -> &Arc<TokenSource> {
        &self.tokens
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn poll_max_attempts(&self) -> u32 {
        self.poll_max_attempts
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let token = self.tokens.token(resource).await?;
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(%method, url, request_id = %request_id, "azure request");

        let mut req = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(b) = body {
            req = req.json(b);
        } else if method == Method::POST || method == Method::PUT {
            req = req.header(reqwest::header::CONTENT_LENGTH, "0");
        }

        let resp = req.send().await.map_err(|e| {
            warn!(url, error = %e, "azure request failed after retries");
            AkvError::from(e)
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        debug!(url, status = status.as_u16(), "azure response");
        Ok(RawResponse { status, headers, body })
    }

    async fn call(
        &self,
        method: Method,
        resource: &str,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let raw = self.send(method, resource, url, body).await?;
        if raw.status.is_success() {
            Ok(raw)
        } else {
            Err(provider_error(raw.status, &raw.body))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, resource: &str, url: &str) -> Result<T> {
        self.call(Method::GET, resource, url, None).await?.json()
    }

    /// GET that maps 404 to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, resource: &str, url: &str) -> Result<Option<T>> {
        match self.call(Method::GET, resource, url, None).await {
            Ok(raw) => raw.json().map(Some),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        resource: &str,
        url: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let body = body.map(serde_json::to_value).transpose()?;
        self.call(Method::POST, resource, url, body.as_ref()).await?.json()
    }

    /// PUT that follows an ARM long-running operation to completion before
    /// returning the final resource.
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        resource: &str,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let raw = self.call(Method::PUT, resource, url, Some(&body)).await?;

        if raw.status == StatusCode::CREATED || raw.status == StatusCode::ACCEPTED {
            if let Some(op_url) = raw.header("azure-asyncoperation") {
                self.await_async_operation(resource, &op_url).await?;
                return self.get(resource, url).await;
            }
            if raw.status == StatusCode::ACCEPTED {
                if let Some(location) = raw.header("location") {
                    return self.await_location(resource, &location).await;
                }
            }
        }
        raw.json()
    }

    pub async fn delete<T: DeserializeOwned>(&self, resource: &str, url: &str) -> Result<T> {
        self.call(Method::DELETE, resource, url, None).await?.json()
    }

    /// Follows `nextLink` until the collection is exhausted.
    pub async fn list_all<T: DeserializeOwned>(&self, resource: &str, first_url: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_url.to_string());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(resource, &url).await?;
            pages += 1;
            items.extend(page.value);
            next = page.next_link.filter(|l| !l.is_empty());
        }

        debug!(url = first_url, pages, items = items.len(), "collection listed");
        Ok(items)
    }

    async fn await_async_operation(&self, resource: &str, op_url: &str) -> Result<()> {
        for attempt in 1..=self.poll_max_attempts {
            let op: AsyncOperation = self.get(resource, op_url).await?;
            match op.status.to_ascii_lowercase().as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" | "cancelled" => {
                    let (code, message) = op
                        .error
                        .map(|e| (e.code, e.message))
                        .unwrap_or_else(|| (op.status.clone(), "operation did not complete".into()));
                    return Err(AkvError::Provider {
                        status: 200,
                        code,
                        message,
                    });
                }
                other => {
                    debug!(attempt, status = other, "long-running operation in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Err(AkvError::Http(format!(
            "long-running operation did not finish after {} polls",
            self.poll_max_attempts
        )))
    }

    async fn await_location<T: DeserializeOwned>(&self, resource: &str, location: &str) -> Result<T> {
        for attempt in 1..=self.poll_max_attempts {
            let raw = self.call(Method::GET, resource, location, None).await?;
            if raw.status != StatusCode::ACCEPTED {
                return raw.json();
            }
            debug!(attempt, "long-running operation in progress");
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(AkvError::Http(format!(
            "long-running operation did not finish after {} polls",
            self.poll_max_attempts
        )))
    }
}
