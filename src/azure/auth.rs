//! Bearer-token acquisition for the selected credential.
//!
//! Implements three token sources:
//! - service principal: OAuth2 client-credentials grant against the authority
//! - managed identity: App Service identity endpoint when present, else IMDS
//! - static: a fixed token (tests, local debugging with `--access-token`)
//!
//! Tokens are cached per resource until shortly before expiry. Providers are
//! built lazily by [`TokenSource`], which can be invalidated to force fresh
//! credentials after an access-policy change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::cloud::Endpoints;
use crate::errors::{AkvError, Result};
use crate::models::credential::Credential;

/// Tokens are refreshed this long before they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
const DEFAULT_LIFETIME_SECS: u64 = 3600;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Bearer token for `resource` (e.g. `https://management.azure.com`).
    async fn token(&self, resource: &str) -> Result<String>;
}

// ── Cache ──────────────────────────────────────────────────────

#[derive(Default)]
struct TokenCache {
    entries: DashMap<String, (String, Instant)>,
}

impl TokenCache {
    fn get(&self, resource: &str) -> Option<String> {
        let entry = self.entries.get(resource)?;
        let (tok, expiry) = entry.value();
        (Instant::now() < *expiry).then(|| tok.clone())
    }

    fn put(&self, resource: &str, token: &str, lifetime_secs: u64) {
        let expiry = Instant::now() + Duration::from_secs(lifetime_secs).saturating_sub(EXPIRY_SKEW);
        self.entries
            .insert(resource.to_string(), (token.to_string(), expiry));
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
}

impl TokenResponse {
    /// `expires_in` is a number from the authority and a string from IMDS.
    fn lifetime_secs(&self) -> u64 {
        match &self.expires_in {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(DEFAULT_LIFETIME_SECS),
            Some(Value::String(s)) => s.parse().unwrap_or(DEFAULT_LIFETIME_SECS),
            _ => DEFAULT_LIFETIME_SECS,
        }
    }
}

async fn read_token_response(resp: reqwest::Response, source: &str) -> Result<TokenResponse> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.chars().take(200).collect());
        tracing::error!(source, status = %status, "token request rejected");
        return Err(AkvError::Authentication(format!(
            "{} returned {}: {}",
            source,
            status.as_u16(),
            detail.lines().next().unwrap_or_default()
        )));
    }
    serde_json::from_str(&body)
        .map_err(|e| AkvError::Authentication(format!("{} returned an unreadable token: {}", source, e)))
}

fn resource_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

// ── Service Principal ──────────────────────────────────────────

pub struct ServicePrincipalTokenProvider {
    tenant_id: String,
    client_id: String,
    client_secret: zeroize::Zeroizing<String>,
    authority: String,
    client: reqwest::Client,
    cache: TokenCache,
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self, resource: &str) -> Result<String> {
        if let Some(tok) = self.cache.get(resource) {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let scope = resource_scope(resource);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        debug!(tenant_id = %self.tenant_id, client_id = %self.client_id, resource, "requesting service principal token");

        let resp = self.client.post(&url).form(&params).send().await?;
        let tok = read_token_response(resp, "authority").await?;
        self.cache.put(resource, &tok.access_token, tok.lifetime_secs());
        Ok(tok.access_token)
    }
}

// ── Managed Identity ───────────────────────────────────────────

pub struct ManagedIdentityTokenProvider {
    client_id: Option<String>,
    imds_base: String,
    /// `IDENTITY_ENDPOINT` + `IDENTITY_HEADER` (App Service / Functions).
    app_service: Option<(String, String)>,
    client: reqwest::Client,
    cache: TokenCache,
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self, resource: &str) -> Result<String> {
        if let Some(tok) = self.cache.get(resource) {
            return Ok(tok);
        }

        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        if let Some(cid) = &self.client_id {
            query.push(("client_id", cid.as_str()));
        }

        let (req, source) = match &self.app_service {
            Some((endpoint, header)) => (
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&[("api-version", "2019-08-01")]),
                "identity endpoint",
            ),
            None => (
                self.client
                    .get(format!("{}/metadata/identity/oauth2/token", self.imds_base))
                    .header("Metadata", "true")
                    .query(&[("api-version", "2018-02-01")]),
                "IMDS",
            ),
        };
        debug!(
            source,
            user_assigned = self.client_id.is_some(),
            resource,
            "requesting managed identity token"
        );

        let resp = req.query(&query).send().await.map_err(|e| {
            AkvError::Authentication(format!("{} unreachable (is a managed identity assigned?): {}", source, e))
        })?;
        let tok = read_token_response(resp, source).await?;
        self.cache.put(resource, &tok.access_token, tok.lifetime_secs());
        Ok(tok.access_token)
    }
}

// ── Static ─────────────────────────────────────────────────────

pub struct StaticTokenProvider(pub String);

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _resource: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ── Factory ────────────────────────────────────────────────────

/// Builds the provider matching a credential.
pub fn provider_for(
    credential: &Credential,
    endpoints: &Endpoints,
    client: reqwest::Client,
) -> Arc<dyn TokenProvider> {
    match credential {
        Credential::ServicePrincipal {
            tenant_id,
            client_id,
            client_secret,
        } => Arc::new(ServicePrincipalTokenProvider {
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            authority: endpoints.authority.clone(),
            client,
            cache: TokenCache::default(),
        }),
        Credential::ManagedIdentity { client_id, tenant_id } => {
            if let Some(t) = tenant_id {
                // IMDS issues tokens for the identity's home tenant only.
                debug!(tenant_id = %t, "managed identity tokens are issued for the identity's home tenant");
            }
            let app_service = match (
                std::env::var("IDENTITY_ENDPOINT"),
                std::env::var("IDENTITY_HEADER"),
            ) {
                (Ok(e), Ok(h)) if !e.is_empty() && !h.is_empty() => Some((e, h)),
                _ => None,
            };
            Arc::new(ManagedIdentityTokenProvider {
                client_id: client_id.clone(),
                imds_base: endpoints.imds.clone(),
                app_service,
                client,
                cache: TokenCache::default(),
            })
        }
    }
}

type ProviderFactory = Box<dyn Fn() -> Arc<dyn TokenProvider> + Send + Sync>;

/// Lazily built, memoized token provider with an explicit invalidation
/// contract: `invalidate()` drops the cached provider (and its token cache) so
/// the next `provider()` call re-derives everything from the credential.
pub struct TokenSource {
    factory: ProviderFactory,
    cached: Mutex<Option<Arc<dyn TokenProvider>>>,
    generation: AtomicU64,
}

impl TokenSource {
    pub fn new(credential: Credential, endpoints: Endpoints, client: reqwest::Client) -> Self {
        Self::from_factory(Box::new(move || provider_for(&credential, &endpoints, client.clone())))
    }

    /// Source that always yields the same token.
    pub fn fixed(token: impl Into<String>) -> Self {
        let token = token.into();
        Self::from_factory(Box::new(move || Arc::new(StaticTokenProvider(token.clone()))))
    }

    pub fn from_factory(factory: ProviderFactory) -> Self {
        Self {
            factory,
            cached: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> Arc<dyn TokenProvider> {
        let mut guard = match self.cached.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get_or_insert_with(|| (self.factory)()).clone()
    }

    pub async fn token(&self, resource: &str) -> Result<String> {
        self.provider().token(resource).await
    }

    pub fn invalidate(&self) {
        let mut guard = match self.cached.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "token source invalidated");
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

// ── Caller identity ────────────────────────────────────────────

/// Identity claims of the principal a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "oid")]
    pub object_id: String,
    #[serde(rename = "tid")]
    pub tenant_id: String,
    #[serde(rename = "appid", default)]
    pub application_id: Option<String>,
}

/// Reads the identity claims out of a JWT access token. The signature is not
/// verified; the token came straight from the authority.
pub fn caller_identity(token: &str) -> Result<CallerIdentity> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AkvError::Authentication("access token is not a JWT".into()))?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AkvError::Authentication(format!("access token payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AkvError::Authentication(format!("access token lacks oid/tid claims: {}", e)))
}
