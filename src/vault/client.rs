//! Key Vault data-plane client (certificates, api-version 7.4).

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::x509::X509;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{pkcs12, CertificateListing, CertificateStore, ImportOptions, ImportOutcome};
use crate::azure::cloud::Endpoints;
use crate::azure::rest::RestClient;
use crate::config::Config;
use crate::errors::{AkvError, Result};
use crate::models::binding::{segment_after, VaultCertificateRef};
use crate::models::certificate::{merge_tags, CertificateRecord, Thumbprint};
use crate::models::credential::Credential;
use crate::models::location::VaultLocation;

pub(crate) const VAULT_API_VERSION: &str = "7.4";

// ── Wire types ─────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Attributes {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CertificateItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct KeyProperties {
    exportable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CertificatePolicy {
    key_props: Option<KeyProperties>,
}

#[derive(Debug, Deserialize)]
struct CertificateBundle {
    id: String,
    kid: Option<String>,
    x5t: Option<String>,
    cer: Option<String>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
    policy: Option<CertificatePolicy>,
}

impl CertificateBundle {
    fn into_record(self) -> Result<CertificateRecord> {
        let mut segments = self.id.rsplit('/');
        let tail = segments.next().unwrap_or_default().to_string();
        // ids are `{vault}/certificates/{name}[/{version}]`
        let alias = segment_after(&self.id, "certificates")
            .map(str::to_string)
            .unwrap_or_else(|| tail.clone());
        let version = if tail == alias { String::new() } else { tail };

        let der = match &self.cer {
            Some(c) => base64::engine::general_purpose::STANDARD
                .decode(c)
                .map_err(|e| AkvError::Http(format!("certificate '{}' has undecodable contents: {}", alias, e)))?,
            None => Vec::new(),
        };
        let parsed = (!der.is_empty()).then(|| X509::from_der(&der).ok()).flatten();

        let thumbprint = self
            .x5t
            .as_deref()
            .and_then(Thumbprint::from_x5t)
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|c| c.digest(MessageDigest::sha1()).ok())
                    .map(|d| Thumbprint::from_bytes(&d))
            })
            .ok_or_else(|| AkvError::Http(format!("certificate '{}' has no thumbprint", alias)))?;

        let san_list = parsed
            .as_ref()
            .and_then(|c| c.subject_alt_names())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.dnsname().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let exportable = self
            .policy
            .and_then(|p| p.key_props)
            .and_then(|k| k.exportable)
            .unwrap_or(true);

        Ok(CertificateRecord {
            alias,
            version,
            thumbprint,
            san_list,
            tags: self.tags.unwrap_or_default(),
            has_private_key: self.kid.is_some() && exportable,
            enabled: self.attributes.enabled.unwrap_or(true),
            certificate_der: der,
        })
    }
}

// ── Client ─────────────────────────────────────────────────────

/// Client for one vault. Owns its credential and token cache.
pub struct VaultClient {
    pub(crate) rest: RestClient,
    pub(crate) endpoints: Endpoints,
    pub(crate) location: VaultLocation,
    vault_url: String,
}

impl VaultClient {
    pub fn new(
        location: VaultLocation,
        credential: &Credential,
        private_endpoint: Option<&str>,
        cfg: &Config,
    ) -> Result<Self> {
        let endpoints = Endpoints::new(location.cloud, private_endpoint, cfg);
        let rest = RestClient::for_credential(credential, &endpoints, cfg)?;
        Ok(Self::with_rest(location, endpoints, rest))
    }

    pub fn with_rest(location: VaultLocation, endpoints: Endpoints, rest: RestClient) -> Self {
        let vault_url = endpoints.vault_url(&location.vault_name);
        Self {
            rest,
            endpoints,
            location,
            vault_url,
        }
    }

    pub fn location(&self) -> &VaultLocation {
        &self.location
    }

    /// Reference App Service uses to pull `alias` out of this vault.
    pub fn certificate_ref(&self, alias: &str) -> VaultCertificateRef {
        VaultCertificateRef {
            vault_resource_id: self.location.resource_id(),
            secret_name: alias.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}?api-version={}", self.vault_url, path, VAULT_API_VERSION)
    }

    fn cert_url(&self, alias: &str, suffix: &str) -> String {
        self.url(&format!("certificates/{}{}", urlencoding::encode(alias), suffix))
    }

    async fn list_items(&self) -> Result<Vec<CertificateItem>> {
        let resource = self.endpoints.vault_resource();
        self.rest.list_all(&resource, &self.url("certificates")).await
    }

    /// Lists certificate ids, repairing the access policy once on 403.
    async fn list_items_with_repair(&self) -> Result<Vec<CertificateItem>> {
        match self.list_items().await {
            Err(e) if e.is_forbidden() => {
                warn!(
                    vault = %self.location.vault_name,
                    error = %e.one_line(),
                    "certificate list forbidden; granting caller certificate permissions and retrying"
                );
                self.grant_certificate_permissions().await?;
                self.rest.tokens().invalidate();
                self.list_items().await
            }
            other => other,
        }
    }

    async fn find_deleted(&self, alias: &str) -> Result<bool> {
        let resource = self.endpoints.vault_resource();
        let url = self.url(&format!("deletedcertificates/{}", urlencoding::encode(alias)));
        Ok(self.rest.get_optional::<Value>(&resource, &url).await?.is_some())
    }

    /// Recovers a soft-deleted certificate and waits until it is readable.
    async fn recover_deleted(&self, alias: &str) -> Result<CertificateRecord> {
        let resource = self.endpoints.vault_resource();
        let url = self.url(&format!("deletedcertificates/{}/recover", urlencoding::encode(alias)));
        info!(vault = %self.location.vault_name, alias, "recovering soft-deleted certificate before import");
        let _: Value = self.rest.post::<Value, _>(&resource, &url, None).await?;

        for attempt in 1..=self.rest.poll_max_attempts() {
            if let Some(record) = self.get_certificate(alias).await? {
                debug!(alias, attempt, "recovered certificate is readable");
                return Ok(record);
            }
            tokio::time::sleep(self.rest.poll_interval()).await;
        }
        Err(AkvError::Http(format!(
            "certificate '{}' was recovered but did not become readable after {} polls",
            alias,
            self.rest.poll_max_attempts()
        )))
    }
}

#[async_trait]
impl CertificateStore for VaultClient {
    async fn list_certificates(&self) -> Result<CertificateListing> {
        let items = self.list_items_with_repair().await?;
        let total = items.len();
        let mut listing = CertificateListing::default();

        for item in items {
            let alias = segment_after(&item.id, "certificates")
                .unwrap_or(&item.id)
                .to_string();
            match self.get_certificate(&alias).await {
                Ok(Some(record)) => listing.certificates.push(record),
                Ok(None) => listing
                    .failures
                    .push(format!("{}: certificate disappeared during inventory", alias)),
                Err(e) => listing.failures.push(format!("{}: {}", alias, e.one_line())),
            }
        }

        if total > 0 && listing.failures.len() == total {
            return Err(AkvError::Inventory(format!(
                "none of the {} certificates in vault '{}' could be read: {}",
                total,
                self.location.vault_name,
                listing.failures.join("; ")
            )));
        }
        if !listing.failures.is_empty() {
            warn!(
                vault = %self.location.vault_name,
                failed = listing.failures.len(),
                total,
                "some certificates could not be read"
            );
        }
        debug!(vault = %self.location.vault_name, count = listing.certificates.len(), "inventory listed");
        Ok(listing)
    }

    async fn get_certificate(&self, alias: &str) -> Result<Option<CertificateRecord>> {
        let resource = self.endpoints.vault_resource();
        let bundle: Option<CertificateBundle> = self
            .rest
            .get_optional(&resource, &self.cert_url(alias, ""))
            .await?;
        bundle.map(CertificateBundle::into_record).transpose()
    }

    async fn import_certificate(
        &self,
        alias: &str,
        pkcs12: &[u8],
        password: &str,
        tags: &HashMap<String, String>,
        options: ImportOptions,
    ) -> Result<ImportOutcome> {
        let existing = match self.get_certificate(alias).await? {
            Some(_) if !options.overwrite => {
                info!(alias, "certificate exists and overwrite is not set; skipping import");
                return Ok(ImportOutcome::Skipped(format!(
                    "Certificate '{}' already exists in vault '{}' and overwrite was not requested.",
                    alias, self.location.vault_name
                )));
            }
            Some(active) => Some(active),
            None => {
                if self.find_deleted(alias).await? {
                    Some(self.recover_deleted(alias).await?)
                } else {
                    None
                }
            }
        };

        let tags = match &existing {
            Some(current) => merge_tags(tags, &current.tags, options.preserve_tags),
            None => tags.clone(),
        };

        let collapsed = pkcs12::collapse(pkcs12, password, alias)?;
        let body = json!({
            "value": base64::engine::general_purpose::STANDARD.encode(&collapsed.der),
            "tags": tags,
        });

        let resource = self.endpoints.vault_resource();
        let bundle: CertificateBundle = self
            .rest
            .post(&resource, &self.cert_url(alias, "/import"), Some(&body))
            .await?;
        let record = bundle.into_record()?;
        info!(
            vault = %self.location.vault_name,
            alias,
            thumbprint = %record.thumbprint,
            replaced = existing.is_some(),
            "certificate imported"
        );
        Ok(ImportOutcome::Imported(record))
    }

    async fn delete_certificate(&self, alias: &str) -> Result<CertificateRecord> {
        let resource = self.endpoints.vault_resource();
        let bundle: CertificateBundle = match self.rest.delete(&resource, &self.cert_url(alias, "")).await {
            Err(e) if e.is_not_found() => {
                return Err(AkvError::NotFound(format!(
                    "certificate '{}' does not exist in vault '{}'",
                    alias, self.location.vault_name
                )))
            }
            other => other?,
        };
        info!(vault = %self.location.vault_name, alias, "certificate deleted");
        bundle.into_record()
    }
}
