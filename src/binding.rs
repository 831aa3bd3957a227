//! App Service binding reconciler (Microsoft.Web, api-version 2022-03-01).
//!
//! Per certificate: Unbound → Imported (platform certificate referencing the
//! vault secret) → Bound (host-name bindings carry its thumbprint) → Unbound.
//! Sites are handled independently; one failing site never stops the others.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::azure::cloud::Endpoints;
use crate::azure::rest::RestClient;
use crate::config::Config;
use crate::errors::{AkvError, Result};
use crate::models::binding::{
    resource_group_of, BindingResource, CertificateResource, HostSiteBinding, PlatformCertificate,
    SiteResource, SslState, VaultCertificateRef, WebSite,
};
use crate::models::certificate::{CertificateRecord, Thumbprint};
use crate::models::credential::Credential;
use crate::vault::management::KEYVAULT_ARM_API_VERSION;

const WEB_API_VERSION: &str = "2022-03-01";
const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VaultResource {
    id: String,
}

/// Aggregate outcome of a multi-site bind or unbind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingReport {
    /// Names of sites now serving the certificate, sorted and unique.
    pub bound_sites: Vec<String>,
    /// Ids of bindings whose thumbprint was cleared.
    pub cleared_bindings: Vec<String>,
    /// Per-site (or per-certificate) failures, single line each.
    pub failures: Vec<String>,
}

impl BindingReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sites matching a host name, plus the resource groups that could not be
/// searched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteSearch {
    pub sites: Vec<WebSite>,
    pub failures: Vec<String>,
}

/// Strips every `*` so `*.contoso.com` searches for `.contoso.com`.
pub fn hostname_search_term(hostname: &str) -> String {
    hostname.replace('*', "").trim().to_ascii_lowercase()
}

/// Whether a certificate host name (possibly `*.`-wildcarded) covers a site
/// host name.
pub fn covers(cert_host: &str, site_host: &str) -> bool {
    let cert_host = cert_host.trim().to_ascii_lowercase();
    let site_host = site_host.trim().to_ascii_lowercase();
    match cert_host.strip_prefix("*.") {
        Some(parent) => site_host
            .split_once('.')
            .map(|(_, rest)| rest == parent)
            .unwrap_or(false),
        None => cert_host == site_host,
    }
}

/// Keeps hosting-platform bindings in step with vault changes.
/// Implementations: [`AppServiceClient`].
#[async_trait]
pub trait CertificateBinder: Send + Sync {
    async fn bind(&self, cert: &CertificateRecord, vault_cert: &VaultCertificateRef) -> Result<BindingReport>;
    async fn unbind(&self, thumbprint: &Thumbprint) -> Result<BindingReport>;
}

pub struct AppServiceClient {
    rest: RestClient,
    endpoints: Endpoints,
    subscription_id: String,
}

impl AppServiceClient {
    pub fn new(subscription_id: &str, credential: &Credential, endpoints: Endpoints, cfg: &Config) -> Result<Self> {
        let rest = RestClient::for_credential(credential, &endpoints, cfg)?;
        Ok(Self::with_rest(subscription_id, endpoints, rest))
    }

    pub fn with_rest(subscription_id: &str, endpoints: Endpoints, rest: RestClient) -> Self {
        Self {
            rest,
            endpoints,
            subscription_id: subscription_id.to_string(),
        }
    }

    fn arm_url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoints.management, path, api_version)
    }

    fn resource(&self) -> String {
        self.endpoints.management_resource()
    }

    async fn resource_groups(&self) -> Result<Vec<String>> {
        let url = self.arm_url(
            &format!("/subscriptions/{}/resourcegroups", self.subscription_id),
            RESOURCE_GROUPS_API_VERSION,
        );
        let groups: Vec<NamedResource> = self.rest.list_all(&self.resource(), &url).await?;
        Ok(groups.into_iter().map(|g| g.name).collect())
    }

    async fn sites_in(&self, resource_group: &str) -> Result<Vec<WebSite>> {
        let url = self.arm_url(
            &format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
                self.subscription_id, resource_group
            ),
            WEB_API_VERSION,
        );
        let sites: Vec<SiteResource> = self.rest.list_all(&self.resource(), &url).await?;
        Ok(sites.into_iter().map(WebSite::from).collect())
    }

    async fn platform_certificates_in(&self, resource_group: &str) -> Result<Vec<PlatformCertificate>> {
        let url = self.arm_url(
            &format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/certificates",
                self.subscription_id, resource_group
            ),
            WEB_API_VERSION,
        );
        let certs: Vec<CertificateResource> = self.rest.list_all(&self.resource(), &url).await?;
        Ok(certs.into_iter().map(PlatformCertificate::from).collect())
    }

    async fn bindings_of(&self, site: &WebSite) -> Result<Vec<HostSiteBinding>> {
        let url = self.arm_url(&format!("{}/hostNameBindings", site.id), WEB_API_VERSION);
        let bindings: Vec<BindingResource> = self.rest.list_all(&self.resource(), &url).await?;
        Ok(bindings.into_iter().map(|b| b.into_binding(&site.id)).collect())
    }

    async fn put_binding(
        &self,
        site: &WebSite,
        hostname: &str,
        thumbprint: Option<&Thumbprint>,
        ssl_state: SslState,
    ) -> Result<HostSiteBinding> {
        let url = self.arm_url(
            &format!("{}/hostNameBindings/{}", site.id, hostname),
            WEB_API_VERSION,
        );
        let site_name = site.repository_site_name.as_deref().unwrap_or(&site.name);
        let body = json!({
            "properties": {
                "siteName": site_name,
                "azureResourceName": site.name,
                "sslState": ssl_state,
                "thumbprint": thumbprint.map(Thumbprint::as_str),
            }
        });
        let updated: BindingResource = self.rest.put(&self.resource(), &url, &body).await?;
        Ok(updated.into_binding(&site.id))
    }

    /// Every site in the subscription with a host name containing `hostname`
    /// (wildcards stripped). Sites are ordered by resource group, then as
    /// listed. A resource group whose sites cannot be listed is recorded in
    /// `failures` and skipped.
    pub async fn find_sites_for_hostname(&self, hostname: &str) -> Result<SiteSearch> {
        let term = hostname_search_term(hostname);
        let mut search = SiteSearch::default();
        if term.is_empty() {
            return Ok(search);
        }

        for group in self.resource_groups().await? {
            let sites = match self.sites_in(&group).await {
                Ok(sites) => sites,
                Err(e) => {
                    warn!(resource_group = %group, error = %e.one_line(), "site listing failed");
                    search
                        .failures
                        .push(format!("resource group '{}': {}", group, e.one_line()));
                    continue;
                }
            };
            search.sites.extend(sites.into_iter().filter(|site| {
                site.host_names
                    .iter()
                    .any(|h| h.to_ascii_lowercase().contains(&term))
            }));
        }
        debug!(hostname, term = %term, sites = search.sites.len(), "sites matched hostname");
        Ok(search)
    }

    /// Creates or updates a platform certificate pointing at the vault
    /// secret, placed next to the site (same resource group, region and plan).
    pub async fn import_into_hosting_platform(
        &self,
        site: &WebSite,
        vault_cert: &VaultCertificateRef,
    ) -> Result<PlatformCertificate> {
        let vault: VaultResource = self
            .rest
            .get(
                &self.resource(),
                &self.arm_url(&vault_cert.vault_resource_id, KEYVAULT_ARM_API_VERSION),
            )
            .await?;
        let current: WebSite = self
            .rest
            .get::<SiteResource>(&self.resource(), &self.arm_url(&site.id, WEB_API_VERSION))
            .await?
            .into();

        let resource_group = current.resource_group().ok_or_else(|| {
            AkvError::Http(format!("site id '{}' carries no resource group", current.id))
        })?;
        let vault_name = vault.id.rsplit('/').next().unwrap_or_default();
        let name = format!("{}-{}", vault_name, vault_cert.secret_name);

        let url = self.arm_url(
            &format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/certificates/{}",
                current.subscription_id().unwrap_or(&self.subscription_id),
                resource_group,
                name
            ),
            WEB_API_VERSION,
        );
        let body = json!({
            "location": current.location,
            "properties": {
                "keyVaultId": vault.id,
                "keyVaultSecretName": vault_cert.secret_name,
                "serverFarmId": current.server_farm_id,
            }
        });
        let created: CertificateResource = self.rest.put(&self.resource(), &url, &body).await?;
        let cert = PlatformCertificate::from(created);
        info!(
            site = %current.name,
            certificate = %cert.name,
            thumbprint = cert.thumbprint.as_ref().map(|t| t.as_str()).unwrap_or(""),
            "platform certificate imported from vault"
        );
        Ok(cert)
    }

    /// Points every site host name covered by the certificate at its
    /// thumbprint.
    pub async fn update_binding(
        &self,
        site: &WebSite,
        cert: &PlatformCertificate,
        ssl_state: SslState,
    ) -> Result<Vec<HostSiteBinding>> {
        let thumbprint = cert.thumbprint.as_ref().ok_or_else(|| {
            AkvError::Http(format!("platform certificate '{}' reports no thumbprint", cert.name))
        })?;

        let mut updated = Vec::new();
        for hostname in site
            .host_names
            .iter()
            .filter(|h| cert.host_names.iter().any(|c| covers(c, h)))
        {
            let binding = self
                .put_binding(site, hostname, Some(thumbprint), ssl_state)
                .await?;
            debug!(site = %site.name, hostname = %hostname, ?ssl_state, "binding updated");
            updated.push(binding);
        }
        Ok(updated)
    }

    /// Clears the thumbprint and disables TLS on every binding of `site` that
    /// carries the certificate. Returns the last cleared binding id.
    pub async fn remove_binding(&self, site: &WebSite, cert: &PlatformCertificate) -> Result<Option<String>> {
        let Some(thumbprint) = cert.thumbprint.as_ref() else {
            return Ok(None);
        };

        let mut cleared = None;
        for binding in self.bindings_of(site).await? {
            if binding.thumbprint.as_ref() != Some(thumbprint) {
                continue;
            }
            self.put_binding(site, &binding.hostname, None, SslState::Disabled)
                .await?;
            debug!(site = %site.name, hostname = %binding.hostname, "binding cleared");
            cleared = Some(binding.id);
        }
        Ok(cleared)
    }

    /// The binding of `site` carrying the certificate's thumbprint, if any.
    pub async fn is_bound(&self, site: &WebSite, cert: &PlatformCertificate) -> Result<Option<HostSiteBinding>> {
        let Some(thumbprint) = cert.thumbprint.as_ref() else {
            return Ok(None);
        };
        Ok(self
            .bindings_of(site)
            .await?
            .into_iter()
            .find(|b| b.thumbprint.as_ref() == Some(thumbprint) && b.ssl_state != SslState::Disabled))
    }

    async fn bind_site(&self, site: &WebSite, vault_cert: &VaultCertificateRef) -> Result<Vec<HostSiteBinding>> {
        let platform = self.import_into_hosting_platform(site, vault_cert).await?;
        self.update_binding(site, &platform, SslState::SniEnabled).await
    }

    /// Imports the vault certificate next to, and binds it on, every site
    /// serving one of its host names.
    pub async fn bind_certificate_from_vault(
        &self,
        cert: &CertificateRecord,
        vault_cert: &VaultCertificateRef,
    ) -> Result<BindingReport> {
        let mut report = BindingReport::default();
        let mut seen = BTreeSet::new();
        let mut bound = BTreeSet::new();

        for hostname in &cert.san_list {
            let search = match self.find_sites_for_hostname(hostname).await {
                Ok(search) => search,
                Err(e) => {
                    warn!(hostname = %hostname, error = %e.one_line(), "site search failed");
                    report
                        .failures
                        .push(format!("hostname '{}': {}", hostname, e.one_line()));
                    continue;
                }
            };
            report.failures.extend(
                search
                    .failures
                    .into_iter()
                    .map(|f| format!("hostname '{}', {}", hostname, f)),
            );

            for site in search.sites {
                if !seen.insert(site.id.clone()) {
                    continue;
                }
                match self.bind_site(&site, vault_cert).await {
                    Ok(bindings) if !bindings.is_empty() => {
                        bound.insert(site.name.clone());
                    }
                    Ok(_) => debug!(site = %site.name, "no site host name is covered by the certificate"),
                    Err(e) => {
                        warn!(site = %site.name, error = %e.one_line(), "binding failed");
                        report.failures.push(format!("site '{}': {}", site.name, e.one_line()));
                    }
                }
            }
        }

        report.bound_sites = bound.into_iter().collect();
        info!(
            alias = %cert.alias,
            sites = report.bound_sites.len(),
            failures = report.failures.len(),
            "certificate bound from vault"
        );
        Ok(report)
    }

    /// Unbinds every platform certificate with `thumbprint` from every site,
    /// then deletes those platform certificates.
    pub async fn unbind_certificate(&self, thumbprint: &Thumbprint) -> Result<BindingReport> {
        let mut report = BindingReport::default();
        let groups = self.resource_groups().await?;

        let mut sites = Vec::new();
        let mut certs = Vec::new();
        for group in &groups {
            match self.sites_in(group).await {
                Ok(found) => sites.extend(found),
                Err(e) => {
                    warn!(resource_group = %group, error = %e.one_line(), "site listing failed");
                    report
                        .failures
                        .push(format!("resource group '{}' sites: {}", group, e.one_line()));
                }
            }
            match self.platform_certificates_in(group).await {
                Ok(found) => certs.extend(
                    found
                        .into_iter()
                        .filter(|c| c.thumbprint.as_ref() == Some(thumbprint)),
                ),
                Err(e) => {
                    warn!(resource_group = %group, error = %e.one_line(), "platform certificate listing failed");
                    report
                        .failures
                        .push(format!("resource group '{}' certificates: {}", group, e.one_line()));
                }
            }
        }

        for cert in &certs {
            let mut cert_clean = true;
            for site in &sites {
                match self.remove_binding(site, cert).await {
                    Ok(Some(id)) => report.cleared_bindings.push(id),
                    Ok(None) => {}
                    Err(e) => {
                        cert_clean = false;
                        warn!(site = %site.name, certificate = %cert.name, error = %e.one_line(), "unbind failed");
                        report.failures.push(format!("site '{}': {}", site.name, e.one_line()));
                    }
                }
            }

            // A certificate still referenced by a binding cannot be deleted.
            if !cert_clean {
                continue;
            }
            let url = self.arm_url(&cert.id, WEB_API_VERSION);
            match self.rest.delete::<Value>(&self.resource(), &url).await {
                Ok(_) => debug!(certificate = %cert.name, rg = resource_group_of(&cert.id).unwrap_or(""), "platform certificate deleted"),
                Err(e) => report
                    .failures
                    .push(format!("platform certificate '{}': {}", cert.name, e.one_line())),
            }
        }

        info!(
            thumbprint = %thumbprint,
            certificates = certs.len(),
            cleared = report.cleared_bindings.len(),
            "certificate unbound"
        );
        Ok(report)
    }
}

#[async_trait]
impl CertificateBinder for AppServiceClient {
    async fn bind(&self, cert: &CertificateRecord, vault_cert: &VaultCertificateRef) -> Result<BindingReport> {
        self.bind_certificate_from_vault(cert, vault_cert).await
    }

    async fn unbind(&self, thumbprint: &Thumbprint) -> Result<BindingReport> {
        self.unbind_certificate(thumbprint).await
    }
}
