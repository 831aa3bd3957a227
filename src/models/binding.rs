//! Hosting-platform records. The platform owns all of these; the reconciler
//! only reads them and conditionally rewrites bindings.

use serde::{Deserialize, Serialize};

use super::certificate::Thumbprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SslState {
    #[default]
    Disabled,
    SniEnabled,
    IpBasedEnabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSite {
    pub id: String,
    pub name: String,
    pub location: String,
    pub server_farm_id: Option<String>,
    pub host_names: Vec<String>,
    pub repository_site_name: Option<String>,
}

impl WebSite {
    pub fn resource_group(&self) -> Option<&str> {
        resource_group_of(&self.id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        segment_after(&self.id, "subscriptions")
    }
}

/// A platform-native certificate resource that references a vault secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCertificate {
    pub id: String,
    pub name: String,
    pub location: String,
    pub thumbprint: Option<Thumbprint>,
    pub host_names: Vec<String>,
    pub key_vault_id: Option<String>,
    pub key_vault_secret_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSiteBinding {
    pub id: String,
    pub site_id: String,
    pub hostname: String,
    pub thumbprint: Option<Thumbprint>,
    pub ssl_state: SslState,
    pub site_name: Option<String>,
}

/// Reference to a certificate stored in a vault, as the platform needs it to
/// pull the secret itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultCertificateRef {
    pub vault_resource_id: String,
    pub secret_name: String,
}

// ── ARM wire shapes ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct SiteResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub properties: SiteProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SiteProperties {
    #[serde(default)]
    pub host_names: Vec<String>,
    pub server_farm_id: Option<String>,
    pub repository_site_name: Option<String>,
}

impl From<SiteResource> for WebSite {
    fn from(r: SiteResource) -> Self {
        WebSite {
            id: r.id,
            name: r.name,
            location: r.location,
            server_farm_id: r.properties.server_farm_id,
            host_names: r.properties.host_names,
            repository_site_name: r.properties.repository_site_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CertificateResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub properties: CertificateProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CertificateProperties {
    pub thumbprint: Option<String>,
    #[serde(default)]
    pub host_names: Vec<String>,
    pub key_vault_id: Option<String>,
    pub key_vault_secret_name: Option<String>,
}

impl From<CertificateResource> for PlatformCertificate {
    fn from(r: CertificateResource) -> Self {
        PlatformCertificate {
            id: r.id,
            name: r.name,
            location: r.location,
            // The platform hands thumbprints back quoted.
            thumbprint: r.properties.thumbprint.as_deref().and_then(Thumbprint::parse),
            host_names: r.properties.host_names,
            key_vault_id: r.properties.key_vault_id,
            key_vault_secret_name: r.properties.key_vault_secret_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BindingResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: BindingProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BindingProperties {
    pub site_name: Option<String>,
    pub ssl_state: Option<SslState>,
    pub thumbprint: Option<String>,
}

impl BindingResource {
    pub fn into_binding(self, site_id: &str) -> HostSiteBinding {
        // Binding names come back as "site/hostname".
        let hostname = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&self.name)
            .to_string();
        HostSiteBinding {
            id: self.id,
            site_id: site_id.to_string(),
            hostname,
            thumbprint: self.properties.thumbprint.as_deref().and_then(Thumbprint::parse),
            ssl_state: self.properties.ssl_state.unwrap_or_default(),
            site_name: self.properties.site_name,
        }
    }
}

/// Value of the segment following `key` in an ARM resource id
/// (case-insensitive key match).
pub fn segment_after<'a>(resource_id: &'a str, key: &str) -> Option<&'a str> {
    let mut parts = resource_id.split('/').filter(|s| !s.is_empty());
    while let Some(p) = parts.next() {
        if p.eq_ignore_ascii_case(key) {
            return parts.next();
        }
    }
    None
}

pub fn resource_group_of(resource_id: &str) -> Option<&str> {
    segment_after(resource_id, "resourceGroups")
}
