//! Sovereign-cloud endpoint table.
//!
//! Each cloud variant maps to a fixed authority host, resource-manager
//! endpoint and Key Vault DNS suffix. A private-endpoint override replaces the
//! vault suffix only.

use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudVariant {
    #[default]
    Public,
    Government,
    China,
    Germany,
}

impl CloudVariant {
    /// Parses the `AzureCloud` store property. Unknown or empty values fall
    /// back to the public cloud.
    pub fn from_property(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("government") | Some("usgovernment") => CloudVariant::Government,
            Some("china") => CloudVariant::China,
            Some("germany") => CloudVariant::Germany,
            _ => CloudVariant::Public,
        }
    }

    pub fn authority_host(&self) -> &'static str {
        match self {
            CloudVariant::Public => "https://login.microsoftonline.com",
            CloudVariant::Government => "https://login.microsoftonline.us",
            CloudVariant::China => "https://login.chinacloudapi.cn",
            CloudVariant::Germany => "https://login.microsoftonline.de",
        }
    }

    pub fn management_endpoint(&self) -> &'static str {
        match self {
            CloudVariant::Public => "https://management.azure.com",
            CloudVariant::Government => "https://management.usgovcloudapi.net",
            CloudVariant::China => "https://management.chinacloudapi.cn",
            CloudVariant::Germany => "https://management.microsoftazure.de",
        }
    }

    pub fn vault_suffix(&self) -> &'static str {
        match self {
            CloudVariant::Public => "vault.azure.net",
            CloudVariant::Government => "vault.usgovcloudapi.net",
            CloudVariant::China => "vault.azure.cn",
            CloudVariant::Germany => "vault.microsoftazure.de",
        }
    }
}

/// Resolved endpoints for one job: the cloud table, with process-level
/// overrides (mock servers, proxies) and the store's private endpoint applied.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub cloud: CloudVariant,
    pub authority: String,
    pub management: String,
    pub imds: String,
    vault_suffix: String,
    vault_url_override: Option<String>,
}

const IMDS_BASE: &str = "http://169.254.169.254";

impl Endpoints {
    pub fn new(cloud: CloudVariant, private_endpoint: Option<&str>, cfg: &Config) -> Self {
        let vault_suffix = match private_endpoint.map(str::trim).filter(|p| !p.is_empty()) {
            // Only a single leading separator is dropped; the rest is verbatim.
            Some(p) => p.strip_prefix('.').unwrap_or(p).to_string(),
            None => cloud.vault_suffix().to_string(),
        };

        Self {
            cloud,
            authority: trim_base(cfg.authority_url.as_deref().unwrap_or(cloud.authority_host())),
            management: trim_base(
                cfg.management_url
                    .as_deref()
                    .unwrap_or(cloud.management_endpoint()),
            ),
            imds: trim_base(cfg.imds_url.as_deref().unwrap_or(IMDS_BASE)),
            vault_suffix,
            vault_url_override: cfg.vault_url.as_deref().map(trim_base),
        }
    }

    pub fn vault_suffix(&self) -> &str {
        &self.vault_suffix
    }

    /// Data-plane base URL for a vault, without trailing slash.
    pub fn vault_url(&self, vault_name: &str) -> String {
        match &self.vault_url_override {
            Some(base) => base.clone(),
            None => format!("https://{}.{}", vault_name, self.vault_suffix),
        }
    }

    /// Token audience for the resource-manager plane.
    pub fn management_resource(&self) -> String {
        self.cloud.management_endpoint().to_string()
    }

    /// Token audience for the Key Vault data plane.
    pub fn vault_resource(&self) -> String {
        format!("https://{}", self.cloud.vault_suffix())
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
