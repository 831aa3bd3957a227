use serde::{Deserialize, Serialize};

use crate::azure::cloud::CloudVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkuTier {
    #[default]
    Standard,
    Premium,
}

impl SkuTier {
    pub fn from_premium_flag(premium: bool) -> Self {
        if premium {
            SkuTier::Premium
        } else {
            SkuTier::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkuTier::Standard => "standard",
            SkuTier::Premium => "premium",
        }
    }
}

/// A fully resolved vault address. Built once by the store-path resolver and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultLocation {
    pub subscription_id: String,
    pub resource_group: String,
    pub vault_name: String,
    pub region: Option<String>,
    pub sku: SkuTier,
    pub cloud: CloudVariant,
}

impl VaultLocation {
    /// Canonical `subscription:resourceGroup:vault` form, as reported by
    /// discovery.
    pub fn store_path(&self) -> String {
        compose_store_path(&self.subscription_id, &self.resource_group, &self.vault_name)
    }

    pub fn resource_group_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )
    }

    /// ARM resource id of the vault.
    pub fn resource_id(&self) -> String {
        format!(
            "{}/providers/Microsoft.KeyVault/vaults/{}",
            self.resource_group_id(),
            self.vault_name
        )
    }

    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..self.clone()
        }
    }
}

pub fn compose_store_path(subscription_id: &str, resource_group: &str, vault_name: &str) -> String {
    format!("{}:{}:{}", subscription_id, resource_group, vault_name)
}
