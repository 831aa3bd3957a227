//! Store-path resolution.
//!
//! Stores created over the years carry their location in one of three
//! formats, tried newest first:
//!
//! ```text
//! sub:rg:vault                                                       (current)
//! sub:vault                                                          (legacy, resource group from properties)
//! /subscriptions/sub/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/vault   (oldest)
//! ```
//!
//! Non-empty store properties always override whatever the path yields.

use crate::azure::cloud::CloudVariant;
use crate::errors::{AkvError, Result};
use crate::models::location::{SkuTier, VaultLocation};

/// Out-of-band values delivered next to the store path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationOverrides {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub vault_name: Option<String>,
    pub region: Option<String>,
    pub sku: SkuTier,
    pub cloud: CloudVariant,
}

impl LocationOverrides {
    fn has_side_channel(&self) -> bool {
        [&self.subscription_id, &self.resource_group, &self.vault_name]
            .iter()
            .any(|v| non_empty(v.as_deref()).is_some())
    }
}

/// Which format the raw path matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFormat {
    Current,
    LegacyTwoField,
    ResourceId,
    Unrecognized,
}

#[derive(Debug, Default)]
struct Parsed {
    subscription_id: Option<String>,
    resource_group: Option<String>,
    vault_name: Option<String>,
}

fn parse(raw: &str) -> (PathFormat, Parsed) {
    let raw = raw.trim();

    let colon: Vec<&str> = raw.split(':').collect();
    if colon.len() == 3 {
        return (
            PathFormat::Current,
            Parsed {
                subscription_id: non_empty(Some(colon[0])),
                resource_group: non_empty(Some(colon[1])),
                vault_name: non_empty(Some(colon[2])),
            },
        );
    }
    if colon.len() == 2 {
        return (
            PathFormat::LegacyTwoField,
            Parsed {
                subscription_id: non_empty(Some(colon[0])),
                resource_group: None,
                vault_name: non_empty(Some(colon[1])),
            },
        );
    }

    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() == 8 {
        return (
            PathFormat::ResourceId,
            Parsed {
                subscription_id: non_empty(Some(segments[1])),
                resource_group: non_empty(Some(segments[3])),
                vault_name: non_empty(Some(segments[7])),
            },
        );
    }

    (PathFormat::Unrecognized, Parsed::default())
}

/// Detects the format of a raw store path without resolving it.
pub fn detect_format(raw: &str) -> PathFormat {
    parse(raw).0
}

/// Resolves a raw store path plus store properties into a [`VaultLocation`].
pub fn resolve(raw: &str, overrides: &LocationOverrides) -> Result<VaultLocation> {
    let (format, parsed) = parse(raw);

    if format == PathFormat::Unrecognized && !overrides.has_side_channel() {
        return Err(AkvError::config(format!(
            "store path '{}' is not in a recognized format (subscription:resourcegroup:vault) and no resource group or vault name properties were supplied",
            raw.trim()
        )));
    }

    let pick = |over: &Option<String>, derived: Option<String>| {
        non_empty(over.as_deref()).or(derived)
    };

    let subscription_id = pick(&overrides.subscription_id, parsed.subscription_id);
    let resource_group = pick(&overrides.resource_group, parsed.resource_group);
    let vault_name = pick(&overrides.vault_name, parsed.vault_name);

    tracing::debug!(
        ?format,
        subscription_id = subscription_id.as_deref().unwrap_or(""),
        resource_group = resource_group.as_deref().unwrap_or(""),
        vault_name = vault_name.as_deref().unwrap_or(""),
        "resolved store path"
    );

    let vault_name = vault_name.ok_or_else(|| {
        AkvError::config(format!("store path '{}' does not name a vault", raw.trim()))
    })?;
    let subscription_id = subscription_id.ok_or_else(|| {
        AkvError::config(format!(
            "store path '{}' does not contain a subscription id and none was supplied",
            raw.trim()
        ))
    })?;
    let resource_group = resource_group.ok_or_else(|| {
        AkvError::config(format!(
            "store path '{}' does not contain a resource group; set the ResourceGroupName store property",
            raw.trim()
        ))
    })?;

    Ok(VaultLocation {
        subscription_id,
        resource_group,
        vault_name,
        region: non_empty(overrides.region.as_deref()),
        sku: overrides.sku,
        cloud: overrides.cloud,
    })
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
