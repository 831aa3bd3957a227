//! Resource-manager operations on the vault itself (Microsoft.KeyVault).

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::VaultClient;
use crate::azure::auth::{caller_identity, CallerIdentity};
use crate::errors::{AkvError, Result};
use crate::models::location::VaultLocation;

pub(crate) const KEYVAULT_ARM_API_VERSION: &str = "2023-07-01";
const LOCATIONS_API_VERSION: &str = "2022-12-01";

/// Every certificate permission an access policy can carry.
pub const CERTIFICATE_PERMISSIONS: &[&str] = &[
    "get",
    "list",
    "update",
    "create",
    "import",
    "delete",
    "recover",
    "backup",
    "restore",
    "managecontacts",
    "manageissuers",
    "getissuers",
    "listissuers",
    "setissuers",
    "deleteissuers",
    "purge",
];

#[derive(Debug, Deserialize)]
struct Region {
    name: String,
}

fn access_policy(caller: &CallerIdentity) -> Value {
    json!({
        "tenantId": caller.tenant_id,
        "objectId": caller.object_id,
        "permissions": { "certificates": CERTIFICATE_PERMISSIONS }
    })
}

impl VaultClient {
    fn vault_arm_url(&self, suffix: &str) -> String {
        format!(
            "{}{}{}?api-version={}",
            self.endpoints.management,
            self.location.resource_id(),
            suffix,
            KEYVAULT_ARM_API_VERSION
        )
    }

    /// Identity of the principal this client authenticates as.
    pub async fn caller(&self) -> Result<CallerIdentity> {
        let token = self
            .rest
            .tokens()
            .token(&self.endpoints.management_resource())
            .await?;
        caller_identity(&token)
    }

    /// Adds an access policy granting the caller every certificate permission.
    pub async fn grant_certificate_permissions(&self) -> Result<()> {
        let caller = self.caller().await?;
        let body = json!({ "properties": { "accessPolicies": [access_policy(&caller)] } });
        let _: Value = self
            .rest
            .put(
                &self.endpoints.management_resource(),
                &self.vault_arm_url("/accessPolicies/add"),
                &body,
            )
            .await?;
        info!(
            vault = %self.location.vault_name,
            object_id = %caller.object_id,
            "granted certificate permissions to caller"
        );
        Ok(())
    }

    /// Regions available to the subscription, in provider order.
    pub async fn available_regions(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/subscriptions/{}/locations?api-version={}",
            self.endpoints.management, self.location.subscription_id, LOCATIONS_API_VERSION
        );
        let regions: Vec<Region> = self
            .rest
            .list_all(&self.endpoints.management_resource(), &url)
            .await?;
        Ok(regions.into_iter().map(|r| r.name).collect())
    }

    /// Creates (or updates) the vault and waits for provisioning to finish.
    /// Returns the location with the region actually used.
    pub async fn create_vault(&self) -> Result<VaultLocation> {
        let region = match &self.location.region {
            Some(r) => r.clone(),
            None => self
                .available_regions()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AkvError::config(format!(
                        "no region supplied and subscription '{}' lists no available regions",
                        self.location.subscription_id
                    ))
                })?,
        };
        let caller = self.caller().await?;

        let body = json!({
            "location": region,
            "properties": {
                "tenantId": caller.tenant_id,
                "sku": { "family": "A", "name": self.location.sku.as_str() },
                "accessPolicies": [access_policy(&caller)],
            }
        });

        info!(
            vault = %self.location.vault_name,
            region = %region,
            sku = self.location.sku.as_str(),
            "creating vault"
        );
        let _: Value = self
            .rest
            .put(&self.endpoints.management_resource(), &self.vault_arm_url(""), &body)
            .await?;

        Ok(self.location.with_region(region))
    }
}
