//! Tenant → subscription → resource group → vault traversal.
//!
//! Runs sequentially. A failing tenant or subscription becomes a warning and
//! traversal moves on; only an empty tenant list is fatal.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::azure::cloud::Endpoints;
use crate::azure::rest::RestClient;
use crate::config::Config;
use crate::errors::{AkvError, Result};
use crate::models::credential::Credential;
use crate::models::discovery::DiscoveryResult;
use crate::models::location::compose_store_path;
use crate::vault::management::KEYVAULT_ARM_API_VERSION;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

/// Entry of the tenant list that expands to every tenant visible to the
/// credential.
pub const ALL_TENANTS: &str = "*";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantEntry {
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionEntry {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

/// Splits the comma-separated `dirs` value: trimmed, empties dropped,
/// duplicates removed (first occurrence wins).
pub fn parse_tenant_list(dirs: Option<&str>) -> Vec<String> {
    let mut tenants: Vec<String> = Vec::new();
    for t in dirs.unwrap_or_default().split(',').map(str::trim) {
        if !t.is_empty() && !tenants.iter().any(|seen| seen.eq_ignore_ascii_case(t)) {
            tenants.push(t.to_string());
        }
    }
    tenants
}

pub struct DiscoveryTraverser {
    credential: Credential,
    endpoints: Endpoints,
    cfg: Config,
}

impl DiscoveryTraverser {
    pub fn new(credential: Credential, endpoints: Endpoints, cfg: Config) -> Self {
        Self {
            credential,
            endpoints,
            cfg,
        }
    }

    fn client_for(&self, tenant: &str) -> Result<RestClient> {
        RestClient::for_credential(&self.credential.for_tenant(tenant), &self.endpoints, &self.cfg)
    }

    /// Runs discovery over `tenants`, falling back to the credential's own
    /// tenant when the list is empty.
    pub async fn discover(&self, tenants: &[String]) -> Result<DiscoveryResult> {
        let mut tenants: Vec<String> = tenants
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if tenants.is_empty() {
            match self.credential.tenant_id() {
                Some(t) => tenants.push(t.to_string()),
                None => {
                    return Err(AkvError::config(
                        "no tenants to search: set the 'dirs' discovery property or supply a tenant id",
                    ))
                }
            }
        }

        let mut result = DiscoveryResult::default();
        let tenants = self.expand_wildcard(tenants, &mut result).await;
        info!(tenants = tenants.len(), "starting vault discovery");

        for tenant in &tenants {
            if let Err(e) = self.discover_tenant(tenant, &mut result).await {
                warn!(tenant = %tenant, error = %e.one_line(), "tenant search failed");
                result
                    .warnings
                    .push(format!("Tenant '{}': {}", tenant, e.one_line()));
            }
        }

        info!(
            vaults = result.vault_paths.len(),
            warnings = result.warnings.len(),
            status = ?result.status(),
            "vault discovery finished"
        );
        Ok(result)
    }

    /// Replaces a `*` entry by the tenants the credential's home tenant can
    /// see.
    async fn expand_wildcard(&self, tenants: Vec<String>, result: &mut DiscoveryResult) -> Vec<String> {
        if !tenants.iter().any(|t| t == ALL_TENANTS) {
            return tenants;
        }
        let mut expanded: Vec<String> = tenants.into_iter().filter(|t| t != ALL_TENANTS).collect();
        match self.visible_tenants().await {
            Ok(found) => {
                for t in found {
                    if !expanded.iter().any(|e| e.eq_ignore_ascii_case(&t)) {
                        expanded.push(t);
                    }
                }
            }
            Err(e) => result
                .warnings
                .push(format!("Tenant list could not be read: {}", e.one_line())),
        }
        expanded
    }

    async fn visible_tenants(&self) -> Result<Vec<String>> {
        let home = self.credential.tenant_id().unwrap_or("organizations");
        let rest = self.client_for(home)?;
        let url = format!(
            "{}/tenants?api-version={}",
            self.endpoints.management, SUBSCRIPTIONS_API_VERSION
        );
        let entries: Vec<TenantEntry> = rest
            .list_all(&self.endpoints.management_resource(), &url)
            .await?;
        Ok(entries.into_iter().map(|t| t.tenant_id).collect())
    }

    async fn discover_tenant(&self, tenant: &str, result: &mut DiscoveryResult) -> Result<()> {
        let rest = self.client_for(tenant)?;
        let resource = self.endpoints.management_resource();

        let url = format!(
            "{}/subscriptions?api-version={}",
            self.endpoints.management, SUBSCRIPTIONS_API_VERSION
        );
        let subscriptions: Vec<SubscriptionEntry> = rest.list_all(&resource, &url).await?;
        debug!(tenant, subscriptions = subscriptions.len(), "subscriptions listed");

        for sub in subscriptions {
            if let Err(e) = self
                .discover_subscription(&rest, tenant, &sub.subscription_id, result)
                .await
            {
                warn!(tenant, subscription = %sub.subscription_id, error = %e.one_line(), "subscription search failed");
                result.warnings.push(format!(
                    "Subscription '{}' (tenant '{}'): {}",
                    sub.subscription_id,
                    tenant,
                    e.one_line()
                ));
            }
        }
        Ok(())
    }

    /// Lists the vaults of every resource group. A resource group that
    /// cannot be read becomes a warning; only an unreadable group list fails
    /// the whole subscription.
    async fn discover_subscription(
        &self,
        rest: &RestClient,
        tenant: &str,
        subscription_id: &str,
        result: &mut DiscoveryResult,
    ) -> Result<()> {
        let resource = self.endpoints.management_resource();
        let url = format!(
            "{}/subscriptions/{}/resourcegroups?api-version={}",
            self.endpoints.management, subscription_id, RESOURCE_GROUPS_API_VERSION
        );
        let groups: Vec<NamedResource> = rest.list_all(&resource, &url).await?;

        for group in groups {
            let url = format!(
                "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.KeyVault/vaults?api-version={}",
                self.endpoints.management, subscription_id, group.name, KEYVAULT_ARM_API_VERSION
            );
            let vaults: Vec<NamedResource> = match rest.list_all(&resource, &url).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(tenant, subscription_id, resource_group = %group.name, error = %e.one_line(), "resource group search failed");
                    result.warnings.push(format!(
                        "Resource group '{}' in subscription '{}' (tenant '{}'): {}",
                        group.name,
                        subscription_id,
                        tenant,
                        e.one_line()
                    ));
                    continue;
                }
            };
            for vault in vaults {
                debug!(subscription_id, resource_group = %group.name, vault = %vault.name, "vault found");
                result
                    .vault_paths
                    .push(compose_store_path(subscription_id, &group.name, &vault.name));
            }
        }
        Ok(())
    }
}
