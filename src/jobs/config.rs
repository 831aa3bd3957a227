//! Host job record → validated [`JobConfig`].
//!
//! Everything the host sends is checked here, once. Job functions only ever
//! see the resolved, immutable configuration.

use std::collections::HashMap;

use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use super::PamSecretResolver;
use crate::azure::cloud::CloudVariant;
use crate::discovery::parse_tenant_list;
use crate::errors::{AkvError, Result};
use crate::models::credential::Credential;
use crate::models::location::{SkuTier, VaultLocation};
use crate::store_path::{self, LocationOverrides};

// ── Host record ────────────────────────────────────────────────

/// Job record as delivered by the host (JSON or YAML).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub operation_type: String,
    #[serde(default)]
    pub store_path: String,
    #[serde(default)]
    pub server_username: String,
    #[serde(default)]
    pub server_password: String,
    /// Store properties: a JSON object, or a string holding one.
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub job_certificate: Option<JobCertificate>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub job_properties: Option<Value>,
    #[serde(default)]
    pub job_history_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCertificate {
    #[serde(default)]
    pub alias: Option<String>,
    /// Base64 PKCS#12.
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub private_key_password: Option<String>,
}

impl JobRecord {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| AkvError::config(format!("job record is not valid JSON: {}", e)))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| AkvError::config(format!("job record is not valid YAML: {}", e)))
    }
}

// ── Store properties ───────────────────────────────────────────

/// Typed view of the store's custom properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreProperties {
    pub tenant_id: Option<String>,
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub vault_name: Option<String>,
    pub vault_region: Option<String>,
    pub sku: SkuTier,
    pub cloud: CloudVariant,
    pub private_endpoint: Option<String>,
    pub auto_update_bindings: bool,
    /// Discovery tenant list, comma separated.
    pub dirs: Option<String>,
}

fn as_object(value: Option<&Value>, what: &str) -> Result<Map<String, Value>> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(AkvError::config(format!("{} must be a JSON object", what))),
        },
        Some(_) => Err(AkvError::config(format!("{} must be a JSON object", what))),
    }
}

/// Case-insensitive property lookup; scalars are rendered as trimmed strings.
fn prop(map: &Map<String, Value>, key: &str) -> Option<String> {
    let value = map
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)?;
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    prop(map, key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

impl StoreProperties {
    pub fn parse(value: Option<&Value>) -> Result<Self> {
        let map = as_object(value, "store properties")?;
        let premium = flag(&map, "PremiumSKU")
            || prop(&map, "SkuType")
                .map(|s| s.eq_ignore_ascii_case("premium"))
                .unwrap_or(false);

        Ok(Self {
            tenant_id: prop(&map, "TenantId"),
            subscription_id: prop(&map, "SubscriptionId"),
            resource_group: prop(&map, "ResourceGroupName"),
            vault_name: prop(&map, "VaultName"),
            vault_region: prop(&map, "VaultRegion"),
            sku: SkuTier::from_premium_flag(premium),
            cloud: CloudVariant::from_property(prop(&map, "AzureCloud").as_deref()),
            private_endpoint: prop(&map, "PrivateEndpoint"),
            auto_update_bindings: flag(&map, "AutoUpdateAppServiceBindings"),
            dirs: prop(&map, "dirs"),
        })
    }

    fn overrides(&self) -> LocationOverrides {
        LocationOverrides {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            vault_name: self.vault_name.clone(),
            region: self.vault_region.clone(),
            sku: self.sku,
            cloud: self.cloud,
        }
    }
}

// ── Validated config ───────────────────────────────────────────

/// What every job carries.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_history_id: i64,
    pub credential: Credential,
    pub properties: StoreProperties,
}

#[derive(Debug, Clone)]
pub struct StoreJob {
    pub context: JobContext,
    pub location: VaultLocation,
}

#[derive(Debug, Clone)]
pub struct DiscoveryJob {
    pub context: JobContext,
    pub tenants: Vec<String>,
}

#[derive(Clone)]
pub struct AddJob {
    pub store: StoreJob,
    pub alias: String,
    pub pfx: Zeroizing<Vec<u8>>,
    pub password: Zeroizing<String>,
    pub tags: HashMap<String, String>,
    pub overwrite: bool,
    pub preserve_tags: bool,
}

impl std::fmt::Debug for AddJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddJob")
            .field("store", &self.store)
            .field("alias", &self.alias)
            .field("pfx_len", &self.pfx.len())
            .field("tags", &self.tags)
            .field("overwrite", &self.overwrite)
            .field("preserve_tags", &self.preserve_tags)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RemoveJob {
    pub store: StoreJob,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub enum JobConfig {
    Create(StoreJob),
    Discovery(DiscoveryJob),
    Inventory(StoreJob),
    Add(AddJob),
    Remove(RemoveJob),
}

impl JobConfig {
    pub fn job_history_id(&self) -> i64 {
        self.context().job_history_id
    }

    pub fn context(&self) -> &JobContext {
        match self {
            JobConfig::Create(j) | JobConfig::Inventory(j) => &j.context,
            JobConfig::Discovery(j) => &j.context,
            JobConfig::Add(j) => &j.store.context,
            JobConfig::Remove(j) => &j.store.context,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            JobConfig::Create(_) => "create",
            JobConfig::Discovery(_) => "discovery",
            JobConfig::Inventory(_) => "inventory",
            JobConfig::Add(_) => "add",
            JobConfig::Remove(_) => "remove",
        }
    }

    /// Validates a host record. Secrets are passed through `resolver` first.
    pub fn from_record(record: &JobRecord, resolver: &dyn PamSecretResolver) -> Result<Self> {
        let properties = StoreProperties::parse(record.properties.as_ref())?;
        let client_id = resolver.resolve("ServerUsername", &record.server_username)?;
        let client_secret = Zeroizing::new(resolver.resolve("ServerPassword", &record.server_password)?);
        let credential = Credential::select(
            properties.tenant_id.as_deref().unwrap_or_default(),
            &client_id,
            &client_secret,
        );

        let context = JobContext {
            job_history_id: record.job_history_id,
            credential,
            properties,
        };

        let operation = record.operation_type.trim().to_ascii_lowercase();
        if operation == "discovery" {
            let tenants = parse_tenant_list(context.properties.dirs.as_deref());
            return Ok(JobConfig::Discovery(DiscoveryJob { context, tenants }));
        }

        let location = store_path::resolve(&record.store_path, &context.properties.overrides())?;
        let store = StoreJob { context, location };

        match operation.as_str() {
            "create" => Ok(JobConfig::Create(store)),
            "inventory" => Ok(JobConfig::Inventory(store)),
            "add" => {
                let cert = record.job_certificate.clone().unwrap_or_default();
                let alias = required_alias(&cert)?;
                let password = cert
                    .private_key_password
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        AkvError::config(format!(
                            "certificate '{}' has no private key password; only PFX entries can be added",
                            alias
                        ))
                    })?;
                let contents = cert.contents.unwrap_or_default();
                let pfx = base64::engine::general_purpose::STANDARD
                    .decode(contents.trim())
                    .map_err(|e| AkvError::config(format!("certificate contents are not base64: {}", e)))?;
                if pfx.is_empty() {
                    return Err(AkvError::config("certificate contents are empty"));
                }

                let job_props = as_object(record.job_properties.as_ref(), "job properties")?;
                Ok(JobConfig::Add(AddJob {
                    store,
                    alias,
                    pfx: Zeroizing::new(pfx),
                    password: Zeroizing::new(password),
                    tags: parse_tags(&job_props)?,
                    overwrite: record.overwrite,
                    preserve_tags: flag(&job_props, "PreserveExistingTags"),
                }))
            }
            "remove" => {
                let cert = record.job_certificate.clone().unwrap_or_default();
                let alias = required_alias(&cert)?;
                Ok(JobConfig::Remove(RemoveJob { store, alias }))
            }
            other => Err(AkvError::config(format!("unsupported operation type '{}'", other))),
        }
    }
}

fn required_alias(cert: &JobCertificate) -> Result<String> {
    cert.alias
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .ok_or_else(|| AkvError::config("an alias is required for this operation"))
}

/// `CertificateTags` is a JSON object of string values, either inline or as
/// a JSON string.
fn parse_tags(job_props: &Map<String, Value>) -> Result<HashMap<String, String>> {
    let raw = job_props
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("CertificateTags"))
        .map(|(_, v)| v);
    let map = as_object(raw, "CertificateTags")?;

    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            other => Err(AkvError::config(format!(
                "CertificateTags value for '{}' must be a string, got {}",
                k, other
            ))),
        })
        .collect()
}
