//! Job orchestration: host record in, [`JobResult`] out.
//!
//! `run_job` builds the live clients for a validated [`JobConfig`] and hands
//! them to the per-operation functions in the submodules. Those functions
//! never see raw host input and never return errors; every failure is folded
//! into the result.

pub mod config;
pub mod discovery;
pub mod inventory;
pub mod management;
#[cfg(test)]
pub(crate) mod testing;

use tracing::{error, info};

use crate::azure::cloud::Endpoints;
use crate::binding::{AppServiceClient, CertificateBinder};
use crate::config::Config;
use crate::discovery::DiscoveryTraverser;
use crate::errors::{AkvError, Result};
use crate::models::job::{InventoryItem, JobResult};
use crate::vault::VaultClient;

pub use config::{JobConfig, JobRecord};

/// Resolves secret fields (client id, client secret) that may be references
/// into a privileged-access-management system.
pub trait PamSecretResolver: Send + Sync {
    fn resolve(&self, field: &str, value: &str) -> Result<String>;
}

/// Values are used as delivered.
pub struct PassthroughResolver;

impl PamSecretResolver for PassthroughResolver {
    fn resolve(&self, _field: &str, value: &str) -> Result<String> {
        Ok(value.to_string())
    }
}

/// Resolves `env:NAME` references from the process environment; other values
/// pass through.
pub struct EnvSecretResolver;

impl PamSecretResolver for EnvSecretResolver {
    fn resolve(&self, field: &str, value: &str) -> Result<String> {
        match value.strip_prefix("env:") {
            Some(var) => std::env::var(var.trim()).map_err(|_| {
                AkvError::config(format!("{} references environment variable '{}', which is not set", field, var.trim()))
            }),
            None => Ok(value.to_string()),
        }
    }
}

/// Receives the inventory of a store. Returns false when the host rejects it.
pub trait InventorySink: Send {
    fn submit(&mut self, items: &[InventoryItem]) -> bool;
}

/// Receives discovered store paths. Returns false when the host rejects them.
pub trait DiscoverySink: Send {
    fn submit(&mut self, store_paths: &[String]) -> bool;
}

impl InventorySink for Vec<InventoryItem> {
    fn submit(&mut self, items: &[InventoryItem]) -> bool {
        self.extend_from_slice(items);
        true
    }
}

impl DiscoverySink for Vec<String> {
    fn submit(&mut self, store_paths: &[String]) -> bool {
        self.extend_from_slice(store_paths);
        true
    }
}

/// Runs one validated job against the live cloud endpoints.
pub async fn run_job(
    job: &JobConfig,
    cfg: &Config,
    inventory_sink: &mut dyn InventorySink,
    discovery_sink: &mut dyn DiscoverySink,
) -> JobResult {
    let ctx = job.context();
    info!(
        operation = job.operation(),
        job_history_id = ctx.job_history_id,
        credential = ctx.credential.kind(),
        "job started"
    );

    let result = match dispatch(job, cfg, inventory_sink, discovery_sink).await {
        Ok(r) => r,
        Err(e) => {
            error!(operation = job.operation(), error = %e.one_line(), "job could not start");
            JobResult::failure(ctx.job_history_id, e.one_line())
        }
    };

    info!(
        operation = job.operation(),
        job_history_id = ctx.job_history_id,
        result = ?result.result,
        "job finished"
    );
    result
}

async fn dispatch(
    job: &JobConfig,
    cfg: &Config,
    inventory_sink: &mut dyn InventorySink,
    discovery_sink: &mut dyn DiscoverySink,
) -> Result<JobResult> {
    let ctx = job.context();
    let private_endpoint = ctx.properties.private_endpoint.as_deref();

    let vault_for = |store: &config::StoreJob| {
        VaultClient::new(store.location.clone(), &ctx.credential, private_endpoint, cfg)
    };
    let binder_for = |store: &config::StoreJob| -> Result<Option<AppServiceClient>> {
        if !ctx.properties.auto_update_bindings {
            return Ok(None);
        }
        let endpoints = Endpoints::new(store.location.cloud, None, cfg);
        AppServiceClient::new(&store.location.subscription_id, &ctx.credential, endpoints, cfg).map(Some)
    };

    Ok(match job {
        JobConfig::Create(store) => management::create(store, &vault_for(store)?).await,
        JobConfig::Inventory(store) => inventory::run(store, &vault_for(store)?, inventory_sink).await,
        JobConfig::Discovery(d) => {
            let endpoints = Endpoints::new(ctx.properties.cloud, private_endpoint, cfg);
            let traverser = DiscoveryTraverser::new(ctx.credential.clone(), endpoints, cfg.clone());
            discovery::run(d, &traverser, discovery_sink).await
        }
        JobConfig::Add(add) => {
            let vault = vault_for(&add.store)?;
            let binder = binder_for(&add.store)?;
            let vault_ref = vault.certificate_ref(&add.alias);
            management::add(
                add,
                &vault,
                binder.as_ref().map(|b| b as &dyn CertificateBinder),
                &vault_ref,
            )
            .await
        }
        JobConfig::Remove(remove) => {
            let vault = vault_for(&remove.store)?;
            let binder = binder_for(&remove.store)?;
            management::remove(
                remove,
                &vault,
                binder.as_ref().map(|b| b as &dyn CertificateBinder),
            )
            .await
        }
    })
}
