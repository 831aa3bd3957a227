//! Management jobs: create the vault, add or remove a certificate.

use tracing::{error, info, warn};

use super::config::{AddJob, RemoveJob, StoreJob};
use crate::binding::{BindingReport, CertificateBinder};
use crate::errors::AkvError;
use crate::models::binding::VaultCertificateRef;
use crate::models::job::{JobResult, JobStatus};
use crate::vault::{CertificateStore, ImportOptions, ImportOutcome, VaultClient};

pub async fn create(job: &StoreJob, vault: &VaultClient) -> JobResult {
    let id = job.context.job_history_id;
    match vault.create_vault().await {
        Ok(location) => {
            info!(store = %location.store_path(), region = location.region.as_deref().unwrap_or(""), "vault ready");
            JobResult::success(id)
        }
        Err(e) => {
            error!(store = %job.location.store_path(), error = %e.one_line(), "vault creation failed");
            JobResult::failure(id, e.one_line())
        }
    }
}

fn binding_warnings(what: &str, outcome: Result<BindingReport, AkvError>) -> Vec<String> {
    match outcome {
        Ok(report) => report
            .failures
            .into_iter()
            .map(|f| format!("{} failed for {}", what, f))
            .collect(),
        Err(e) => vec![format!("{} failed: {}", what, e.one_line())],
    }
}

fn finish(id: i64, status: JobStatus, warnings: Vec<String>) -> JobResult {
    if warnings.is_empty() {
        JobResult::new(status, id, "")
    } else {
        JobResult::new(status.combine(JobStatus::Warning), id, warnings.join("\n"))
    }
}

pub async fn add(
    job: &AddJob,
    store: &dyn CertificateStore,
    binder: Option<&dyn CertificateBinder>,
    vault_ref: &VaultCertificateRef,
) -> JobResult {
    let id = job.store.context.job_history_id;
    let options = ImportOptions {
        overwrite: job.overwrite,
        preserve_tags: job.preserve_tags,
    };

    let outcome = store
        .import_certificate(&job.alias, &job.pfx, &job.password, &job.tags, options)
        .await;
    let record = match outcome {
        Ok(ImportOutcome::Imported(record)) => record,
        Ok(ImportOutcome::Skipped(reason)) => return JobResult::warning(id, reason),
        Err(e) => {
            error!(alias = %job.alias, error = %e.one_line(), "certificate import failed");
            return JobResult::failure(id, e.one_line());
        }
    };

    let mut warnings = Vec::new();
    if let Some(binder) = binder {
        let outcome = binder.bind(&record, vault_ref).await;
        if let Ok(report) = &outcome {
            info!(alias = %job.alias, sites = ?report.bound_sites, "app service bindings updated");
        }
        warnings.extend(binding_warnings("App Service binding", outcome));
    }
    if !warnings.is_empty() {
        warn!(alias = %job.alias, warnings = warnings.len(), "certificate added with binding warnings");
    }
    finish(id, JobStatus::Success, warnings)
}

pub async fn remove(job: &RemoveJob, store: &dyn CertificateStore, binder: Option<&dyn CertificateBinder>) -> JobResult {
    let id = job.store.context.job_history_id;
    let mut warnings = Vec::new();

    if let Some(binder) = binder {
        match store.get_certificate(&job.alias).await {
            Ok(Some(record)) => {
                let outcome = binder.unbind(&record.thumbprint).await;
                warnings.extend(binding_warnings("App Service unbinding", outcome));
            }
            Ok(None) => {}
            Err(e) => warnings.push(format!(
                "App Service unbinding skipped, certificate could not be read: {}",
                e.one_line()
            )),
        }
    }

    match store.delete_certificate(&job.alias).await {
        Ok(record) => {
            info!(alias = %record.alias, thumbprint = %record.thumbprint, "certificate removed");
            finish(id, JobStatus::Success, warnings)
        }
        Err(e) => {
            error!(alias = %job.alias, error = %e.one_line(), "certificate removal failed");
            warnings.insert(0, e.one_line());
            JobResult::failure(id, warnings.join("\n"))
        }
    }
}
