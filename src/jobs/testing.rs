//! In-memory doubles for job tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::config::{AddJob, JobContext, RemoveJob, StoreJob};
use crate::binding::{BindingReport, CertificateBinder};
use crate::errors::{AkvError, Result};
use crate::models::binding::VaultCertificateRef;
use crate::models::certificate::{CertificateRecord, Thumbprint};
use crate::models::credential::Credential;
use crate::models::location::VaultLocation;
use crate::vault::{CertificateListing, CertificateStore, ImportOptions, ImportOutcome};

pub fn record(alias: &str) -> CertificateRecord {
    CertificateRecord {
        alias: alias.to_string(),
        version: "1".into(),
        thumbprint: Thumbprint::from_bytes(alias.as_bytes()),
        san_list: vec![format!("{}.contoso.com", alias)],
        tags: HashMap::new(),
        has_private_key: true,
        enabled: true,
        certificate_der: vec![0x30, 0x00],
    }
}

pub fn store_job() -> StoreJob {
    StoreJob {
        context: JobContext {
            job_history_id: 1,
            credential: Credential::select("t", "app", "secret"),
            properties: Default::default(),
        },
        location: VaultLocation {
            subscription_id: "s".into(),
            resource_group: "r".into(),
            vault_name: "v".into(),
            region: None,
            sku: Default::default(),
            cloud: Default::default(),
        },
    }
}

pub fn add_job(alias: &str, overwrite: bool) -> AddJob {
    AddJob {
        store: store_job(),
        alias: alias.to_string(),
        pfx: Zeroizing::new(vec![1, 2, 3]),
        password: Zeroizing::new("pw".into()),
        tags: HashMap::new(),
        overwrite,
        preserve_tags: false,
    }
}

pub fn remove_job(alias: &str) -> RemoveJob {
    RemoveJob {
        store: store_job(),
        alias: alias.to_string(),
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub certs: Mutex<Vec<CertificateRecord>>,
    pub list_failures: Vec<String>,
    pub imports: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeStore {
    pub fn with(aliases: &[&str]) -> Self {
        Self {
            certs: Mutex::new(aliases.iter().map(|a| record(a)).collect()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CertificateStore for FakeStore {
    async fn list_certificates(&self) -> Result<CertificateListing> {
        Ok(CertificateListing {
            certificates: self.certs.lock().unwrap().clone(),
            failures: self.list_failures.clone(),
        })
    }

    async fn get_certificate(&self, alias: &str) -> Result<Option<CertificateRecord>> {
        Ok(self.certs.lock().unwrap().iter().find(|c| c.alias == alias).cloned())
    }

    async fn import_certificate(
        &self,
        alias: &str,
        _pkcs12: &[u8],
        _password: &str,
        tags: &HashMap<String, String>,
        options: ImportOptions,
    ) -> Result<ImportOutcome> {
        if !options.overwrite && self.get_certificate(alias).await?.is_some() {
            return Ok(ImportOutcome::Skipped(format!("Certificate '{}' already exists", alias)));
        }
        self.imports.fetch_add(1, Ordering::SeqCst);
        let mut rec = record(alias);
        rec.tags = tags.clone();
        let mut certs = self.certs.lock().unwrap();
        certs.retain(|c| c.alias != alias);
        certs.push(rec.clone());
        Ok(ImportOutcome::Imported(rec))
    }

    async fn delete_certificate(&self, alias: &str) -> Result<CertificateRecord> {
        let mut certs = self.certs.lock().unwrap();
        let pos = certs
            .iter()
            .position(|c| c.alias == alias)
            .ok_or_else(|| AkvError::NotFound(format!("certificate '{}' does not exist", alias)))?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(certs.remove(pos))
    }
}

#[derive(Default)]
pub struct FakeBinder {
    pub fail_sites: Vec<String>,
    pub binds: AtomicUsize,
    pub unbinds: AtomicUsize,
}

#[async_trait]
impl CertificateBinder for FakeBinder {
    async fn bind(&self, cert: &CertificateRecord, _vault_cert: &VaultCertificateRef) -> Result<BindingReport> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(BindingReport {
            bound_sites: vec![cert.alias.clone()],
            failures: self.fail_sites.clone(),
            ..Default::default()
        })
    }

    async fn unbind(&self, _thumbprint: &Thumbprint) -> Result<BindingReport> {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        Ok(BindingReport {
            failures: self.fail_sites.clone(),
            ..Default::default()
        })
    }
}
