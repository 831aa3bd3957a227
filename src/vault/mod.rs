pub mod client;
pub mod management;
pub mod pkcs12;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::certificate::CertificateRecord;

pub use client::VaultClient;

/// Outcome of an inventory listing. Failed items are reported, not fatal,
/// unless every item failed.
#[derive(Debug, Clone, Default)]
pub struct CertificateListing {
    pub certificates: Vec<CertificateRecord>,
    /// `alias: reason` for each certificate whose details could not be read.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Replace an existing active certificate with the same alias.
    pub overwrite: bool,
    /// Keep tags of the existing certificate that the request does not set.
    pub preserve_tags: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(CertificateRecord),
    Skipped(String),
}

/// Abstraction over the certificate store behind a job.
/// Implementations: [`VaultClient`] (Key Vault data plane).
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Every certificate in the store, all pages followed.
    async fn list_certificates(&self) -> Result<CertificateListing>;

    /// `Ok(None)` when the alias does not exist.
    async fn get_certificate(&self, alias: &str) -> Result<Option<CertificateRecord>>;

    async fn import_certificate(
        &self,
        alias: &str,
        pkcs12: &[u8],
        password: &str,
        tags: &HashMap<String, String>,
        options: ImportOptions,
    ) -> Result<ImportOutcome>;

    /// Deletes the alias and returns what was deleted.
    async fn delete_certificate(&self, alias: &str) -> Result<CertificateRecord>;
}
