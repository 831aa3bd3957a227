//! PKCS#12 normalization before import.
//!
//! Key Vault accepts a single key entry per certificate object. A store with
//! several entries is collapsed to the first private key and its chain; a
//! store without a key keeps every certificate. The result is re-encoded
//! without a password.

use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;
use openssl::x509::X509;

use crate::errors::{AkvError, Result};
use crate::models::certificate::Thumbprint;

/// Normalized, passwordless PKCS#12 ready for upload.
#[derive(Debug, Clone)]
pub struct CollapsedPkcs12 {
    pub der: Vec<u8>,
    pub has_private_key: bool,
    pub certificate_count: usize,
    /// SHA-1 thumbprint of the leaf (the key's certificate, else the first).
    pub leaf_thumbprint: Option<Thumbprint>,
}

fn thumbprint_of(cert: &X509) -> Result<Thumbprint> {
    let digest = cert
        .digest(MessageDigest::sha1())
        .map_err(|e| AkvError::Internal(anyhow::anyhow!("thumbprint digest failed: {}", e)))?;
    Ok(Thumbprint::from_bytes(&digest))
}

/// Parses `pfx` with `password` and rebuilds it as described above.
pub fn collapse(pfx: &[u8], password: &str, friendly_name: &str) -> Result<CollapsedPkcs12> {
    let parsed = Pkcs12::from_der(pfx)
        .and_then(|p| p.parse2(password))
        .map_err(|e| {
            AkvError::config(format!(
                "certificate contents are not a PKCS#12 store readable with the supplied password: {}",
                e
            ))
        })?;

    let chain: Vec<X509> = parsed
        .ca
        .map(|stack| stack.into_iter().collect())
        .unwrap_or_default();

    let mut builder = Pkcs12::builder();
    builder.name(friendly_name);

    let (has_private_key, certificate_count, leaf) = match (&parsed.pkey, &parsed.cert) {
        (Some(pkey), Some(cert)) => {
            builder.pkey(pkey).cert(cert);
            (true, 1 + chain.len(), Some(cert.clone()))
        }
        _ => {
            let leaf = parsed.cert.clone().or_else(|| chain.first().cloned());
            (false, chain.len() + parsed.cert.iter().count(), leaf)
        }
    };

    let mut ca = Stack::new().map_err(|e| AkvError::Internal(e.into()))?;
    if !has_private_key {
        if let Some(cert) = &parsed.cert {
            ca.push(cert.clone()).map_err(|e| AkvError::Internal(e.into()))?;
        }
    }
    for cert in chain {
        ca.push(cert).map_err(|e| AkvError::Internal(e.into()))?;
    }
    if certificate_count == 0 {
        return Err(AkvError::config("PKCS#12 store contains no certificates"));
    }
    if !ca.is_empty() {
        builder.ca(ca);
    }

    let der = builder
        .build2("")
        .and_then(|p| p.to_der())
        .map_err(|e| AkvError::Internal(anyhow::anyhow!("failed to re-encode PKCS#12: {}", e)))?;

    let leaf_thumbprint = leaf.as_ref().map(thumbprint_of).transpose()?;
    tracing::debug!(
        has_private_key,
        certificate_count,
        thumbprint = leaf_thumbprint.as_ref().map(|t| t.as_str()).unwrap_or(""),
        "pkcs12 collapsed"
    );

    Ok(CollapsedPkcs12 {
        der,
        has_private_key,
        certificate_count,
        leaf_thumbprint,
    })
}
