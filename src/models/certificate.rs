use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// SHA-1 certificate thumbprint: uppercase hex, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thumbprint(String);

impl Thumbprint {
    pub fn from_bytes(raw: &[u8]) -> Self {
        Thumbprint(hex::encode_upper(raw))
    }

    /// Normalizes a provider-formatted thumbprint. Surrounding quotes,
    /// whitespace and `:`/`-` separators are dropped and the result is
    /// upper-cased, so `parse(t.as_str()) == t` for any `t`.
    pub fn parse(formatted: &str) -> Option<Self> {
        let cleaned: String = formatted
            .chars()
            .filter(|c| !matches!(c, '"' | '\'' | ':' | '-' | ' ' | '\t'))
            .collect::<String>()
            .to_ascii_uppercase();
        if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Thumbprint(cleaned))
    }

    /// Decodes the base64url `x5t` field Key Vault returns.
    pub fn from_x5t(x5t: &str) -> Option<Self> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(x5t.trim_end_matches('='))
            .ok()
            .filter(|b| !b.is_empty())
            .map(|b| Self::from_bytes(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A certificate as read back from the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub alias: String,
    pub version: String,
    pub thumbprint: Thumbprint,
    pub san_list: Vec<String>,
    pub tags: HashMap<String, String>,
    pub has_private_key: bool,
    pub enabled: bool,
    pub certificate_der: Vec<u8>,
}

impl CertificateRecord {
    pub fn der_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.certificate_der)
    }
}

/// Tags for an import: the requested tags, plus (when `preserve`) every
/// existing tag whose key the request does not set.
pub fn merge_tags(
    requested: &HashMap<String, String>,
    existing: &HashMap<String, String>,
    preserve: bool,
) -> HashMap<String, String> {
    let mut merged = requested.clone();
    if preserve {
        for (k, v) in existing {
            merged.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    merged
}
