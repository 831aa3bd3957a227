//! Shared fixtures for the wiremock-backed integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use akv_orchestrator::azure::auth::TokenSource;
use akv_orchestrator::azure::cloud::{CloudVariant, Endpoints};
use akv_orchestrator::azure::rest::{http_client, RestClient};
use akv_orchestrator::config::Config;
use akv_orchestrator::models::location::{SkuTier, VaultLocation};
use akv_orchestrator::vault::VaultClient;
use base64::Engine;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const SUB: &str = "sub-1";
pub const RG: &str = "rg-1";
pub const VAULT: &str = "kv-1";

/// Unsigned JWT carrying the identity claims the vault code reads.
pub fn jwt(oid: &str, tid: &str) -> String {
    let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    format!(
        "{}.{}.sig",
        enc.encode(br#"{"alg":"none","typ":"JWT"}"#),
        enc.encode(json!({ "oid": oid, "tid": tid }).to_string())
    )
}

pub fn config(server: &MockServer) -> Config {
    Config::with_base_url(&server.uri())
}

pub fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints::new(CloudVariant::Public, None, &config(server))
}

pub fn rest(server: &MockServer, token: &str) -> RestClient {
    let cfg = config(server);
    RestClient::new(
        http_client(&cfg).unwrap(),
        Arc::new(TokenSource::fixed(token)),
        &cfg,
    )
}

pub fn location() -> VaultLocation {
    VaultLocation {
        subscription_id: SUB.into(),
        resource_group: RG.into(),
        vault_name: VAULT.into(),
        region: None,
        sku: SkuTier::Standard,
        cloud: CloudVariant::Public,
    }
}

pub fn vault_client(server: &MockServer) -> VaultClient {
    VaultClient::with_rest(location(), endpoints(server), rest(server, &jwt("caller-oid", "caller-tid")))
}

pub fn vault_arm_path(suffix: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.KeyVault/vaults/{}{}",
        SUB, RG, VAULT, suffix
    )
}

/// Certificate bundle as the data plane returns it.
pub fn bundle(alias: &str, x5t: &str, tags: &[(&str, &str)]) -> Value {
    let tags: HashMap<&str, &str> = tags.iter().copied().collect();
    json!({
        "id": format!("https://{}.vault.azure.net/certificates/{}/v1", VAULT, alias),
        "kid": format!("https://{}.vault.azure.net/keys/{}/v1", VAULT, alias),
        "x5t": x5t,
        "attributes": { "enabled": true },
        "tags": tags,
        "policy": { "key_props": { "exportable": true } }
    })
}

pub fn list_item(server: &MockServer, alias: &str) -> Value {
    json!({ "id": format!("{}/certificates/{}", server.uri(), alias) })
}

pub fn token_response(token: &str) -> Value {
    json!({ "token_type": "Bearer", "expires_in": 3599, "access_token": token })
}

/// Self-signed PKCS#12 for `cn` (also its only DNS SAN).
pub fn pfx(cn: &str, password: &str) -> Vec<u8> {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut b = X509::builder().unwrap();
    b.set_version(2).unwrap();
    b.set_serial_number(&BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap())
        .unwrap();
    b.set_subject_name(&name).unwrap();
    b.set_issuer_name(&name).unwrap();
    b.set_pubkey(&key).unwrap();
    b.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    b.set_not_after(&Asn1Time::days_from_now(90).unwrap()).unwrap();
    let san = SubjectAlternativeName::new()
        .dns(cn)
        .build(&b.x509v3_context(None, None))
        .unwrap();
    b.append_extension(san).unwrap();
    b.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = b.build();

    let mut p = Pkcs12::builder();
    p.name(cn).pkey(&key).cert(&cert);
    p.build2(password).unwrap().to_der().unwrap()
}
