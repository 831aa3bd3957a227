//! App Service binding reconciliation against a mock resource manager.

mod common;

use std::collections::HashMap;

use akv_orchestrator::binding::AppServiceClient;
use akv_orchestrator::models::binding::{PlatformCertificate, VaultCertificateRef, WebSite};
use akv_orchestrator::models::certificate::{CertificateRecord, Thumbprint};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

const THUMB: &str = "AB12CD34";
const WEB_RG: &str = "rg-web";

fn site_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
        SUB, WEB_RG, name
    )
}

fn site_json(name: &str, hosts: &[&str]) -> Value {
    json!({
        "id": site_id(name),
        "name": name,
        "location": "East US",
        "properties": {
            "hostNames": hosts,
            "serverFarmId": format!("/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/serverfarms/plan", SUB, WEB_RG)
        }
    })
}

fn platform_cert_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/certificates/{}",
        SUB, WEB_RG, name
    )
}

fn platform_cert_json(name: &str) -> Value {
    json!({
        "id": platform_cert_id(name),
        "name": name,
        "location": "East US",
        "properties": {
            "thumbprint": format!("\"{}\"", THUMB),
            "hostNames": ["*.contoso.com"],
            "keyVaultId": vault_arm_path(""),
            "keyVaultSecretName": "web"
        }
    })
}

fn binding_json(site: &str, host: &str, thumbprint: Option<&str>, ssl: &str) -> Value {
    json!({
        "id": format!("{}/hostNameBindings/{}", site_id(site), host),
        "name": format!("{}/{}", site, host),
        "properties": { "siteName": site, "sslState": ssl, "thumbprint": thumbprint }
    })
}

fn client(server: &MockServer) -> AppServiceClient {
    AppServiceClient::with_rest(SUB, endpoints(server), rest(server, "tok"))
}

fn platform_cert() -> PlatformCertificate {
    PlatformCertificate {
        id: platform_cert_id("kv-1-web"),
        name: "kv-1-web".into(),
        location: "East US".into(),
        thumbprint: Thumbprint::parse(THUMB),
        host_names: vec!["*.contoso.com".into()],
        key_vault_id: Some(vault_arm_path("")),
        key_vault_secret_name: Some("web".into()),
    }
}

fn shop() -> WebSite {
    WebSite {
        id: site_id("shop"),
        name: "shop".into(),
        location: "East US".into(),
        server_farm_id: None,
        host_names: vec!["shop.azurewebsites.net".into(), "shop.contoso.com".into()],
        repository_site_name: None,
    }
}

/// One resource group holding shop, blog (both contoso) and a fabrikam site.
async fn mount_sites(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": WEB_RG}]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                site_json("shop", &["shop.azurewebsites.net", "shop.contoso.com"]),
                site_json("blog", &["blog.contoso.com"]),
                site_json("other", &["other.fabrikam.com"]),
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_wildcard_hostname_finds_matching_sites() {
    let server = MockServer::start().await;
    mount_sites(&server).await;

    let search = client(&server)
        .find_sites_for_hostname("*.contoso.com")
        .await
        .unwrap();
    let names: Vec<&str> = search.sites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["shop", "blog"]);
    assert!(search.failures.is_empty());

    let none = client(&server).find_sites_for_hostname("*").await.unwrap();
    assert!(none.sites.is_empty());
}

#[tokio::test]
async fn test_bind_fans_out_and_isolates_site_failures() {
    let server = MockServer::start().await;
    mount_sites(&server).await;

    Mock::given(method("GET"))
        .and(path(vault_arm_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": vault_arm_path("") })))
        .mount(&server)
        .await;
    for (name, hosts) in [
        ("shop", vec!["shop.azurewebsites.net", "shop.contoso.com"]),
        ("blog", vec!["blog.contoso.com"]),
    ] {
        Mock::given(method("GET"))
            .and(path(site_id(name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(site_json(name, &hosts)))
            .mount(&server)
            .await;
    }
    Mock::given(method("PUT"))
        .and(path(platform_cert_id("kv-1-web")))
        .and(body_partial_json(json!({
            "properties": {"keyVaultSecretName": "web"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(platform_cert_json("kv-1-web")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop"))))
        .and(body_partial_json(json!({
            "properties": {"sslState": "SniEnabled", "thumbprint": THUMB}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(binding_json(
            "shop",
            "shop.contoso.com",
            Some(THUMB),
            "SniEnabled",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/blog.contoso.com", site_id("blog"))))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": "InternalServerError", "message": "binding store unavailable"}
        })))
        .mount(&server)
        .await;

    let cert = CertificateRecord {
        alias: "web".into(),
        version: "v1".into(),
        thumbprint: Thumbprint::parse(THUMB).unwrap(),
        san_list: vec!["*.contoso.com".into()],
        tags: HashMap::new(),
        has_private_key: true,
        enabled: true,
        certificate_der: Vec::new(),
    };
    let vault_ref = VaultCertificateRef {
        vault_resource_id: vault_arm_path(""),
        secret_name: "web".into(),
    };

    let report = client(&server)
        .bind_certificate_from_vault(&cert, &vault_ref)
        .await
        .unwrap();

    assert_eq!(report.bound_sites, vec!["shop".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("blog"));
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_remove_binding_clears_only_matching_thumbprint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                binding_json("shop", "shop.azurewebsites.net", None, "Disabled"),
                binding_json("shop", "shop.contoso.com", Some(THUMB), "SniEnabled"),
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop"))))
        .and(body_partial_json(json!({
            "properties": {"sslState": "Disabled", "thumbprint": null}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(binding_json(
            "shop",
            "shop.contoso.com",
            None,
            "Disabled",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let cleared = client(&server)
        .remove_binding(&shop(), &platform_cert())
        .await
        .unwrap();
    assert_eq!(
        cleared,
        Some(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop")))
    );
}

#[tokio::test]
async fn test_is_bound_ignores_disabled_bindings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [binding_json("shop", "shop.contoso.com", Some(THUMB), "SniEnabled")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [binding_json("shop", "shop.contoso.com", Some(THUMB), "Disabled")]
        })))
        .mount(&server)
        .await;

    let c = client(&server);
    let bound = c.is_bound(&shop(), &platform_cert()).await.unwrap();
    assert_eq!(bound.map(|b| b.hostname), Some("shop.contoso.com".to_string()));
    assert!(c.is_bound(&shop(), &platform_cert()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unbind_clears_bindings_then_deletes_platform_certificate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": WEB_RG}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [site_json("shop", &["shop.contoso.com"])]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/certificates",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [platform_cert_json("kv-1-web")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [binding_json("shop", "shop.contoso.com", Some(THUMB), "SniEnabled")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(binding_json(
            "shop",
            "shop.contoso.com",
            None,
            "Disabled",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(platform_cert_id("kv-1-web")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = client(&server)
        .unbind_certificate(&Thumbprint::parse(THUMB).unwrap())
        .await
        .unwrap();
    assert_eq!(report.cleared_bindings.len(), 1);
    assert!(report.is_clean());
}

async fn mount_denied_group(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{}/resourcegroups", SUB)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "rg-denied"}, {"name": WEB_RG}]
        })))
        .mount(server)
        .await;
    for kind in ["sites", "certificates"] {
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/resourceGroups/rg-denied/providers/Microsoft.Web/{}",
                SUB, kind
            )))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "AuthorizationFailed", "message": "deny assignment"}
            })))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_unreadable_resource_group_does_not_stop_site_search() {
    let server = MockServer::start().await;
    mount_denied_group(&server).await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [site_json("shop", &["shop.contoso.com"])]
        })))
        .mount(&server)
        .await;

    let search = client(&server)
        .find_sites_for_hostname("shop.contoso.com")
        .await
        .unwrap();

    let names: Vec<&str> = search.sites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["shop"]);
    assert_eq!(search.failures.len(), 1);
    assert!(search.failures[0].contains("rg-denied"));
}

#[tokio::test]
async fn test_unbind_continues_past_unreadable_resource_group() {
    let server = MockServer::start().await;
    mount_denied_group(&server).await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [site_json("shop", &["shop.contoso.com"])]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/certificates",
            SUB, WEB_RG
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [platform_cert_json("kv-1-web")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [binding_json("shop", "shop.contoso.com", Some(THUMB), "SniEnabled")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(binding_json(
            "shop",
            "shop.contoso.com",
            None,
            "Disabled",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(platform_cert_id("kv-1-web")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let report = client(&server)
        .unbind_certificate(&Thumbprint::parse(THUMB).unwrap())
        .await
        .unwrap();

    assert_eq!(report.cleared_bindings.len(), 1);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.contains("rg-denied")));
}

#[tokio::test]
async fn test_binding_update_names_the_repository_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/hostNameBindings", site_id("shop"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [binding_json("shop", "shop.contoso.com", Some(THUMB), "SniEnabled")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/hostNameBindings/shop.contoso.com", site_id("shop"))))
        .and(body_partial_json(json!({
            "properties": {"siteName": "shop-repo"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(binding_json(
            "shop",
            "shop.contoso.com",
            None,
            "Disabled",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let site = WebSite {
        repository_site_name: Some("shop-repo".into()),
        ..shop()
    };
    let cleared = client(&server)
        .remove_binding(&site, &platform_cert())
        .await
        .unwrap();
    assert!(cleared.is_some());
}
