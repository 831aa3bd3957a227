use std::fmt;

use zeroize::Zeroizing;

/// Secret value that marks "use the ambient managed identity".
pub const MANAGED_IDENTITY_SENTINEL: &str = "managed";

/// The identity a job authenticates as. Exactly one variant is active per
/// operation.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: Zeroizing<String>,
    },
    ManagedIdentity {
        /// Present for a user-assigned identity; `None` selects the
        /// system-assigned identity.
        client_id: Option<String>,
        tenant_id: Option<String>,
    },
}

impl Credential {
    /// Pure selection rule: an empty secret or the `managed` sentinel
    /// (case-insensitive) selects the managed identity, anything else a
    /// service principal built from the three fields verbatim.
    pub fn select(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        if client_secret.is_empty() || client_secret.eq_ignore_ascii_case(MANAGED_IDENTITY_SENTINEL) {
            Credential::ManagedIdentity {
                client_id: non_empty(client_id),
                tenant_id: non_empty(tenant_id),
            }
        } else {
            Credential::ServicePrincipal {
                tenant_id: tenant_id.to_string(),
                client_id: client_id.to_string(),
                client_secret: Zeroizing::new(client_secret.to_string()),
            }
        }
    }

    pub fn is_managed_identity(&self) -> bool {
        matches!(self, Credential::ManagedIdentity { .. })
    }

    pub fn is_user_assigned(&self) -> bool {
        matches!(self, Credential::ManagedIdentity { client_id: Some(_), .. })
    }

    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Credential::ServicePrincipal { tenant_id, .. } => non_empty_ref(tenant_id),
            Credential::ManagedIdentity { tenant_id, .. } => tenant_id.as_deref(),
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            Credential::ServicePrincipal { client_id, .. } => non_empty_ref(client_id),
            Credential::ManagedIdentity { client_id, .. } => client_id.as_deref(),
        }
    }

    /// The same identity scoped to another tenant (discovery traversal).
    pub fn for_tenant(&self, tenant: &str) -> Self {
        match self {
            Credential::ServicePrincipal {
                client_id,
                client_secret,
                ..
            } => Credential::ServicePrincipal {
                tenant_id: tenant.to_string(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
            Credential::ManagedIdentity { client_id, .. } => Credential::ManagedIdentity {
                client_id: client_id.clone(),
                tenant_id: non_empty(tenant),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ServicePrincipal { .. } => "service_principal",
            Credential::ManagedIdentity { client_id: Some(_), .. } => "user_assigned_identity",
            Credential::ManagedIdentity { client_id: None, .. } => "system_assigned_identity",
        }
    }
}

// Never print the secret.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ServicePrincipal {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
            Credential::ManagedIdentity {
                client_id,
                tenant_id,
            } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .field("tenant_id", tenant_id)
                .finish(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn non_empty_ref(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secret_selects_system_assigned_identity() {
        let cred = Credential::select("", "", "");
        assert_eq!(
            cred,
            Credential::ManagedIdentity {
                client_id: None,
                tenant_id: None
            }
        );
        assert!(!cred.is_user_assigned());
        assert_eq!(cred.kind(), "system_assigned_identity");
    }

    #[test]
    fn test_sentinel_is_case_insensitive() {
        for secret in ["managed", "MANAGED", "Managed", "mAnAgEd"] {
            assert!(Credential::select("t", "", secret).is_managed_identity(), "{secret}");
        }
    }

    #[test]
    fn test_client_id_with_sentinel_is_user_assigned() {
        let cred = Credential::select("tenant-1", "uami-client", "managed");
        assert!(cred.is_user_assigned());
        assert_eq!(cred.client_id(), Some("uami-client"));
        assert_eq!(cred.tenant_id(), Some("tenant-1"));
    }

    #[test]
    fn test_any_other_secret_selects_service_principal_verbatim() {
        let cred = Credential::select("tenant-1", "app-1", " s3cret ");
        match cred {
            Credential::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => {
                assert_eq!(tenant_id, "tenant-1");
                assert_eq!(client_id, "app-1");
                assert_eq!(client_secret.as_str(), " s3cret ");
            }
            other => panic!("expected service principal, got {:?}", other),
        }
    }

    #[test]
    fn test_managed_lookalike_is_a_secret() {
        assert!(!Credential::select("t", "c", "managedx").is_managed_identity());
        assert!(!Credential::select("t", "c", " managed").is_managed_identity());
    }

    #[test]
    fn test_for_tenant_keeps_identity() {
        let sp = Credential::select("home", "app", "pw").for_tenant("other");
        assert_eq!(sp.tenant_id(), Some("other"));
        assert_eq!(sp.client_id(), Some("app"));

        let mi = Credential::select("", "uami", "").for_tenant("other");
        assert!(mi.is_user_assigned());
        assert_eq!(mi.tenant_id(), Some("other"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = Credential::select("t", "c", "super-secret-value");
        let dbg = format!("{:?}", cred);
        assert!(!dbg.contains("super-secret-value"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
