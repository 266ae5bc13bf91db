//! Credential resolution.
//!
//! Both proxy legs end up presenting exactly one real credential pair to
//! the upstream, never a caller-controlled one. A caller-supplied client id
//! that names a virtual client additionally rewrites the effective tenant
//! to the virtual client's owner.

use crate::oauth::virtual_clients::VirtualClientStore;
use crate::tenants::TenantRegistry;

/// Credentials chosen for one request, plus the tenant they belong to.
/// The tenant id here is authoritative for all subsequent lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

/// Resolve the upstream credentials for a request.
///
/// A supplied client id is checked against the virtual client store; on a
/// hit the owning tenant's credentials win and the caller's `tenant` is
/// ignored. On a miss (or no supplied id) the tenant's own credentials are
/// used. `None` means the relevant tenant is not configured.
pub async fn resolve(
    registry: &TenantRegistry,
    store: &VirtualClientStore,
    supplied_client_id: Option<&str>,
    tenant: &str,
) -> Option<ResolvedCredentials> {
    if let Some(client_id) = supplied_client_id {
        if let Some(virtual_client) = store.lookup(client_id).await {
            let owner = virtual_client.tenant_id;
            let Some(credentials) = registry.credentials_for(&owner) else {
                // Configuration drift: the owning tenant has vanished
                tracing::warn!(
                    client_id = %client_id,
                    tenant = %owner,
                    "virtual client references an unconfigured tenant"
                );
                return None;
            };
            tracing::debug!(client_id = %client_id, tenant = %owner, "resolved virtual client");
            return Some(ResolvedCredentials {
                client_id: credentials.client_id,
                client_secret: credentials.client_secret,
                tenant_id: owner,
            });
        }
    }

    let credentials = registry.credentials_for(tenant)?;
    Some(ResolvedCredentials {
        client_id: credentials.client_id,
        client_secret: credentials.client_secret,
        tenant_id: tenant.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn registry(tenants: &[&str]) -> TenantRegistry {
        let mut credentials = HashMap::new();
        for tenant in tenants {
            let normalized = TenantRegistry::normalize(tenant);
            credentials.insert(
                format!("LMS_{normalized}_CLIENT_ID"),
                format!("{tenant}-id"),
            );
            credentials.insert(
                format!("LMS_{normalized}_CLIENT_SECRET"),
                format!("{tenant}-secret"),
            );
        }
        TenantRegistry::from_parts(
            credentials,
            "lmscloud.example".to_string(),
            "/api/v1".to_string(),
        )
    }

    fn store(dir: &tempfile::TempDir) -> VirtualClientStore {
        VirtualClientStore::new(dir.path().join("clients.txt"), vec![0x11; 32])
    }

    #[tokio::test]
    async fn test_no_client_id_uses_tenant_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve(&registry(&["acme"]), &store(&dir), None, "acme")
            .await
            .unwrap();
        assert_eq!(resolved.client_id, "acme-id");
        assert_eq!(resolved.client_secret, "acme-secret");
        assert_eq!(resolved.tenant_id, "acme");
    }

    #[tokio::test]
    async fn test_unconfigured_tenant_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve(&registry(&[]), &store(&dir), None, "acme")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_virtual_client_redirects_to_owning_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.initialize().await.unwrap();
        let registration = store.register("beta", None, None).await.unwrap();

        // Caller claims tenant "acme" but the virtual client belongs to "beta"
        let resolved = resolve(
            &registry(&["acme", "beta"]),
            &store,
            Some(&registration.client_id),
            "acme",
        )
        .await
        .unwrap();
        assert_eq!(resolved.tenant_id, "beta");
        assert_eq!(resolved.client_id, "beta-id");
        assert_eq!(resolved.client_secret, "beta-secret");
    }

    #[tokio::test]
    async fn test_virtual_client_with_vanished_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.initialize().await.unwrap();
        let registration = store.register("gone", None, None).await.unwrap();

        assert!(resolve(
            &registry(&["acme"]),
            &store,
            Some(&registration.client_id),
            "acme"
        )
        .await
        .is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_id_falls_back_to_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.initialize().await.unwrap();

        // The supplied id is not a virtual client; the tenant's real
        // client id wins over whatever the caller sent.
        let resolved = resolve(
            &registry(&["acme"]),
            &store,
            Some("caller-made-this-up"),
            "acme",
        )
        .await
        .unwrap();
        assert_eq!(resolved.client_id, "acme-id");
        assert_eq!(resolved.tenant_id, "acme");
    }
}
