//! Tenant registry.
//!
//! A tenant is an independently configured LMS instance addressed as
//! `https://{tenant}.{upstream domain}`. Credentials come from the
//! environment snapshot carried on [`Config`]; a tenant is configured iff
//! both its client id and client secret are present.

use regex_lite::Regex;
use std::collections::{BTreeSet, HashMap};

use crate::config::{Config, TENANT_ENV_PREFIX};

/// Upstream OAuth2 client credentials for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Fixed redirect URI registered upstream. When set, it overrides any
    /// caller-supplied redirect_uri on both the authorize and token legs.
    pub redirect_uri: Option<String>,
}

/// Resolved view of one tenant: identity, derived base URL, credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub base_url: String,
    pub credentials: TenantCredentials,
}

/// Upstream OAuth2 endpoints, derived from the tenant's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorization_url: String,
    pub token_url: String,
}

/// Read-only credential and endpoint resolution for all tenants.
pub struct TenantRegistry {
    credentials: HashMap<String, String>,
    upstream_domain: String,
    api_path: String,
}

impl TenantRegistry {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(
            config.tenant_env.clone(),
            config.upstream.domain.clone(),
            config.upstream.api_path.clone(),
        )
    }

    pub fn from_parts(
        credentials: HashMap<String, String>,
        upstream_domain: String,
        api_path: String,
    ) -> Self {
        Self {
            credentials,
            upstream_domain,
            api_path,
        }
    }

    /// Credential-key form of a tenant id: uppercase, every non-alphanumeric
    /// character replaced by `_`.
    pub fn normalize(tenant: &str) -> String {
        tenant
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn credential_value(&self, tenant: &str, suffix: &str) -> Option<String> {
        let key = format!("{TENANT_ENV_PREFIX}{}_{suffix}", Self::normalize(tenant));
        self.credentials
            .get(&key)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    /// Credentials for a tenant, or `None` when either half is missing.
    pub fn credentials_for(&self, tenant: &str) -> Option<TenantCredentials> {
        let client_id = self.credential_value(tenant, "CLIENT_ID");
        let client_secret = self.credential_value(tenant, "CLIENT_SECRET");
        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Some(TenantCredentials {
                client_id,
                client_secret,
                redirect_uri: self.credential_value(tenant, "REDIRECT_URI"),
            }),
            _ => {
                tracing::debug!(tenant = %tenant, "no complete credential set for tenant");
                None
            }
        }
    }

    /// Upstream base URL, derived from the tenant id alone. Fails when the
    /// id cannot form a hostname label.
    pub fn derive_base_url(&self, tenant: &str) -> Result<String, String> {
        let label_regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
        if !label_regex.is_match(tenant) {
            return Err(format!(
                "tenant id '{tenant}' cannot form a hostname label"
            ));
        }
        Ok(format!("https://{tenant}.{}", self.upstream_domain))
    }

    pub fn config_for(&self, tenant: &str) -> Option<TenantConfig> {
        let credentials = self.credentials_for(tenant)?;
        let base_url = self.derive_base_url(tenant).ok()?;
        Some(TenantConfig {
            tenant_id: tenant.to_string(),
            base_url,
            credentials,
        })
    }

    /// OAuth2 endpoints for a tenant. Pure derivation from the base URL;
    /// configuration presence is checked separately via [`credentials_for`].
    ///
    /// [`credentials_for`]: Self::credentials_for
    pub fn oauth_endpoints_for(&self, tenant: &str) -> Result<OAuthEndpoints, String> {
        let base_url = self.derive_base_url(tenant)?;
        Ok(OAuthEndpoints {
            authorization_url: format!("{base_url}/oauth2/authorize"),
            token_url: format!("{base_url}/oauth2/token"),
        })
    }

    pub fn api_base_url_for(&self, tenant: &str) -> Option<String> {
        self.credentials_for(tenant)?;
        let base_url = self.derive_base_url(tenant).ok()?;
        Some(format!("{base_url}{}", self.api_path))
    }

    /// All tenants with a complete credential set, recovered by scanning the
    /// credential keys and denormalizing back to tenant-id form.
    pub fn list_configured_tenants(&self) -> BTreeSet<String> {
        let id_key_regex =
            Regex::new(&format!("^{TENANT_ENV_PREFIX}([A-Z0-9_]+)_CLIENT_ID$")).unwrap();
        self.credentials
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .filter_map(|(key, _)| {
                let caps = id_key_regex.captures(key)?;
                let normalized = caps.get(1)?.as_str();
                let secret_key = format!("{TENANT_ENV_PREFIX}{normalized}_CLIENT_SECRET");
                self.credentials
                    .get(&secret_key)
                    .filter(|secret| !secret.is_empty())?;
                Some(normalized.to_lowercase().replace('_', "-"))
            })
            .collect()
    }
}
