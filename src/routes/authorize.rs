//! Authorize proxy.
//!
//! A pure URL-rewrite-and-redirect: no upstream call happens here. The
//! caller's query parameters are forwarded to the tenant's authorization
//! endpoint with the tenant's real client id substituted, the configured
//! redirect URI enforced, and the caller's `state` wrapped into an encoded
//! value that survives the upstream round trip.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;

use super::{AppState, OAuthError};
use crate::oauth::state::{self, OAuthState};
use crate::tenants::TenantCredentials;

/// Parameters consumed by the proxy rather than forwarded verbatim:
/// `client_id` and `redirect_uri` are replaced with the tenant's real
/// values, `state` is re-encoded, `tenant` and `resource` are addressing.
const CONSUMED_PARAMS: &[&str] = &["tenant", "resource", "state", "client_id", "redirect_uri"];

/// GET /oauth2/authorize
pub async fn authorize(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(tenant) = determine_tenant(&params) else {
        return OAuthError::invalid_request(
            "tenant could not be determined; pass ?tenant=<id> or a resource URL containing /mcp/<id>",
        )
        .into_response();
    };

    let Some(credentials) = app.registry.credentials_for(&tenant) else {
        tracing::warn!(tenant = %tenant, "authorize request for unconfigured tenant");
        return OAuthError::not_found(format!("tenant '{tenant}' is not configured"))
            .into_response();
    };

    let endpoints = match app.registry.oauth_endpoints_for(&tenant) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            tracing::error!(tenant = %tenant, error = %e, "endpoint derivation failed");
            return OAuthError::server_error("failed to derive upstream OAuth endpoints")
                .into_response();
        }
    };

    let location = build_authorize_url(&endpoints.authorization_url, &params, &credentials, &tenant);
    tracing::debug!(tenant = %tenant, "redirecting to upstream authorize endpoint");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Tenant sources in precedence order: the explicit `tenant` parameter,
/// then the `resource` URL whose path carries a `/mcp/<tenant>` segment.
fn determine_tenant(params: &HashMap<String, String>) -> Option<String> {
    if let Some(tenant) = params.get("tenant").filter(|t| !t.is_empty()) {
        return Some(tenant.clone());
    }
    params
        .get("resource")
        .and_then(|resource| tenant_from_resource(resource))
}

fn tenant_from_resource(resource: &str) -> Option<String> {
    let segment_regex = regex_lite::Regex::new(r"/mcp/([^/?#]+)").unwrap();
    segment_regex
        .captures(resource)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Assemble the upstream authorization URL. Forwarded parameters keep their
/// values verbatim; empty values are dropped along with [`CONSUMED_PARAMS`].
/// The tenant's client id always overrides the caller's, the configured
/// redirect URI wins over a caller-supplied one, and the caller's `state`
/// travels inside the encoded replacement.
fn build_authorize_url(
    authorization_url: &str,
    params: &HashMap<String, String>,
    credentials: &TenantCredentials,
    tenant: &str,
) -> String {
    let mut query: Vec<(String, String)> = params
        .iter()
        .filter(|(key, value)| !CONSUMED_PARAMS.contains(&key.as_str()) && !value.is_empty())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    // map iteration order is arbitrary; keep the URL stable
    query.sort();

    query.push(("client_id".to_string(), credentials.client_id.clone()));

    let redirect_uri = credentials.redirect_uri.clone().or_else(|| {
        params
            .get("redirect_uri")
            .filter(|uri| !uri.is_empty())
            .cloned()
    });
    if let Some(redirect_uri) = redirect_uri {
        query.push(("redirect_uri".to_string(), redirect_uri));
    }

    let encoded = state::encode(&OAuthState {
        tenant: tenant.to_string(),
        state: params.get("state").filter(|s| !s.is_empty()).cloned(),
        redirect_uri: None,
    });
    query.push(("state".to_string(), encoded));

    let query_string = query
        .iter()
        .map(|(key, value)| {
            format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{authorization_url}?{query_string}")
}
