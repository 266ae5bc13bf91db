//! OAuth discovery metadata.
//!
//! Callers discover the gateway's own endpoints here, not the upstream's:
//! the proxy is the authorization server as far as they are concerned.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::HashMap;

use super::{AppState, OAuthError};

fn tenant_param(query: &HashMap<String, String>) -> Option<&String> {
    query.get("tenant").filter(|t| !t.is_empty())
}

/// GET /.well-known/oauth-authorization-server?tenant=<id>
pub async fn authorization_server(
    State(app): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(tenant) = tenant_param(&query) else {
        return OAuthError::invalid_request("tenant query parameter is required").into_response();
    };
    if app.registry.credentials_for(tenant).is_none() {
        return OAuthError::not_found(format!("tenant '{tenant}' is not configured"))
            .into_response();
    }

    let public_url = &app.config.server.public_url;
    let tenant_query = format!("tenant={}", urlencoding::encode(tenant));
    Json(json!({
        "issuer": public_url,
        "authorization_endpoint": format!("{public_url}/oauth2/authorize?{tenant_query}"),
        "token_endpoint": format!("{public_url}/oauth2/token?{tenant_query}"),
        "registration_endpoint": format!("{public_url}/oauth2/register?{tenant_query}"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token", "password"],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
    }))
    .into_response()
}

/// GET /.well-known/oauth-protected-resource?tenant=<id>
pub async fn protected_resource(
    State(app): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(tenant) = tenant_param(&query) else {
        return OAuthError::invalid_request("tenant query parameter is required").into_response();
    };
    if app.registry.credentials_for(tenant).is_none() {
        return OAuthError::not_found(format!("tenant '{tenant}' is not configured"))
            .into_response();
    }

    let public_url = &app.config.server.public_url;
    let tenant_query = format!("tenant={}", urlencoding::encode(tenant));
    Json(json!({
        "resource": format!("{public_url}/mcp?{tenant_query}"),
        "authorization_servers": [
            format!("{public_url}/.well-known/oauth-authorization-server?{tenant_query}")
        ],
        "bearer_methods_supported": ["header"],
    }))
    .into_response()
}
