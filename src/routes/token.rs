//! Token proxy.
//!
//! Determines the tenant from the request (body, query, or the encoded
//! `state` issued on the authorize leg), swaps in real upstream
//! credentials, forwards the grant to the tenant's token endpoint, and
//! relays the upstream response verbatim. Upstream OAuth errors are
//! transported, not reinterpreted.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use std::collections::HashMap;

use super::{AppState, OAuthError};
use crate::oauth::resolver::{self, ResolvedCredentials};
use crate::oauth::state;

/// Scope substituted into password grants that send `scope` present but
/// empty. An entirely absent field stays absent.
const DEFAULT_PASSWORD_SCOPE: &str = "default";

/// POST /oauth2/token
pub async fn token(
    State(app): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    Form(body): Form<HashMap<String, String>>,
) -> Response {
    let Some(grant_type) = body.get("grant_type").filter(|g| !g.is_empty()).cloned() else {
        return OAuthError::invalid_request("grant_type is required").into_response();
    };

    let tenant = match determine_tenant(&grant_type, &body, &query) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };

    let supplied_client_id = body
        .get("client_id")
        .filter(|id| !id.is_empty())
        .map(String::as_str);
    let Some(resolved) =
        resolver::resolve(&app.registry, &app.store, supplied_client_id, &tenant).await
    else {
        tracing::warn!(tenant = %tenant, "token request could not resolve credentials");
        return OAuthError::not_found(format!("tenant '{tenant}' is not configured"))
            .into_response();
    };

    // A virtual client may have rewritten the tenant; the resolver's answer
    // is authoritative from here on.
    let tenant = resolved.tenant_id.clone();

    let Some(credentials) = app.registry.credentials_for(&tenant) else {
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

    let form = build_token_body(
        &grant_type,
        &body,
        &resolved,
        credentials.redirect_uri.as_deref(),
    );

    tracing::debug!(tenant = %tenant, grant_type = %grant_type, "forwarding token request upstream");
    let upstream = match app.http.post(&endpoints.token_url).form(&form).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(tenant = %tenant, error = %e, "upstream token request failed");
            return OAuthError::server_error("upstream token request failed").into_response();
        }
    };

    let status = upstream.status().as_u16();
    let payload: serde_json::Value = match upstream.json().await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(tenant = %tenant, error = %e, "upstream token response was not JSON");
            return OAuthError::server_error("upstream token response was not valid JSON")
                .into_response();
        }
    };

    // Relay upstream status and body untouched, success or error alike
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(payload)).into_response()
}

/// Tenant determination per grant type. Sources are tried in order: the
/// request body, the query string, and (for authorization_code only) the
/// tenant embedded in the `state` value this gateway issued.
fn determine_tenant(
    grant_type: &str,
    body: &HashMap<String, String>,
    query: &HashMap<String, String>,
) -> Result<String, OAuthError> {
    let explicit = [body.get("tenant"), query.get("tenant")]
        .into_iter()
        .flatten()
        .find(|tenant| !tenant.is_empty())
        .cloned();

    match grant_type {
        "authorization_code" => explicit
            .or_else(|| {
                body.get("state")
                    .and_then(|token| state::decode(token))
                    .map(|decoded| decoded.tenant)
            })
            .ok_or_else(|| {
                OAuthError::invalid_request(
                    "tenant could not be determined; pass tenant=<id> in the body or query, \
                     or include the state value issued by this gateway",
                )
            }),
        "refresh_token" | "password" => explicit.ok_or_else(|| {
            OAuthError::invalid_request(format!(
                "tenant is required for the {grant_type} grant; pass tenant=<id> in the body or query"
            ))
        }),
        other => Err(OAuthError::unsupported_grant_type(format!(
            "grant type '{other}' is not supported"
        ))),
    }
}

/// Assemble the upstream form body for a grant. The resolved credentials
/// always replace whatever the caller sent; a configured redirect URI wins
/// over a caller-supplied one so it matches what was registered upstream.
fn build_token_body(
    grant_type: &str,
    body: &HashMap<String, String>,
    resolved: &ResolvedCredentials,
    fixed_redirect_uri: Option<&str>,
) -> Vec<(String, String)> {
    let mut form = vec![
        ("grant_type".to_string(), grant_type.to_string()),
        ("client_id".to_string(), resolved.client_id.clone()),
        ("client_secret".to_string(), resolved.client_secret.clone()),
    ];
    let non_empty = |key: &str| body.get(key).filter(|value| !value.is_empty()).cloned();

    match grant_type {
        "authorization_code" => {
            if let Some(code) = non_empty("code") {
                form.push(("code".to_string(), code));
            }
            let redirect_uri = fixed_redirect_uri
                .map(str::to_string)
                .or_else(|| non_empty("redirect_uri"));
            if let Some(redirect_uri) = redirect_uri {
                form.push(("redirect_uri".to_string(), redirect_uri));
            }
            if let Some(verifier) = non_empty("code_verifier") {
                form.push(("code_verifier".to_string(), verifier));
            }
        }
        "refresh_token" => {
            if let Some(refresh_token) = non_empty("refresh_token") {
                form.push(("refresh_token".to_string(), refresh_token));
            }
            if let Some(scope) = non_empty("scope") {
                form.push(("scope".to_string(), scope));
            }
        }
        "password" => {
            if let Some(username) = body.get("username") {
                form.push(("username".to_string(), username.clone()));
            }
            if let Some(password) = body.get("password") {
                form.push(("password".to_string(), password.clone()));
            }
            match body.get("scope") {
                Some(scope) if scope.is_empty() => {
                    form.push(("scope".to_string(), DEFAULT_PASSWORD_SCOPE.to_string()));
                }
                Some(scope) => form.push(("scope".to_string(), scope.clone())),
                None => {}
            }
        }
        _ => {}
    }

    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::state::OAuthState;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resolved() -> ResolvedCredentials {
        ResolvedCredentials {
            client_id: "real-id".to_string(),
            client_secret: "real-secret".to_string(),
            tenant_id: "acme".to_string(),
        }
    }

    fn value_of<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_tenant_from_body_wins() {
        let body = map(&[("tenant", "acme")]);
        let query = map(&[("tenant", "beta")]);
        let tenant = determine_tenant("authorization_code", &body, &query).unwrap();
        assert_eq!(tenant, "acme");
    }

    #[test]
    fn test_tenant_from_query_when_body_empty() {
        let body = map(&[("tenant", "")]);
        let query = map(&[("tenant", "beta")]);
        let tenant = determine_tenant("refresh_token", &body, &query).unwrap();
        assert_eq!(tenant, "beta");
    }

    #[test]
    fn test_auth_code_falls_back_to_state() {
        let encoded = state::encode(&OAuthState {
            tenant: "acme".to_string(),
            state: Some("caller".to_string()),
            redirect_uri: None,
        });
        let body = map(&[("state", encoded.as_str()), ("code", "abc")]);
        let tenant = determine_tenant("authorization_code", &body, &HashMap::new()).unwrap();
        assert_eq!(tenant, "acme");
    }

    #[test]
    fn test_auth_code_without_any_tenant_source() {
        let body = map(&[("code", "abc"), ("state", "garbage-state")]);
        let error = determine_tenant("authorization_code", &body, &HashMap::new()).unwrap_err();
        let rendered = serde_json::to_value(&error).unwrap();
        assert_eq!(rendered["error"], "invalid_request");
        assert!(rendered["error_description"]
            .as_str()
            .unwrap()
            .contains("tenant"));
    }

    #[test]
    fn test_refresh_token_requires_explicit_tenant() {
        // refresh_token never consults state
        let encoded = state::encode(&OAuthState {
            tenant: "acme".to_string(),
            state: None,
            redirect_uri: None,
        });
        let body = map(&[("state", encoded.as_str())]);
        assert!(determine_tenant("refresh_token", &body, &HashMap::new()).is_err());
    }

    #[test]
    fn test_unsupported_grant_type() {
        let body = map(&[("tenant", "acme")]);
        let error = determine_tenant("client_credentials", &body, &HashMap::new()).unwrap_err();
        let rendered = serde_json::to_value(&error).unwrap();
        assert_eq!(rendered["error"], "unsupported_grant_type");
        assert!(rendered["error_description"]
            .as_str()
            .unwrap()
            .contains("client_credentials"));
    }

    #[test]
    fn test_refresh_token_body() {
        let body = map(&[
            ("grant_type", "refresh_token"),
            ("tenant", "acme"),
            ("refresh_token", "r1"),
        ]);
        let form = build_token_body("refresh_token", &body, &resolved(), None);
        assert_eq!(value_of(&form, "grant_type"), Some("refresh_token"));
        assert_eq!(value_of(&form, "client_id"), Some("real-id"));
        assert_eq!(value_of(&form, "client_secret"), Some("real-secret"));
        assert_eq!(value_of(&form, "refresh_token"), Some("r1"));
        assert_eq!(value_of(&form, "scope"), None);
    }

    #[test]
    fn test_auth_code_body_with_pkce_and_fixed_redirect() {
        let body = map(&[
            ("code", "abc"),
            ("redirect_uri", "https://caller.example.com/cb"),
            ("code_verifier", "verifier-xyz"),
            ("client_id", "caller-id"),
        ]);
        let form = build_token_body(
            "authorization_code",
            &body,
            &resolved(),
            Some("https://gw.example.com/cb"),
        );
        assert_eq!(value_of(&form, "code"), Some("abc"));
        assert_eq!(value_of(&form, "redirect_uri"), Some("https://gw.example.com/cb"));
        assert_eq!(value_of(&form, "code_verifier"), Some("verifier-xyz"));
        // the caller's client id never reaches the upstream body
        assert_eq!(value_of(&form, "client_id"), Some("real-id"));
    }

    #[test]
    fn test_auth_code_body_uses_caller_redirect_when_none_fixed() {
        let body = map(&[("code", "abc"), ("redirect_uri", "https://cb.example.com")]);
        let form = build_token_body("authorization_code", &body, &resolved(), None);
        assert_eq!(value_of(&form, "redirect_uri"), Some("https://cb.example.com"));
    }

    #[test]
    fn test_password_scope_defaults_only_when_present_but_empty() {
        let with_empty_scope = map(&[("username", "u"), ("password", "p"), ("scope", "")]);
        let form = build_token_body("password", &with_empty_scope, &resolved(), None);
        assert_eq!(value_of(&form, "scope"), Some(DEFAULT_PASSWORD_SCOPE));
        assert_eq!(value_of(&form, "username"), Some("u"));
        assert_eq!(value_of(&form, "password"), Some("p"));

        let without_scope = map(&[("username", "u"), ("password", "p")]);
        let form = build_token_body("password", &without_scope, &resolved(), None);
        assert_eq!(value_of(&form, "scope"), None);

        let with_scope = map(&[("username", "u"), ("password", "p"), ("scope", "custom")]);
        let form = build_token_body("password", &with_scope, &resolved(), None);
        assert_eq!(value_of(&form, "scope"), Some("custom"));
    }
}
