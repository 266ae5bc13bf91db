//! Virtual client registration.
//!
//! A proof-of-concept stand-in for dynamic client registration: the issued
//! client has no registration upstream and resolves to the owning tenant's
//! real credentials at token time. Not hardened for production use.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{AppState, OAuthError};

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    pub client_id_issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// POST /oauth2/register?tenant=<id>
pub async fn register(
    State(app): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    let Some(tenant) = query.get("tenant").filter(|t| !t.is_empty()) else {
        return OAuthError::invalid_request("tenant query parameter is required").into_response();
    };

    if app.registry.config_for(tenant).is_none() {
        return OAuthError::not_found(format!("tenant '{tenant}' is not configured"))
            .into_response();
    }

    let registration = match app
        .store
        .register(
            tenant,
            request.client_name.as_deref(),
            request.redirect_uris.as_deref(),
        )
        .await
    {
        Ok(registration) => registration,
        Err(e) => {
            tracing::error!(tenant = %tenant, error = %e, "virtual client registration failed");
            return OAuthError::server_error("failed to persist virtual client").into_response();
        }
    };

    tracing::info!(tenant = %tenant, client_id = %registration.client_id, "issued virtual client");

    let response = RegistrationResponse {
        client_id: registration.client_id,
        client_secret: registration.client_secret,
        client_id_issued_at: chrono::Utc::now().timestamp(),
        client_name: request.client_name,
        redirect_uris: request.redirect_uris.unwrap_or_default(),
        grant_types: request.grant_types.unwrap_or_else(|| {
            vec!["authorization_code".to_string(), "refresh_token".to_string()]
        }),
        response_types: request
            .response_types
            .unwrap_or_else(|| vec!["code".to_string()]),
        token_endpoint_auth_method: "client_secret_post",
        scope: request.scope,
    };
    (StatusCode::CREATED, Json(response)).into_response()
}
