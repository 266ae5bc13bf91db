pub mod authorize;
pub mod register;
pub mod token;
pub mod well_known;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::oauth::virtual_clients::VirtualClientStore;
use crate::tenants::TenantRegistry;

/// Shared application state injected into every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<TenantRegistry>,
    pub store: Arc<VirtualClientStore>,
    pub http: reqwest::Client,
}

/// OAuth2-shaped error body: `{error, error_description}`.
///
/// Client input errors are 400, configuration errors (unknown tenant) are
/// 404, upstream transport failures are 500. Descriptions may name tenant
/// ids but never credentials or tokens.
#[derive(Debug, Serialize)]
pub struct OAuthError {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
    error_description: String,
}

impl OAuthError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request",
            error_description: description.into(),
        }
    }

    /// Tenant (or other configuration) not found. Same body shape as
    /// `invalid_request`, 404 status.
    pub fn not_found(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "invalid_request",
            error_description: description.into(),
        }
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "unsupported_grant_type",
            error_description: description.into(),
        }
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "server_error",
            error_description: description.into(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// GET /health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "tenants": app.registry.list_configured_tenants().len(),
    }))
}
