//! JSON-RPC 2.0 gateway endpoint.
//!
//! The tool surface is deliberately a single generic forwarder: the
//! gateway's job is to hand the caller's Bearer token and the resolved
//! tenant API base to the upstream REST API, nothing more.

pub mod api;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::routes::AppState;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response; exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const UPSTREAM_ERROR: i32 = -32000;
    pub const UNAUTHORIZED: i32 = -32001;
}

/// POST /mcp?tenant=<id>
pub async fn mcp(
    State(app): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let id = request.id.clone();

    let Some(tenant) = query.get("tenant").filter(|t| !t.is_empty()) else {
        return Json(JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            "tenant query parameter is required",
        ))
        .into_response();
    };
    let Some(api_base) = app.registry.api_base_url_for(tenant) else {
        return Json(JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            format!("tenant '{tenant}' is not configured"),
        ))
        .into_response();
    };

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "lms-mcp-gateway",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": [tool_descriptor()] })),
        "tools/call" => handle_tool_call(&app, &api_base, bearer, id, request.params).await,
        other => JsonRpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            format!("method '{other}' is not supported"),
        ),
    };

    Json(response).into_response()
}

fn tool_descriptor() -> Value {
    json!({
        "name": "lms_request",
        "description": "Forward a request to the tenant's LMS REST API using the caller's token",
        "inputSchema": {
            "type": "object",
            "properties": {
                "method": { "type": "string", "enum": ["GET", "POST", "PUT", "DELETE"] },
                "path": { "type": "string", "description": "API path, e.g. /users" },
            },
            "required": ["path"],
        },
    })
}

async fn handle_tool_call(
    app: &AppState,
    api_base: &str,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    id: Option<Value>,
    params: Option<Value>,
) -> JsonRpcResponse {
    let Some(TypedHeader(authorization)) = bearer else {
        return JsonRpcResponse::error(
            id,
            error_codes::UNAUTHORIZED,
            "Authorization: Bearer header is required",
        );
    };

    let params = params.unwrap_or(Value::Null);
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    if name != "lms_request" {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            format!("unknown tool '{name}'"),
        );
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let method = arguments
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET");
    let Some(path) = arguments
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| p.starts_with('/'))
    else {
        return JsonRpcResponse::error(
            id,
            error_codes::INVALID_PARAMS,
            "arguments.path is required and must start with '/'",
        );
    };

    match api::forward(&app.http, api_base, method, path, authorization.token()).await {
        Ok(upstream) => JsonRpcResponse::success(
            id,
            json!({
                "content": [{
                    "type": "text",
                    "text": upstream.body.to_string(),
                }],
                "isError": upstream.status >= 400,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "tool call failed");
            JsonRpcResponse::error(id, error_codes::UPSTREAM_ERROR, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization() {
        let success = JsonRpcResponse::success(Some(json!(1)), json!({"ok": true}));
        let body = serde_json::to_value(&success).unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["result"]["ok"], true);
        assert!(body.get("error").is_none());

        let error = JsonRpcResponse::error(None, error_codes::METHOD_NOT_FOUND, "nope");
        let body = serde_json::to_value(&error).unwrap();
        assert_eq!(body["error"]["code"], -32601);
        assert!(body.get("result").is_none());
        assert_eq!(body["id"], Value::Null);
    }

    #[test]
    fn test_tool_descriptor_shape() {
        let descriptor = tool_descriptor();
        assert_eq!(descriptor["name"], "lms_request");
        assert_eq!(descriptor["inputSchema"]["required"][0], "path");
    }
}
