//! Upstream REST forwarding.
//!
//! The single credential-forwarding contract: a request goes to the
//! tenant's API base with the caller's Bearer token attached. The gateway
//! never substitutes its own token here.

use reqwest::Client;
use serde_json::Value;

/// Upstream reply: status plus body, parsed as JSON when possible and
/// carried as a string otherwise.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

pub async fn forward(
    http: &Client,
    api_base: &str,
    method: &str,
    path: &str,
    bearer_token: &str,
) -> Result<ApiResponse, String> {
    let url = format!("{api_base}{path}");
    let request = match method {
        "GET" => http.get(&url),
        "POST" => http.post(&url),
        "PUT" => http.put(&url),
        "DELETE" => http.delete(&url),
        other => return Err(format!("unsupported method '{other}'")),
    };

    let response = request
        .bearer_auth(bearer_token)
        .send()
        .await
        .map_err(|e| format!("upstream request failed: {e}"))?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| format!("failed to read upstream response: {e}"))?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok(ApiResponse { status, body })
}
