use base64::Engine;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Prefix for tenant credential environment variables:
/// `LMS_{TENANT}_CLIENT_ID`, `LMS_{TENANT}_CLIENT_SECRET`,
/// `LMS_{TENANT}_REDIRECT_URI`, with the tenant id uppercased and
/// non-alphanumeric characters replaced by `_`.
pub const TENANT_ENV_PREFIX: &str = "LMS_";

/// Top-level configuration parsed from TOML.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Snapshot of `LMS_*` environment variables taken at load time.
    /// Tenant credential lookups read this map, never the live process
    /// environment.
    #[serde(skip)]
    pub tenant_env: HashMap<String, String>,
}

/// Server-level configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub public_url: String,
    /// Secret key used for deriving virtual client secrets (HMAC-SHA256).
    /// Secrets are recomputed from this key on demand and never persisted.
    pub server_secret: String,
}

/// Upstream LMS addressing. Each tenant resolves to
/// `https://{tenant}.{domain}`.
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    pub domain: String,
    /// Path of the REST API relative to a tenant's base URL.
    #[serde(default = "default_api_path")]
    pub api_path: String,
}

/// Virtual client store location.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_api_path() -> String {
    "/api/v1".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("virtual_clients.txt")
}

impl Config {
    /// Decoded HMAC key for virtual client secret derivation. Validation
    /// guarantees the configured value decodes.
    pub fn server_secret_bytes(&self) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.server.server_secret)
            .unwrap_or_default()
    }
}

/// Load and validate config from a TOML file, applying environment variable
/// overrides and snapshotting tenant credentials out of the environment.
pub fn load_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let mut config: Config =
        toml::from_str(&content).map_err(|e| format!("Failed to parse TOML config: {e}"))?;

    apply_env_overrides(&mut config);
    config.tenant_env = std::env::vars()
        .filter(|(key, _)| key.starts_with(TENANT_ENV_PREFIX))
        .collect();
    validate(&config)?;

    Ok(config)
}

/// Apply environment variable overrides.
fn apply_env_overrides(config: &mut Config) {
    // LMS_MCP_SERVER_SECRET overrides server.server_secret
    if let Ok(val) = std::env::var("LMS_MCP_SERVER_SECRET") {
        config.server.server_secret = val;
    }
}

/// Validate the entire configuration. Returns an error string on failure.
fn validate(config: &Config) -> Result<(), String> {
    validate_server(&config.server)?;
    validate_upstream(&config.upstream)?;
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), String> {
    // public_url must not be empty
    if server.public_url.is_empty() {
        return Err("server.public_url is required".to_string());
    }

    // public_url must not have trailing slash
    if server.public_url.ends_with('/') {
        return Err("server.public_url must not have a trailing slash".to_string());
    }

    // Warn (but allow) http:// for local dev; require https:// otherwise
    if server.public_url.starts_with("http://") {
        tracing::warn!(
            "server.public_url uses http:// — HTTPS is required for production deployments"
        );
    } else if !server.public_url.starts_with("https://") {
        return Err(
            "server.public_url must start with https:// (or http:// for local dev)".to_string(),
        );
    }

    // server_secret must decode to at least 32 bytes
    if server.server_secret.is_empty() {
        return Err("server.server_secret is required".to_string());
    }
    match base64::engine::general_purpose::STANDARD.decode(&server.server_secret) {
        Ok(bytes) => {
            if bytes.len() < 32 {
                return Err(format!(
                    "server.server_secret must be at least 32 bytes when base64-decoded (got {} bytes). Generate with: openssl rand -base64 32",
                    bytes.len()
                ));
            }
        }
        Err(e) => {
            return Err(format!("server.server_secret is not valid base64: {e}"));
        }
    }

    Ok(())
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), String> {
    if upstream.domain.is_empty() {
        return Err("upstream.domain is required".to_string());
    }

    if upstream.domain.contains("://") || upstream.domain.contains('/') {
        return Err("upstream.domain must be a bare hostname, not a URL".to_string());
    }

    let host_regex = regex_lite::Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").unwrap();
    if !host_regex.is_match(&upstream.domain) {
        return Err(format!(
            "upstream.domain '{}' is not a valid hostname (lowercase letters, digits, dots and hyphens)",
            upstream.domain
        ));
    }

    if !upstream.api_path.starts_with('/') {
        return Err("upstream.api_path must start with '/'".to_string());
    }

    Ok(())
}
