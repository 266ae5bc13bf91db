//! File-backed registry of virtual OAuth clients.
//!
//! Callers that cannot register a real OAuth client with the upstream LMS
//! get a locally issued identity instead; at token time it resolves to the
//! owning tenant's real credentials. Secrets are never stored: a client's
//! secret is `HMAC-SHA256(server_secret, client_id)` rendered as lowercase
//! hex, recomputed on demand, so the store only has to remember which
//! tenant owns an id and stays valid even if rebuilt.
//!
//! One `|`-delimited record per line, append-only, no locking, whole-file
//! scans on lookup. Explicitly a non-production store.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STORE_HEADER: &str =
    "# Virtual OAuth clients: client_id|tenant_id|created_at|client_name|redirect_uris\n";

/// A locally issued OAuth client identity, owned by one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualClient {
    pub client_id: String,
    pub tenant_id: String,
    pub created_at: String,
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
}

/// Freshly issued credentials returned from [`VirtualClientStore::register`].
#[derive(Debug)]
pub struct Registration {
    pub client_id: String,
    pub client_secret: String,
}

pub struct VirtualClientStore {
    path: PathBuf,
    server_secret: Vec<u8>,
}

impl VirtualClientStore {
    pub fn new(path: PathBuf, server_secret: Vec<u8>) -> Self {
        Self {
            path,
            server_secret,
        }
    }

    /// Create the backing file with a header comment if it does not exist.
    /// Idempotent; never truncates an existing store.
    pub async fn initialize(&self) -> Result<(), String> {
        if tokio::fs::metadata(&self.path).await.is_ok() {
            return Ok(());
        }
        tokio::fs::write(&self.path, STORE_HEADER)
            .await
            .map_err(|e| {
                format!(
                    "failed to create virtual client store '{}': {e}",
                    self.path.display()
                )
            })
    }

    /// Issue a new virtual client for a tenant and append it to the store.
    pub async fn register(
        &self,
        tenant_id: &str,
        client_name: Option<&str>,
        redirect_uris: Option<&[String]>,
    ) -> Result<Registration, String> {
        let client_id = Uuid::new_v4().to_string();
        let client_secret = self.derive_secret(&client_id);

        let record = format!(
            "{client_id}|{tenant_id}|{}|{}|{}\n",
            Utc::now().to_rfc3339(),
            client_name.unwrap_or(""),
            redirect_uris.map(|uris| uris.join(",")).unwrap_or_default(),
        );

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                format!(
                    "failed to open virtual client store '{}': {e}",
                    self.path.display()
                )
            })?;
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| format!("failed to append virtual client record: {e}"))?;

        tracing::debug!(client_id = %client_id, tenant = %tenant_id, "virtual client registered");
        Ok(Registration {
            client_id,
            client_secret,
        })
    }

    /// Find a virtual client by id. Returns `None` when the store is absent
    /// or no record matches.
    pub async fn lookup(&self, client_id: &str) -> Option<VirtualClient> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        content
            .lines()
            .filter_map(parse_record)
            .find(|client| client.client_id == client_id)
    }

    /// All parseable records in the store.
    pub async fn list_all(&self) -> Vec<VirtualClient> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content.lines().filter_map(parse_record).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Recompute the expected secret and compare in constant time.
    pub fn validate(&self, client_id: &str, supplied_secret: &str) -> bool {
        let Ok(supplied) = hex::decode(supplied_secret) else {
            return false;
        };
        self.mac(client_id).verify_slice(&supplied).is_ok()
    }

    /// Deterministic secret for a client id: lowercase-hex
    /// `HMAC-SHA256(server_secret, client_id)`, always 64 characters.
    pub fn derive_secret(&self, client_id: &str) -> String {
        hex::encode(self.mac(client_id).finalize().into_bytes())
    }

    fn mac(&self, client_id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.server_secret)
            .expect("HMAC accepts keys of any length");
        mac.update(client_id.as_bytes());
        mac
    }
}

/// Parse one store line. Comment lines, blank lines, and lines with fewer
/// than 3 fields are skipped. Empty optional fields deserialize as absent.
fn parse_record(line: &str) -> Option<VirtualClient> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 3 {
        return None;
    }
    Some(VirtualClient {
        client_id: fields[0].to_string(),
        tenant_id: fields[1].to_string(),
        created_at: fields[2].to_string(),
        client_name: fields
            .get(3)
            .copied()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        redirect_uris: fields
            .get(4)
            .copied()
            .filter(|uris| !uris.is_empty())
            .map(|uris| uris.split(',').map(str::to_string).collect()),
    })
}
