//! Opaque `state` parameter codec.
//!
//! The upstream authorization redirect round-trips a single `state` query
//! parameter. This gateway repurposes it to smuggle the tenant identity
//! (and the caller's own `state`, preserved losslessly) through that round
//! trip, so the token leg can tell which tenant the grant belongs to
//! without any server-side session.
//!
//! Format: base64url( JSON ), no padding. Encoding is deterministic;
//! decoding is the exact inverse and returns `None` for any malformed
//! input, since the token-phase caller fully controls this value.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Payload carried through the upstream `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub tenant: String,
    /// The caller's original `state` value, if it sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Redirect override carried by flows that need one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

pub fn encode(state: &OAuthState) -> String {
    // Serializing this struct cannot fail
    let payload = serde_json::to_vec(state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(payload)
}

/// Inverse of [`encode`]. Any structural failure (invalid alphabet,
/// truncated payload, non-JSON contents, missing or empty `tenant`)
/// yields `None`, never a panic.
pub fn decode(token: &str) -> Option<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    serde_json::from_slice::<OAuthState>(&bytes)
        .ok()
        .filter(|state| !state.tenant.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_original_state() {
        let state = OAuthState {
            tenant: "acme".to_string(),
            state: Some("caller-nonce-123".to_string()),
            redirect_uri: None,
        };
        assert_eq!(decode(&encode(&state)), Some(state));
    }

    #[test]
    fn test_round_trip_tenant_only() {
        let state = OAuthState {
            tenant: "beta-west".to_string(),
            state: None,
            redirect_uri: None,
        };
        assert_eq!(decode(&encode(&state)), Some(state));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let state = OAuthState {
            tenant: "acme".to_string(),
            state: Some("s".to_string()),
            redirect_uri: Some("https://cb.example.com".to_string()),
        };
        assert_eq!(encode(&state), encode(&state));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("not base64 at all!!!"), None);
        // valid base64url, but not JSON
        assert_eq!(decode(&URL_SAFE_NO_PAD.encode("hello world")), None);
        // valid JSON, but no tenant field
        assert_eq!(decode(&URL_SAFE_NO_PAD.encode(r#"{"state":"x"}"#)), None);
        // tenant present but empty
        assert_eq!(decode(&URL_SAFE_NO_PAD.encode(r#"{"tenant":""}"#)), None);
        // JSON, but not a map
        assert_eq!(decode(&URL_SAFE_NO_PAD.encode("[1,2,3]")), None);
    }

    #[test]
    fn test_decode_never_panics_on_arbitrary_bytes() {
        for input in ["A", "==", "%%%", "\u{1F600}", "AAAA", "eyJ0", "////"] {
            let _ = decode(input);
        }
    }
}
