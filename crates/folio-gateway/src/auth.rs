//! Admin authentication: a single shared secret in `X-Admin-Key`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::app::AppState;
use crate::error::{ApiError, ErrCtx};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

type HmacSha256 = Hmac<Sha256>;

/// Verify the admin shared secret. The comparison runs over fixed-length
/// digests, so timing does not leak the match prefix or the key length.
pub fn require_admin(state: &AppState, headers: &HeaderMap, ctx: &ErrCtx) -> Result<(), ApiError> {
    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if constant_time_eq(provided, &state.config.admin.api_key) {
        Ok(())
    } else {
        Err(ApiError::unauthorized(ctx))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

/// Salted hash of the client address. Used for rate limiting and session
/// lookup only; raw addresses are never persisted.
pub fn hash_client_ip(salt: &str, ip: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).expect("hmac accepts any key length");
    mac.update(ip.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_comparison_matches_exact_key_only() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secret2"));
        assert!(!constant_time_eq("", "secret"));
    }

    #[test]
    fn ip_hash_is_stable_and_salted() {
        let a = hash_client_ip("salt-1", "203.0.113.7");
        let b = hash_client_ip("salt-1", "203.0.113.7");
        let c = hash_client_ip("salt-2", "203.0.113.7");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
