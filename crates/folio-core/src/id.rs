//! Prefixed opaque identifiers, e.g. `content_V1StGXR8z5jdHi6BmyT`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

/// Length of the random suffix.
const SUFFIX_LEN: usize = 21;

/// Generate `<prefix>_<21 url-safe chars>` from 128 random bits.
pub fn generate(prefix: &str) -> String {
    let mut suffix = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());
    suffix.truncate(SUFFIX_LEN);
    format!("{prefix}_{suffix}")
}
