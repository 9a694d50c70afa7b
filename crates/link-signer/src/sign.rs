use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::percent_decode_str;
use sha2::Sha256;
use tracing::{debug, trace};

use crate::url::url_path;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature.
pub const SIGN_PARAM: &str = "sign";

/// Path segment that marks a storage-backend download route.
const STORAGE_ROUTE: &str = "/d/";

// ---------------------------------------------------------------------------
// SignToken
// ---------------------------------------------------------------------------

/// A computed signature together with the expiry it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignToken {
    /// URL-safe base64 HMAC-SHA256 (padding kept).
    pub signature: String,
    /// Expiry as Unix seconds; `0` never expires.
    pub expires_at: u64,
}

impl SignToken {
    /// Sign `path` (already canonical) with `secret`.
    pub fn new(path: &str, secret: &str, expires_at: u64) -> Self {
        Self {
            signature: compute_signature(path, secret, expires_at),
            expires_at,
        }
    }

    /// Value of the `sign` query parameter: `<signature>:<expires_at>`.
    pub fn param_value(&self) -> String {
        format!("{}:{}", self.signature, self.expires_at)
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// HMAC-SHA256 over `"<path>:<expires_at>"`, encoded with the URL-safe base64
/// alphabet (`-` and `_`) and standard padding.
pub fn compute_signature(path: &str, secret: &str, expires_at: u64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{path}:{expires_at}").as_bytes());
    URL_SAFE.encode(mac.finalize().into_bytes())
}

/// Expiry timestamp for a link valid for `hours` from `now`.
///
/// `None` and `Some(0)` both mean "never expires" and yield `0`.
pub fn expiry_from_hours(hours: Option<u64>, now: SystemTime) -> u64 {
    match hours {
        None | Some(0) => 0,
        Some(h) => {
            let now_secs = now
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            now_secs.saturating_add(h.saturating_mul(3600))
        }
    }
}

/// Reduce the part of a storage path after the route prefix to the logical
/// resource path: duplicate separators collapsed, then percent-decoded.
pub fn canonical_path(raw: &str) -> String {
    let collapsed = raw.replace("//", "/");
    percent_decode_str(&collapsed).decode_utf8_lossy().into_owned()
}

/// Sign `url` with an expiry `expire_hours` from now.
///
/// See [`sign_at`] for the no-op cases.
pub fn sign(url: &str, secret: &str, expire_hours: Option<u64>) -> String {
    sign_at(url, secret, expiry_from_hours(expire_hours, SystemTime::now()))
}

/// Append `sign=<signature>:<expires_at>` to `url`.
///
/// Returns the URL unchanged when it is already signed, when it has no
/// `scheme://host/path` part, or when the path has no storage route.
pub fn sign_at(url: &str, secret: &str, expires_at: u64) -> String {
    if url.contains("sign=") {
        trace!(url, "link already signed");
        return url.to_string();
    }
    let Some(path) = url_path(url) else {
        trace!(url, "no resource path in link; nothing to sign");
        return url.to_string();
    };
    let Some(start) = path.find(STORAGE_ROUTE) else {
        trace!(url, "link is not a storage route; nothing to sign");
        return url.to_string();
    };

    // Keep the leading '/' of the resource path.
    let canonical = canonical_path(&path[start + STORAGE_ROUTE.len() - 1..]);
    debug!(path = %canonical, expires_at, "signing storage link");

    let token = SignToken::new(&canonical, secret, expires_at);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{SIGN_PARAM}={}", token.param_value())
}
