//! # link-signer
//!
//! Signs storage-backend direct links so that a client can fetch a resource
//! straight from storage for a limited time, plus a handful of helpers for
//! picking those links apart.
//!
//! The signature is an HMAC-SHA256 over `"<path>:<expiry>"`, keyed with the
//! storage backend's shared secret and appended as `sign=<sig>:<expiry>`.
//!
//! ## Quick start
//!
//! ```rust
//! use link_signer::sign_at;
//!
//! let signed = sign_at("http://storage:5244/d/Alist/movie.mkv", "secret", 1_700_000_000);
//! assert!(signed.ends_with(":1700000000"));
//! assert_eq!(sign_at(&signed, "secret", 0), signed);
//! ```

mod sign;
pub mod url;

pub use sign::{
    canonical_path, compute_signature, expiry_from_hours, sign, sign_at, SignToken, SIGN_PARAM,
};
pub use url::{
    append_url_arg, encode_uri, file_path_part, is_absolute_path, is_strm_path, url_path,
};
