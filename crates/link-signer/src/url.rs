//! Helpers for picking apart and extending direct links.

use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Characters left untouched by JavaScript's `encodeURI`; everything else
/// outside the alphanumerics is percent-encoded.
const ENCODE_URI_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

fn url_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^/]+(/[^?#]*)").expect("static regex is valid"))
}

fn file_part_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:/False/|/d/)(.*)").expect("static regex is valid"))
}

/// The path component of an absolute `http(s)` URL, without query or
/// fragment.
pub fn url_path(url: &str) -> Option<&str> {
    url_path_regex()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// The storage path carried by a direct link.
///
/// Understands two layouts:
///
/// * `http://host:19798/static/http/host:19798/False//AList/x.mkv` yields
///   `/AList/x.mkv`
/// * `http://host:5244/d/AList/x.mkv` yields `AList/x.mkv`
pub fn file_path_part(url: &str) -> Option<&str> {
    file_part_regex()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Append `key=value` to `url` unless `key` already appears in it.
pub fn append_url_arg(url: &str, key: &str, value: &str) -> String {
    if url.contains(key) {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}

/// `.strm` files are placeholders whose content is the real media location.
pub fn is_strm_path(path: &str) -> bool {
    path.to_lowercase().ends_with(".strm")
}

pub fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\')
}

/// Percent-encode `path` the way `encodeURI` does: reserved URL characters
/// survive, spaces and non-ASCII are escaped.
pub fn encode_uri(path: &str) -> String {
    utf8_percent_encode(path, ENCODE_URI_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_path_strips_query_and_fragment() {
        assert_eq!(url_path("http://h:1/d/a/b.mkv?x=1#f"), Some("/d/a/b.mkv"));
        assert_eq!(url_path("https://h/"), Some("/"));
        assert_eq!(url_path("/relative/path"), None);
    }

    #[test]
    fn file_path_part_clouddrive_layout() {
        let url = "http://mydomain:19798/static/http/mydomain:19798/False//AList/xxx.mkv";
        assert_eq!(file_path_part(url), Some("/AList/xxx.mkv"));
    }

    #[test]
    fn file_path_part_storage_layout() {
        assert_eq!(
            file_path_part("http://mydomain:5244/d/AList/xxx.mkv"),
            Some("AList/xxx.mkv")
        );
        assert_eq!(file_path_part("http://mydomain:5244/p/AList/xxx.mkv"), None);
    }

    #[test]
    fn append_url_arg_respects_existing_key() {
        assert_eq!(append_url_arg("/a", "k", "v"), "/a?k=v");
        assert_eq!(append_url_arg("/a?x=1", "k", "v"), "/a?x=1&k=v");
        assert_eq!(append_url_arg("/a?k=1", "k", "v"), "/a?k=1");
    }

    #[test]
    fn strm_detection_is_case_insensitive() {
        assert!(is_strm_path("/media/Movie.STRM"));
        assert!(!is_strm_path("/media/movie.mkv"));
        assert!(!is_strm_path(""));
    }

    #[test]
    fn absolute_paths() {
        assert!(is_absolute_path("/mnt"));
        assert!(is_absolute_path("\\\\nas\\share"));
        assert!(!is_absolute_path("mnt"));
        assert!(!is_absolute_path(""));
    }

    #[test]
    fn encode_uri_keeps_reserved_characters() {
        assert_eq!(encode_uri("/AList/a b.mkv"), "/AList/a%20b.mkv");
        assert_eq!(encode_uri("/x?y=1&z=(2)"), "/x?y=1&z=(2)");
        assert_eq!(encode_uri("/电影"), "/%E7%94%B5%E5%BD%B1");
        assert_eq!(encode_uri("50%"), "50%25");
    }
}
