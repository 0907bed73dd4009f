//! Request signature keys using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Generate a deterministic key for an outbound request.
///
/// The key covers the method, the URL (with its query parameters sorted so
/// that `?a=1&b=2` and `?b=2&a=1` share an entry) and the request body.
pub fn request_key(method: &str, url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();

    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"|");

    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    hasher.update(base.as_bytes());
    hasher.update(b"|");

    if let Some(query) = query {
        let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
        pairs.sort_unstable();
        for pair in pairs {
            hasher.update(pair.as_bytes());
            hasher.update(b"&");
        }
    }
    hasher.update(b"|");

    if let Some(body) = body {
        hasher.update(body.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key_deterministic() {
        let key1 = request_key("GET", "https://xkcd.com/info.0.json", None);
        let key2 = request_key("GET", "https://xkcd.com/info.0.json", None);
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);
    }

    #[test]
    fn test_request_key_query_order() {
        let key1 = request_key("GET", "https://example.com/a?limit=10&page=1", None);
        let key2 = request_key("GET", "https://example.com/a?page=1&limit=10", None);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_request_key_method_case() {
        let key1 = request_key("get", "https://example.com", None);
        let key2 = request_key("GET", "https://example.com", None);
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_request_key_different_methods() {
        let key1 = request_key("GET", "https://example.com", None);
        let key2 = request_key("POST", "https://example.com", None);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_request_key_different_bodies() {
        let key1 = request_key("POST", "https://example.com", Some("{\"a\":1}"));
        let key2 = request_key("POST", "https://example.com", Some("{\"a\":2}"));
        let key3 = request_key("POST", "https://example.com", None);
        assert_ne!(key1, key2);
        assert_ne!(key1, key3);
    }
}
