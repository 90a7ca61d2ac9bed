//! Short-lived cache of raw server responses.
//!
//! Only consulted when a live request fails, so a stale entry never shadows a
//! successful fetch.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Default lifetime of a cached response.
pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Identity of a GET request: a truncated SHA-256 of method and URL.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn from_request(method: &str, url: &str) -> Self {
        let digest = Sha256::new()
            .chain_update(method)
            .chain_update(b" ")
            .chain_update(url)
            .finalize();
        let key = digest[..16].iter().fold(String::with_capacity(32), |mut key, b| {
            let _ = write!(key, "{b:02x}");
            key
        });
        Self(key)
    }
}

/// Response bodies keyed by request, each valid for `ttl` after it was stored.
pub struct ResponseCache {
    bodies: DashMap<RequestKey, (String, Instant)>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            bodies: DashMap::new(),
            ttl,
        }
    }

    /// The stored body for `key`, unless it has outlived the TTL. Expired
    /// bodies are evicted on the way out.
    pub fn get(&self, key: &RequestKey) -> Option<String> {
        let ttl = self.ttl;
        let removed = self
            .bodies
            .remove_if(key, |_, (_, stored_at)| stored_at.elapsed() >= ttl);
        if removed.is_some() {
            return None;
        }
        self.bodies.get(key).map(|entry| entry.0.clone())
    }

    pub fn insert(&self, key: RequestKey, body: String) {
        self.bodies.insert(key, (body, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key_depends_on_method_and_url() {
        let course = RequestKey::from_request("GET", "https://example.org/exec?path=v2/course");

        assert_eq!(
            course,
            RequestKey::from_request("GET", "https://example.org/exec?path=v2/course")
        );
        assert_ne!(
            course,
            RequestKey::from_request("GET", "https://example.org/exec?path=keepalive")
        );
        assert_ne!(
            course,
            RequestKey::from_request("HEAD", "https://example.org/exec?path=v2/course")
        );
        assert_eq!(course.0.len(), 32);
    }

    #[test]
    fn test_bodies_expire_after_ttl() {
        let key = RequestKey::from_request("GET", "course");

        let cache = ResponseCache::default();
        cache.insert(key.clone(), "{}".to_string());
        assert_eq!(cache.get(&key).as_deref(), Some("{}"));

        let expired = ResponseCache::new(Duration::ZERO);
        expired.insert(key.clone(), "{}".to_string());
        assert_eq!(expired.get(&key), None);
        assert!(expired.is_empty());
    }
}
