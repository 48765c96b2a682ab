//! Shared session-resumption cache.
//!
//! One cache exists per server process, constructed explicitly and handed
//! to every connection task. Entries are cloned out whole, so a reader
//! either sees a complete prior entry or none at all; operations on
//! different identifiers only contend on the map lock itself. Entries
//! persist for the process lifetime. There is no eviction, which is a
//! known growth risk on very long uptimes.

use crate::engine::{CipherSuite, ProtocolVersion};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Hex-encoded random resumption identifier.
pub type SessionId = String;

/// Everything needed to short-circuit a later handshake from the same
/// client, including the identities reported for the resumed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    pub version: ProtocolVersion,
    pub cipher: CipherSuite,
    pub srp_username: Option<String>,
    pub client_cert_fingerprint: Option<String>,
    pub server_cert_fingerprint: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<SessionId, CachedSession>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a complete cached entry. A concurrent `put` on the same
    /// identifier serializes against this; partial entries cannot be
    /// observed.
    pub fn get(&self, id: &str) -> Option<CachedSession> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Insert or replace an entry atomically.
    pub fn put(&self, id: SessionId, session: CachedSession) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn entry(tag: u32) -> CachedSession {
        CachedSession {
            version: ProtocolVersion::Tls13,
            cipher: CipherSuite::Aes128GcmSha256,
            srp_username: Some(format!("user-{tag}")),
            client_cert_fingerprint: Some(format!("client-{tag}")),
            server_cert_fingerprint: Some(format!("server-{tag}")),
        }
    }

    #[test]
    fn get_returns_what_put_stored() {
        let cache = SessionCache::new();
        assert!(cache.get("id-1").is_none());
        cache.put("id-1".into(), entry(1));
        assert_eq!(cache.get("id-1"), Some(entry(1)));
        assert!(cache.get("id-2").is_none());
    }

    #[test]
    fn put_replaces_existing_entry() {
        let cache = SessionCache::new();
        cache.put("id".into(), entry(1));
        cache.put("id".into(), entry(2));
        assert_eq!(cache.get("id"), Some(entry(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let cache = SessionCache::new();
        cache.put("a".into(), entry(1));
        cache.put("b".into(), entry(2));
        assert_eq!(cache.get("a"), Some(entry(1)));
        assert_eq!(cache.get("b"), Some(entry(2)));
    }

    /// Interleaved writers and readers on one key: a reader must only ever
    /// observe a complete entry, with all fields from the same write.
    #[test]
    fn no_torn_reads_under_same_key_contention() {
        let cache = Arc::new(SessionCache::new());
        let mut handles = Vec::new();

        for writer in 0..4u32 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    cache.put("contended".into(), entry(writer * 1000 + i));
                }
            }));
        }

        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    if let Some(seen) = cache.get("contended") {
                        let tag = seen
                            .srp_username
                            .as_deref()
                            .and_then(|u| u.strip_prefix("user-"))
                            .expect("entry missing username field")
                            .to_string();
                        assert_eq!(seen.client_cert_fingerprint.as_deref(), Some(format!("client-{tag}").as_str()));
                        assert_eq!(seen.server_cert_fingerprint.as_deref(), Some(format!("server-{tag}").as_str()));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
