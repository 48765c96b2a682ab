//! Password verifier store for SRP-style authentication.
//!
//! The server never holds plaintext passwords: each user maps to a random
//! salt and a verifier derived from salt and password. A client proves
//! knowledge of the password by sending the same derivation; the storage
//! format is a plain JSON document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One stored user entry: hex salt plus hex verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierEntry {
    pub salt: String,
    pub verifier: String,
}

/// Username to verifier mapping, loaded once at server startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierStore {
    users: HashMap<String, VerifierEntry>,
}

impl VerifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a fresh random salt.
    pub fn insert(&mut self, username: &str, password: &str) {
        let salt: [u8; 16] = rand::random();
        let entry = VerifierEntry {
            salt: hex::encode(salt),
            verifier: compute_proof(&salt, password),
        };
        self.users.insert(username.to_string(), entry);
    }

    pub fn lookup(&self, username: &str) -> Option<&VerifierEntry> {
        self.users.get(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Derive the password proof bound to a salt. Both the stored verifier and
/// the client's handshake proof use this derivation.
pub fn compute_proof(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut store = VerifierStore::new();
        store.insert("alice", "opensesame");
        assert_eq!(store.len(), 1);
        assert!(store.lookup("alice").is_some());
        assert!(store.lookup("bob").is_none());
    }

    #[test]
    fn proof_matches_stored_verifier() {
        let mut store = VerifierStore::new();
        store.insert("alice", "opensesame");
        let entry = store.lookup("alice").unwrap();
        let salt = hex::decode(&entry.salt).unwrap();
        assert_eq!(compute_proof(&salt, "opensesame"), entry.verifier);
        assert_ne!(compute_proof(&salt, "wrong"), entry.verifier);
    }

    #[test]
    fn salts_are_per_user() {
        let mut store = VerifierStore::new();
        store.insert("alice", "pw");
        store.insert("bob", "pw");
        let a = store.lookup("alice").unwrap();
        let b = store.lookup("bob").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.verifier, b.verifier);
    }

    #[test]
    fn store_round_trips_through_json() {
        let mut store = VerifierStore::new();
        store.insert("alice", "pw");
        let json = serde_json::to_string(&store).unwrap();
        let loaded: VerifierStore = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.lookup("alice"), store.lookup("alice"));
    }
}
