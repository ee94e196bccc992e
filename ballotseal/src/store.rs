//! The persistence contract that makes Start and Stop idempotent.
//!
//! A store maps a poll id to its private key and, after the first
//! successful Stop, to the committed result signature. The store is the
//! only shared mutable state in the system; every backend must make
//! "save-if-absent" and "commit-or-compare" single atomic steps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use subtle::ConstantTimeEq;

use crate::cancel::CancelToken;
use crate::error::Error;

/// Durable poll state.
///
/// All operations targeting the same id are linearizable. Signature
/// comparison runs in constant time.
pub trait Store {
    /// Record `id -> key`. Returns an error of kind `Exist` if a key for
    /// `id` was saved before; the stored key is never overwritten.
    fn save_key(&self, id: &str, key: &[u8], token: &CancelToken) -> Result<(), Error>;

    /// The previously saved key, or an error of kind `NotExist`.
    fn load_key(&self, id: &str, token: &CancelToken) -> Result<Vec<u8>, Error>;

    /// Commit `signature` for `id` if none was committed yet; otherwise
    /// compare against the committed bytes in constant time and return an
    /// error of kind `Invalid` on mismatch. `NotExist` if the poll has no
    /// key.
    fn validate_signature(&self, id: &str, signature: &[u8], token: &CancelToken)
        -> Result<(), Error>;

    /// Remove all state for `id`. A missing record is not an error.
    fn clear_poll(&self, id: &str, token: &CancelToken) -> Result<(), Error>;
}

struct PollRecord {
    key: Vec<u8>,
    signature: Option<Vec<u8>>,
}

/// In-memory [`Store`] backed by a mutex-guarded map.
///
/// Used by the tests and by embedders that do not need persistence across
/// restarts. Cloning is cheap and clones share the same state.
#[derive(Clone, Default)]
pub struct MemStore {
    polls: Arc<Mutex<HashMap<String, PollRecord>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn save_key(&self, id: &str, key: &[u8], token: &CancelToken) -> Result<(), Error> {
        token.check()?;

        let mut polls = self.polls.lock().unwrap();
        if polls.contains_key(id) {
            return Err(Error::Exist);
        }

        polls.insert(
            id.to_string(),
            PollRecord {
                key: key.to_vec(),
                signature: None,
            },
        );
        Ok(())
    }

    fn load_key(&self, id: &str, token: &CancelToken) -> Result<Vec<u8>, Error> {
        token.check()?;

        let polls = self.polls.lock().unwrap();
        match polls.get(id) {
            Some(record) => Ok(record.key.clone()),
            None => Err(Error::NotExist),
        }
    }

    fn validate_signature(
        &self,
        id: &str,
        signature: &[u8],
        token: &CancelToken,
    ) -> Result<(), Error> {
        token.check()?;

        let mut polls = self.polls.lock().unwrap();
        let record = polls.get_mut(id).ok_or(Error::NotExist)?;

        match &record.signature {
            None => {
                record.signature = Some(signature.to_vec());
                Ok(())
            }
            Some(committed) => {
                if committed.as_slice().ct_eq(signature).unwrap_u8() == 1 {
                    Ok(())
                } else {
                    Err(Error::invalid("signature differs from the committed value"))
                }
            }
        }
    }

    fn clear_poll(&self, id: &str, token: &CancelToken) -> Result<(), Error> {
        token.check()?;

        self.polls.lock().unwrap().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn token() -> CancelToken {
        CancelToken::new()
    }

    #[test]
    fn save_key_rejects_duplicates() {
        let store = MemStore::new();
        store.save_key("test/1", b"key", &token()).unwrap();

        let err = store.save_key("test/1", b"other", &token()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exist);

        // The original key survives.
        assert_eq!(store.load_key("test/1", &token()).unwrap(), b"key");
    }

    #[test]
    fn load_key_unknown_poll() {
        let store = MemStore::new();
        let err = store.load_key("test/1", &token()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[test]
    fn validate_signature_commits_then_compares() {
        let store = MemStore::new();
        store.save_key("test/1", b"key", &token()).unwrap();

        store.validate_signature("test/1", b"sig", &token()).unwrap();
        store.validate_signature("test/1", b"sig", &token()).unwrap();

        let err = store
            .validate_signature("test/1", b"different", &token())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn validate_signature_needs_a_key() {
        let store = MemStore::new();
        let err = store
            .validate_signature("test/1", b"sig", &token())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[test]
    fn clear_poll_removes_everything() {
        let store = MemStore::new();
        store.save_key("test/1", b"key", &token()).unwrap();
        store.validate_signature("test/1", b"sig", &token()).unwrap();

        store.clear_poll("test/1", &token()).unwrap();
        assert_eq!(
            store.load_key("test/1", &token()).unwrap_err().kind(),
            ErrorKind::NotExist
        );

        // A fresh key and signature can be committed afterwards.
        store.save_key("test/1", b"key2", &token()).unwrap();
        store
            .validate_signature("test/1", b"sig2", &token())
            .unwrap();
    }

    #[test]
    fn clear_poll_on_unknown_id_is_ok() {
        let store = MemStore::new();
        store.clear_poll("test/1", &token()).unwrap();
    }

    #[test]
    fn cancelled_token_stops_every_operation() {
        let store = MemStore::new();
        let cancelled = CancelToken::new();
        cancelled.cancel();

        assert!(store.save_key("p", b"key", &cancelled).is_err());
        assert!(store.load_key("p", &cancelled).is_err());
        assert!(store.validate_signature("p", b"sig", &cancelled).is_err());
        assert!(store.clear_poll("p", &cancelled).is_err());
    }

    #[test]
    fn clones_share_state() {
        let store = MemStore::new();
        let clone = store.clone();
        store.save_key("test/1", b"key", &token()).unwrap();
        assert_eq!(clone.load_key("test/1", &token()).unwrap(), b"key");
    }
}
