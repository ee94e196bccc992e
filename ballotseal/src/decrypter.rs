//! The poll lifecycle engine: Start, Stop and Clear.

use std::thread;

use tracing::info;

use crate::cancel::CancelToken;
use crate::crypto::Crypto;
use crate::error::{Error, ErrorKind};
use crate::formatter::{json_content, ContentFormatter};
use crate::pipeline::decrypt_votes;
use crate::random::{os_random, SharedRandom};
use crate::store::Store;

const DEFAULT_ERROR_VALUE: &[u8] = br#"{"error":"encryption not valid"}"#;

/// Coordinates a poll's key material and its one-shot decryption result.
///
/// `start` mints (or re-derives) the poll's public encryption key, `stop`
/// decrypts and shuffles a vote batch and signs the serialized result,
/// `clear` discards the poll. The store makes both `start` and `stop`
/// idempotent; the engine itself holds only immutable configuration and
/// may be shared freely between request handlers.
pub struct Decrypter<C, S> {
    crypto: C,
    store: S,
    max_votes: usize,
    workers: usize,
    random: SharedRandom,
    formatter: ContentFormatter,
    decrypt_error_value: Vec<u8>,
}

impl<C, S> Decrypter<C, S>
where
    C: Crypto + Sync,
    S: Store,
{
    pub fn new(crypto: C, store: S) -> Self {
        Decrypter {
            crypto,
            store,
            max_votes: usize::MAX,
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            random: os_random(),
            formatter: Box::new(json_content),
            decrypt_error_value: DEFAULT_ERROR_VALUE.to_vec(),
        }
    }

    /// Cap the number of votes a single `stop` accepts. Unlimited by
    /// default.
    pub fn with_max_votes(mut self, max_votes: usize) -> Self {
        self.max_votes = max_votes;
        self
    }

    /// Number of parallel decrypt workers. Defaults to the available
    /// parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Replace the random source. Also drops to a single decrypt worker so
    /// that a seeded source yields a reproducible vote order; only useful
    /// for tests.
    pub fn with_random_source(mut self, random: SharedRandom) -> Self {
        self.random = random;
        self.workers = 1;
        self
    }

    /// Replace the content formatter that builds the signed result bytes.
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str, &[Vec<u8>]) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
    {
        self.formatter = Box::new(formatter);
        self
    }

    /// Replace the plaintext substituted for votes that fail to decrypt.
    pub fn with_decrypt_error_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.decrypt_error_value = value.into();
        self
    }

    /// The public half of the long-lived identity key.
    pub fn public_identity_key(&self) -> Vec<u8> {
        self.crypto.public_identity_key()
    }

    /// Start the poll: mint a private key on the first call, then derive
    /// and return the public poll key plus the identity-key signature over
    /// it. Repeated calls return the same bytes until the poll is cleared.
    pub fn start(&self, poll_id: &str, token: &CancelToken) -> Result<(Vec<u8>, Vec<u8>), Error> {
        validate_id(poll_id)?;

        let poll_key = match self.store.load_key(poll_id, token) {
            Ok(key) => key,
            Err(err) if err.kind() == ErrorKind::NotExist => {
                let key = self.crypto.create_poll_key()?;
                match self.store.save_key(poll_id, &key, token) {
                    Ok(()) => key,
                    // A concurrent start won the race; use its key.
                    Err(err) if err.kind() == ErrorKind::Exist => {
                        self.store.load_key(poll_id, token)?
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        let (pub_key, pub_key_sig) = self.crypto.public_poll_key(&poll_key)?;
        info!(
            "public poll key for poll {} is {}",
            poll_id,
            hex::encode(&pub_key)
        );
        Ok((pub_key, pub_key_sig))
    }

    /// Stop the poll: decrypt the votes, shuffle them, serialize and sign
    /// the result. The signature is committed on the first call; a replay
    /// with identical output succeeds with the same bytes, anything else
    /// fails.
    pub fn stop(
        &self,
        poll_id: &str,
        votes: Vec<Vec<u8>>,
        token: &CancelToken,
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let poll_key = self.store.load_key(poll_id, token)?;

        if votes.len() > self.max_votes {
            return Err(Error::invalid(format!(
                "received {} votes, only {} votes supported",
                votes.len(),
                self.max_votes
            )));
        }

        let decrypted = decrypt_votes(
            &self.crypto,
            &poll_key,
            votes,
            self.workers,
            &self.random,
            &self.decrypt_error_value,
            token,
        )?;

        let content = (self.formatter)(poll_id, &decrypted)?;
        let signature = self.crypto.sign(&content);

        // Committing stays the very last step: a replay walks through the
        // full decrypt-and-sign path and costs the same wall-clock time as
        // the original call.
        if let Err(err) = self.store.validate_signature(poll_id, &signature, token) {
            if err.kind() == ErrorKind::Invalid {
                return Err(Error::invalid(
                    "stop was called with different parameters before",
                ));
            }
            return Err(err);
        }

        Ok((content, signature))
    }

    /// Discard the poll's key material and committed signature. Unknown
    /// polls are a silent success.
    pub fn clear(&self, poll_id: &str, token: &CancelToken) -> Result<(), Error> {
        self.store.clear_poll(poll_id, token)
    }
}

/// Poll ids end up in file names and log lines, so only a conservative
/// character set is allowed.
fn validate_id(id: &str) -> Result<(), Error> {
    for b in id.bytes() {
        let ok = b.is_ascii_alphanumeric() || b == b'/' || b == b'.';
        if !ok {
            return Err(Error::invalid(format!(
                "id contains invalid character {:?}",
                b as char
            )));
        }
    }
    Ok(())
}
