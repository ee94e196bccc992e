//! Cryptographic coordinator for secret-ballot polls.
//!
//! For every poll the coordinator mints an ephemeral X25519 key pair whose
//! public half, signed by a long-lived Ed25519 identity key, is handed to
//! clients as the vote-encryption key. When the poll closes, a batch of
//! encrypted votes is decrypted in parallel, shuffled into a uniformly
//! random order, serialized and signed with the identity key. A store keeps
//! the private poll key and the committed result signature so that the
//! lifecycle operations stay idempotent across retries and restarts.
//!
//! The entry point is [`Decrypter`], wired up from a [`Crypto`] backend and
//! a [`Store`] backend:
//!
//! ```no_run
//! use ballotseal::{CancelToken, Decrypter, FileStore, HybridCrypto, os_random};
//!
//! let crypto = HybridCrypto::new([0u8; 32], os_random());
//! let decrypter = Decrypter::new(crypto, FileStore::new("poll_data"));
//! let token = CancelToken::new();
//! let (pub_key, pub_key_sig) = decrypter.start("vote/42", &token).unwrap();
//! ```

mod cancel;
mod crypto;
mod decrypter;
mod error;
mod filestore;
mod formatter;
mod pipeline;
mod random;
mod store;

pub use cancel::*;
pub use crypto::*;
pub use decrypter::*;
pub use error::*;
pub use filestore::*;
pub use formatter::*;
pub use pipeline::*;
pub use random::*;
pub use store::*;

#[cfg(test)]
mod tests;
