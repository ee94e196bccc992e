//! Identity-key operations and the hybrid scheme protecting single votes.
//!
//! The identity key is an Ed25519 key derived from a 32-byte seed. It signs
//! poll public keys and decryption results. Poll keys are X25519 keys; a
//! vote is encrypted against the public half with an ephemeral sender key,
//! HKDF-SHA256 key derivation and AES-256-GCM.

use aes_gcm::aead::{Aead, NewAead};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::{ExpandedSecretKey, PublicKey, SecretKey, Signature, Verifier};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::Error;
use crate::random::SharedRandom;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

/// The cryptographic capabilities the decrypter needs.
///
/// Production uses [`HybridCrypto`]; tests substitute a mock so that
/// lifecycle behaviour can be checked without real key material.
pub trait Crypto {
    /// The public half of the identity key.
    fn public_identity_key(&self) -> Vec<u8>;

    /// Mint a fresh private poll key. Fails only if the random source
    /// fails.
    fn create_poll_key(&self) -> Result<Vec<u8>, Error>;

    /// The public poll key for a private key, plus the identity-key
    /// signature over the public bytes.
    fn public_poll_key(&self, private_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error>;

    /// Decrypt a single vote ciphertext with the private poll key.
    fn decrypt(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Detached deterministic signature over `payload` with the identity
    /// key.
    fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

/// Elliptic-curve Diffie-Hellman over one concrete curve.
///
/// The vote wire format carries the length of the ephemeral public key, so
/// the decrypter itself is curve-agnostic. Only [`X25519`] ships; a record
/// declaring any other length is rejected before key agreement runs.
pub trait Curve: Send + Sync {
    /// Byte length of public keys on this curve.
    fn public_key_len(&self) -> usize;

    /// Derive the public key for a private scalar.
    fn public_key(&self, private_key: &[u8]) -> Result<Vec<u8>, Error>;

    /// The shared secret between a private scalar and a peer public key.
    fn shared_secret(&self, private_key: &[u8], public_key: &[u8]) -> Result<Vec<u8>, Error>;
}

/// X25519 as described in RFC 7748. Any 32-byte string is a usable private
/// key; clamping happens inside the scalar multiplication.
pub struct X25519;

impl Curve for X25519 {
    fn public_key_len(&self) -> usize {
        KEY_SIZE
    }

    fn public_key(&self, private_key: &[u8]) -> Result<Vec<u8>, Error> {
        let bytes: [u8; KEY_SIZE] = private_key
            .try_into()
            .map_err(|_| Error::invalid("poll private key must be 32 bytes"))?;
        let secret = x25519_dalek::StaticSecret::from(bytes);
        let public = x25519_dalek::PublicKey::from(&secret);
        Ok(public.as_bytes().to_vec())
    }

    fn shared_secret(&self, private_key: &[u8], public_key: &[u8]) -> Result<Vec<u8>, Error> {
        let private: [u8; KEY_SIZE] = private_key
            .try_into()
            .map_err(|_| Error::invalid("poll private key must be 32 bytes"))?;
        let public: [u8; KEY_SIZE] = public_key
            .try_into()
            .map_err(|_| Error::invalid("peer public key must be 32 bytes"))?;

        let secret = x25519_dalek::StaticSecret::from(private);
        let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(public));
        Ok(shared.as_bytes().to_vec())
    }
}

/// The production [`Crypto`] backend: Ed25519 identity signatures and
/// X25519 + HKDF-SHA256 + AES-256-GCM vote decryption.
pub struct HybridCrypto {
    secret: SecretKey,
    public: PublicKey,
    curve: Box<dyn Curve>,
    random: SharedRandom,
}

impl HybridCrypto {
    /// Build the backend from the 32-byte identity seed and a random
    /// source. The local seed copy is wiped before returning.
    pub fn new(mut seed: [u8; 32], random: SharedRandom) -> Self {
        let secret =
            SecretKey::from_bytes(&seed).expect("a 32 byte seed is a valid ed25519 secret key");
        seed.zeroize();
        let public = PublicKey::from(&secret);

        HybridCrypto {
            secret,
            public,
            curve: Box::new(X25519),
            random,
        }
    }

    /// Replace the ECDH curve. Only useful for tests of the framing rules;
    /// production clients speak X25519.
    pub fn with_curve(mut self, curve: Box<dyn Curve>) -> Self {
        self.curve = curve;
        self
    }
}

impl Crypto for HybridCrypto {
    fn public_identity_key(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    fn create_poll_key(&self) -> Result<Vec<u8>, Error> {
        let mut key = vec![0u8; KEY_SIZE];
        let mut rng = self.random.lock().unwrap();
        rng.try_fill_bytes(&mut key)
            .map_err(|err| Error::other(format!("read from random source: {}", err)))?;
        Ok(key)
    }

    fn public_poll_key(&self, private_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let pub_key = self.curve.public_key(private_key)?;
        let signature = self.sign(&pub_key);
        Ok((pub_key, signature))
    }

    fn decrypt(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.is_empty() {
            return Err(Error::Decrypt);
        }

        let pub_len = ciphertext[0] as usize;
        if pub_len != self.curve.public_key_len() {
            return Err(Error::Decrypt);
        }
        if ciphertext.len() < 1 + pub_len + NONCE_SIZE + TAG_SIZE {
            return Err(Error::Decrypt);
        }

        let ephemeral_pub = &ciphertext[1..1 + pub_len];
        let nonce = &ciphertext[1 + pub_len..1 + pub_len + NONCE_SIZE];
        let sealed = &ciphertext[1 + pub_len + NONCE_SIZE..];

        let shared = self
            .curve
            .shared_secret(private_key, ephemeral_pub)
            .map_err(|_| Error::Decrypt)?;
        let key = derive_aead_key(&shared);

        let cipher = Aes256Gcm::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::Decrypt)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let expanded: ExpandedSecretKey = (&self.secret).into();
        expanded.sign(payload, &self.public).to_bytes().to_vec()
    }
}

/// 32-byte AEAD key from the ECDH shared secret. Empty salt, empty info.
fn derive_aead_key(shared: &[u8]) -> [u8; KEY_SIZE] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut key = [0u8; KEY_SIZE];
    hk.expand(&[], &mut key)
        .expect("32 bytes is a valid hkdf-sha256 output length");
    key
}

/// Encrypt a plaintext against a public poll key.
///
/// The decrypt service never calls this; it exists for clients, debugging
/// and the tests. The output frame is
/// `len(u8) || ephemeral pub || nonce(12) || aes-256-gcm ciphertext+tag`.
pub fn encrypt<R: RngCore + CryptoRng>(
    rng: &mut R,
    curve: &dyn Curve,
    public_poll_key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut ephemeral = [0u8; KEY_SIZE];
    rng.try_fill_bytes(&mut ephemeral)
        .map_err(|err| Error::other(format!("read from random source: {}", err)))?;

    let ephemeral_pub = curve.public_key(&ephemeral)?;
    let shared = curve.shared_secret(&ephemeral, public_poll_key)?;
    ephemeral.zeroize();
    let key = derive_aead_key(&shared);

    let mut nonce = [0u8; NONCE_SIZE];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|err| Error::other(format!("read from random source: {}", err)))?;

    let cipher = Aes256Gcm::new(Key::from_slice(&key));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::other("sealing plaintext failed"))?;

    let mut out = Vec::with_capacity(1 + ephemeral_pub.len() + NONCE_SIZE + sealed.len());
    out.push(ephemeral_pub.len() as u8);
    out.extend_from_slice(&ephemeral_pub);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Check a detached identity-key signature. For clients and tests.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let public = match PublicKey::from_bytes(public_key) {
        Ok(public) => public,
        Err(_) => return false,
    };
    let signature = match Signature::try_from(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    public.verify(message, &signature).is_ok()
}
