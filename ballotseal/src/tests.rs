//! End-to-end tests wiring the real crypto backend, the engine and a
//! store together, plus the mock backends shared by the module tests.

use crate::*;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Prefix-based fake: `enc:<plaintext>` decrypts to `<plaintext>`,
/// everything else fails. Signatures are `sig:<payload>`.
pub(crate) struct CryptoMock;

impl Crypto for CryptoMock {
    fn public_identity_key(&self) -> Vec<u8> {
        b"mainPubKey".to_vec()
    }

    fn create_poll_key(&self) -> Result<Vec<u8>, Error> {
        Ok(b"pollKey".to_vec())
    }

    fn public_poll_key(&self, _private_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
        Ok((b"pollPubKey".to_vec(), b"pollKeySig".to_vec()))
    }

    fn decrypt(&self, _private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        ciphertext
            .strip_prefix(&b"enc:"[..])
            .map(<[u8]>::to_vec)
            .ok_or(Error::Decrypt)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        [&b"sig:"[..], payload].concat()
    }
}

fn token() -> CancelToken {
    CancelToken::new()
}

fn encrypt_vote(pub_key: &[u8], plaintext: &[u8], seed: u64) -> Vec<u8> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    encrypt(&mut rng, &X25519, pub_key, plaintext).unwrap()
}

#[test]
fn full_poll_round_trip() {
    let crypto = HybridCrypto::new([0u8; 32], seeded_random([0u8; 32]));
    let identity_key = crypto.public_identity_key();
    let decrypter =
        Decrypter::new(crypto, MemStore::new()).with_random_source(seeded_random([1u8; 32]));

    // Clients receive a signed encryption key.
    let (pub_key, pub_key_sig) = decrypter.start("vote/2024/7", &token()).unwrap();
    assert_eq!(pub_key.len(), 32);
    assert!(verify(&identity_key, &pub_key, &pub_key_sig));

    // Starting again re-derives the same bytes from the stored key.
    let again = decrypter.start("vote/2024/7", &token()).unwrap();
    assert_eq!(again, (pub_key.clone(), pub_key_sig));

    // Each client seals its vote against the poll key.
    let batch = vec![
        encrypt_vote(&pub_key, br#""yes""#, 1),
        encrypt_vote(&pub_key, br#""no""#, 2),
        encrypt_vote(&pub_key, br#""abstain""#, 3),
    ];

    let (content, signature) = decrypter.stop("vote/2024/7", batch, &token()).unwrap();
    assert!(verify(&identity_key, &content, &signature));

    let parsed: serde_json::Value = serde_json::from_slice(&content).unwrap();
    assert_eq!(parsed["id"], "vote/2024/7");
    let mut got: Vec<String> = parsed["votes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    got.sort();
    assert_eq!(got, ["abstain", "no", "yes"]);

    // After clear the poll is gone.
    decrypter.clear("vote/2024/7", &token()).unwrap();
    let err = decrypter.stop("vote/2024/7", Vec::new(), &token()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotExist);
}

#[test]
fn start_after_clear_mints_a_fresh_key() {
    let crypto = HybridCrypto::new([0u8; 32], seeded_random([2u8; 32]));
    let decrypter = Decrypter::new(crypto, MemStore::new());

    let (first, _) = decrypter.start("test/1", &token()).unwrap();
    decrypter.clear("test/1", &token()).unwrap();
    let (second, _) = decrypter.start("test/1", &token()).unwrap();

    assert_ne!(first, second);
}

#[test]
fn tampered_ciphertext_becomes_the_error_value() {
    let crypto = HybridCrypto::new([0u8; 32], seeded_random([3u8; 32]));
    let decrypter =
        Decrypter::new(crypto, MemStore::new()).with_random_source(seeded_random([4u8; 32]));

    let (pub_key, _) = decrypter.start("test/1", &token()).unwrap();

    let mut tampered = encrypt_vote(&pub_key, br#""no""#, 2);
    let last = tampered.len() - 1;
    tampered[last] ^= 1;

    let batch = vec![encrypt_vote(&pub_key, br#""yes""#, 1), tampered];
    let (content, _) = decrypter.stop("test/1", batch, &token()).unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&content).unwrap();
    let all = parsed["votes"].as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(
        all.iter()
            .filter(|v| v["error"] == "encryption not valid")
            .count(),
        1
    );
    assert_eq!(all.iter().filter(|v| v.as_str() == Some("yes")).count(), 1);
}

#[test]
fn engine_works_against_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let crypto = HybridCrypto::new([0u8; 32], seeded_random([5u8; 32]));
    let decrypter = Decrypter::new(crypto, FileStore::new(dir.path()))
        .with_random_source(seeded_random([6u8; 32]));

    let (pub_key, _) = decrypter.start("company/board/9", &token()).unwrap();
    assert!(dir.path().join("company_board_9_key").exists());

    let batch = vec![encrypt_vote(&pub_key, br#""yes""#, 1)];
    let (content, signature) = decrypter.stop("company/board/9", batch, &token()).unwrap();
    assert!(dir.path().join("company_board_9_hash").exists());
    assert_eq!(
        std::fs::read(dir.path().join("company_board_9_hash")).unwrap(),
        signature
    );
    assert!(String::from_utf8(content).unwrap().contains("yes"));
}
