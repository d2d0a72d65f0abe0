//! Pluggable AEAD / Diffie-Hellman / hash capabilities.
//!
//! The three axes are orthogonal per the Noise spec and are kept as three
//! small traits rather than one "suite" type, dispatched statically
//! (monomorphized) the same way a protocol is fixed at construction and
//! never renegotiated.
#![forbid(unsafe_code)]

use crate::{Error, Result};
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroize;

/// Nonce byte layout used by an AEAD when encoding the 64-bit counter into
/// its 96-bit nonce. Normative per the Noise spec: ChaCha20-Poly1305 differs
/// from AES-GCM here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceEndian {
    /// 4 zero bytes, then the 64-bit counter little-endian (ChaCha20-Poly1305).
    Little,
    /// 4 zero bytes, then the 64-bit counter big-endian (AES-GCM).
    Big,
}

/// Encode a 64-bit counter into a 96-bit Noise nonce.
pub fn encode_nonce(endian: NonceEndian, n: u64) -> [u8; 12] {
    let mut out = [0u8; 12];
    match endian {
        NonceEndian::Little => out[4..].copy_from_slice(&n.to_le_bytes()),
        NonceEndian::Big => out[4..].copy_from_slice(&n.to_be_bytes()),
    }
    out
}

/// A pluggable AEAD capability: 32-byte key, 12-byte nonce, 16-byte tag.
pub trait AeadAlg: Send + Sync + 'static {
    /// Protocol-name identifier, e.g. `"ChaChaPoly"` or `"AESGCM"`.
    const NAME: &'static str;
    /// Nonce byte layout for this AEAD (normative, see [`NonceEndian`]).
    const NONCE_ENDIAN: NonceEndian;

    /// Seal `plaintext` under `key`/`n`/`ad`, returning ciphertext‖tag.
    fn seal(key: &[u8; 32], n: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;
    /// Open a ciphertext‖tag under `key`/`n`/`ad`.
    fn open(key: &[u8; 32], n: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// ChaCha20-Poly1305 AEAD capability.
pub struct ChaChaPoly;

impl AeadAlg for ChaChaPoly {
    const NAME: &'static str = "ChaChaPoly";
    const NONCE_ENDIAN: NonceEndian = NonceEndian::Little;

    fn seal(key: &[u8; 32], n: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use chacha20poly1305::aead::{Aead, KeyInit, Payload};
        use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let nonce_bytes = encode_nonce(Self::NONCE_ENDIAN, n);
        cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad: ad })
            .map_err(|e| Error::Crypto(format!("chachapoly seal failed: {e}")))
    }

    fn open(key: &[u8; 32], n: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        use chacha20poly1305::aead::{Aead, KeyInit, Payload};
        use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let nonce_bytes = encode_nonce(Self::NONCE_ENDIAN, n);
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: ciphertext, aad: ad })
            .map_err(|e| Error::Crypto(format!("chachapoly open failed: {e}")))
    }
}

/// AES-256-GCM AEAD capability.
pub struct AesGcm;

impl AeadAlg for AesGcm {
    const NAME: &'static str = "AESGCM";
    const NONCE_ENDIAN: NonceEndian = NonceEndian::Big;

    fn seal(key: &[u8; 32], n: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        use aes_gcm::aead::{Aead, KeyInit, Payload};
        use aes_gcm::{Aes256Gcm, Key, Nonce};
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce_bytes = encode_nonce(Self::NONCE_ENDIAN, n);
        cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad: ad })
            .map_err(|e| Error::Crypto(format!("aesgcm seal failed: {e}")))
    }

    fn open(key: &[u8; 32], n: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        use aes_gcm::aead::{Aead, KeyInit, Payload};
        use aes_gcm::{Aes256Gcm, Key, Nonce};
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce_bytes = encode_nonce(Self::NONCE_ENDIAN, n);
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: ciphertext, aad: ad })
            .map_err(|e| Error::Crypto(format!("aesgcm open failed: {e}")))
    }
}

/// A pluggable hash capability: fixed `HASHLEN`/`BLOCKLEN`, streaming
/// append, and the Noise-defined HKDF (HMAC-based extract/expand chaining,
/// 1-3 output blocks).
pub trait HashFn: Send + Sync + 'static {
    /// Protocol-name identifier, e.g. `"SHA256"`.
    const NAME: &'static str;
    /// Digest length in bytes.
    const HASHLEN: usize;
    /// Underlying compression block length in bytes.
    const BLOCKLEN: usize;

    /// One-shot hash of `data`.
    fn hash(data: &[u8]) -> Vec<u8>;

    /// `HKDF(chaining_key, input, num_outputs)` as defined by the Noise spec:
    /// `num_outputs` HASHLEN-sized chunks, `num_outputs` in `1..=3`.
    fn hkdf(chaining_key: &[u8], input: &[u8], num_outputs: usize) -> Result<Vec<Vec<u8>>>;
}

/// SHA-256 hash capability (HASHLEN=32).
pub struct Sha256Hash;

impl HashFn for Sha256Hash {
    const NAME: &'static str = "SHA256";
    const HASHLEN: usize = 32;
    const BLOCKLEN: usize = 64;

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn hkdf(chaining_key: &[u8], input: &[u8], num_outputs: usize) -> Result<Vec<Vec<u8>>> {
        debug_assert!((1..=3).contains(&num_outputs));
        let hk = Hkdf::<Sha256>::new(Some(chaining_key), input);
        let mut out = vec![0u8; num_outputs * Self::HASHLEN];
        hk.expand(&[], &mut out)
            .map_err(|e| Error::Crypto(format!("hkdf expand failed: {e}")))?;
        let chunks = out.chunks(Self::HASHLEN).map(|c| c.to_vec()).collect();
        out.zeroize();
        Ok(chunks)
    }
}

/// SHA-512 hash capability (HASHLEN=64).
pub struct Sha512Hash;

impl HashFn for Sha512Hash {
    const NAME: &'static str = "SHA512";
    const HASHLEN: usize = 64;
    const BLOCKLEN: usize = 128;

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha512::digest(data).to_vec()
    }

    fn hkdf(chaining_key: &[u8], input: &[u8], num_outputs: usize) -> Result<Vec<Vec<u8>>> {
        debug_assert!((1..=3).contains(&num_outputs));
        let hk = Hkdf::<Sha512>::new(Some(chaining_key), input);
        let mut out = vec![0u8; num_outputs * Self::HASHLEN];
        hk.expand(&[], &mut out)
            .map_err(|e| Error::Crypto(format!("hkdf expand failed: {e}")))?;
        let chunks = out.chunks(Self::HASHLEN).map(|c| c.to_vec()).collect();
        out.zeroize();
        Ok(chunks)
    }
}

/// A pluggable Diffie-Hellman capability (fixed scalar length `DHLEN`).
pub trait Dh: Send + Sync + 'static {
    /// Protocol-name identifier, e.g. `"25519"`.
    const NAME: &'static str;
    /// Public/private key and shared-secret length in bytes.
    const DHLEN: usize;
    /// Private scalar. Must zeroize on drop.
    type PrivateKey: Clone + Zeroize;
    /// Public point, freely cloneable/comparable as opaque bytes.
    type PublicKey: Clone;

    /// Generate a fresh random keypair.
    fn generate() -> (Self::PrivateKey, Self::PublicKey);
    /// Deterministically derive a keypair from a `DHLEN`-byte seed (test/
    /// fallback-reconstruction hook).
    fn generate_from_seed(seed: &[u8]) -> Result<(Self::PrivateKey, Self::PublicKey)>;
    /// `DH(priv, pub) -> DHLEN`-byte shared secret.
    fn dh(priv_key: &Self::PrivateKey, pub_key: &Self::PublicKey) -> Result<Vec<u8>>;
    /// Parse a public key from wire bytes.
    fn pub_from_bytes(bytes: &[u8]) -> Result<Self::PublicKey>;
    /// Serialize a public key to wire bytes.
    fn pub_to_bytes(pk: &Self::PublicKey) -> Vec<u8>;
}

/// Curve25519 Diffie-Hellman capability (DHLEN=32).
#[cfg(feature = "x25519")]
pub struct X25519;

#[cfg(feature = "x25519")]
impl Dh for X25519 {
    const NAME: &'static str = "25519";
    const DHLEN: usize = 32;
    type PrivateKey = x25519_dalek::StaticSecret;
    type PublicKey = x25519_dalek::PublicKey;

    fn generate() -> (Self::PrivateKey, Self::PublicKey) {
        let sk = x25519_dalek::StaticSecret::from(rand_seed());
        let pk = x25519_dalek::PublicKey::from(&sk);
        (sk, pk)
    }

    fn generate_from_seed(seed: &[u8]) -> Result<(Self::PrivateKey, Self::PublicKey)> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Error::Construction("x25519 seed must be 32 bytes".into()))?;
        let sk = x25519_dalek::StaticSecret::from(seed);
        let pk = x25519_dalek::PublicKey::from(&sk);
        Ok((sk, pk))
    }

    fn dh(priv_key: &Self::PrivateKey, pub_key: &Self::PublicKey) -> Result<Vec<u8>> {
        Ok(priv_key.diffie_hellman(pub_key).to_bytes().to_vec())
    }

    fn pub_from_bytes(bytes: &[u8]) -> Result<Self::PublicKey> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("x25519 public key must be 32 bytes".into()))?;
        Ok(x25519_dalek::PublicKey::from(arr))
    }

    fn pub_to_bytes(pk: &Self::PublicKey) -> Vec<u8> {
        pk.as_bytes().to_vec()
    }
}

#[cfg(feature = "x25519")]
fn rand_seed() -> [u8; 32] {
    use rand::RngCore;
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chachapoly_roundtrip() {
        let key = [7u8; 32];
        let ct = ChaChaPoly::seal(&key, 0, b"aad", b"hello").expect("seal");
        let pt = ChaChaPoly::open(&key, 0, b"aad", &ct).expect("open");
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn chachapoly_wrong_aad_fails() {
        let key = [3u8; 32];
        let ct = ChaChaPoly::seal(&key, 0, b"A", b"m").expect("seal");
        assert!(ChaChaPoly::open(&key, 0, b"B", &ct).is_err());
    }

    #[test]
    fn aesgcm_roundtrip() {
        let key = [9u8; 32];
        let ct = AesGcm::seal(&key, 5, b"ad", b"world").expect("seal");
        let pt = AesGcm::open(&key, 5, b"ad", &ct).expect("open");
        assert_eq!(pt, b"world");
    }

    #[test]
    fn nonce_endianness_differs() {
        let le = encode_nonce(NonceEndian::Little, 1);
        let be = encode_nonce(NonceEndian::Big, 1);
        assert_ne!(le, be);
        assert_eq!(le[4..], [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(be[4..], [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn sha256_hkdf_two_outputs_differ() {
        let outs = Sha256Hash::hkdf(&[0u8; 32], b"input", 2).expect("hkdf");
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].len(), 32);
        assert_ne!(outs[0], outs[1]);
    }

    #[test]
    fn sha512_hkdf_hashlen() {
        let outs = Sha512Hash::hkdf(&[1u8; 64], b"input", 3).expect("hkdf");
        assert_eq!(outs.len(), 3);
        assert_eq!(outs[0].len(), 64);
    }

    #[test]
    fn x25519_dh_agrees() {
        let (a_sk, a_pk) = X25519::generate();
        let (b_sk, b_pk) = X25519::generate();
        let a_shared = X25519::dh(&a_sk, &b_pk).expect("dh");
        let b_shared = X25519::dh(&b_sk, &a_pk).expect("dh");
        assert_eq!(a_shared, b_shared);
    }

    #[test]
    fn sha256_matches_known_digest() {
        use hex_literal::hex;
        let expected = hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(Sha256Hash::hash(b"abc"), expected.to_vec());
    }
}
