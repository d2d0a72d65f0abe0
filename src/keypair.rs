//! A local DH keypair, zeroizing its private scalar on drop.
#![forbid(unsafe_code)]

use crate::primitives::Dh;
use crate::{Error, Result};
use zeroize::Zeroize;

/// A local static or ephemeral keypair for Diffie-Hellman capability `D`.
pub struct KeyPair<D: Dh> {
    private: D::PrivateKey,
    public: D::PublicKey,
}

impl<D: Dh> KeyPair<D> {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let (private, public) = D::generate();
        Self { private, public }
    }

    /// Deterministically derive a keypair from a `DHLEN`-byte seed. Exposed
    /// for tests and for `fallback()` reconstruction of a local static key;
    /// not otherwise part of the public handshake surface.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let (private, public) = D::generate_from_seed(seed)?;
        Ok(Self { private, public })
    }

    /// Wrap an already-generated keypair.
    pub fn from_parts(private: D::PrivateKey, public: D::PublicKey) -> Self {
        Self { private, public }
    }

    /// The private scalar, for DH operations.
    pub fn private(&self) -> &D::PrivateKey {
        &self.private
    }

    /// The public point.
    pub fn public(&self) -> &D::PublicKey {
        &self.public
    }

    /// Public key as wire bytes.
    pub fn public_bytes(&self) -> Vec<u8> {
        D::pub_to_bytes(&self.public)
    }
}

impl<D: Dh> Clone for KeyPair<D> {
    fn clone(&self) -> Self {
        Self {
            private: self.private.clone(),
            public: self.public.clone(),
        }
    }
}

impl<D: Dh> Drop for KeyPair<D> {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

/// Parse a remote public key from wire bytes, validating its length.
pub fn parse_public<D: Dh>(bytes: &[u8]) -> Result<D::PublicKey> {
    if bytes.len() != D::DHLEN {
        return Err(Error::Construction(format!(
            "expected a {}-byte public key, got {}",
            D::DHLEN,
            bytes.len()
        )));
    }
    D::pub_from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::X25519;

    #[test]
    fn generate_produces_matching_dh() {
        let a = KeyPair::<X25519>::generate();
        let b = KeyPair::<X25519>::generate();
        let sa = X25519::dh(a.private(), b.public()).expect("dh");
        let sb = X25519::dh(b.private(), a.public()).expect("dh");
        assert_eq!(sa, sb);
    }

    #[test]
    fn from_seed_is_deterministic() {
        let a = KeyPair::<X25519>::from_seed(&[4u8; 32]).expect("seed");
        let b = KeyPair::<X25519>::from_seed(&[4u8; 32]).expect("seed");
        assert_eq!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn parse_public_rejects_wrong_length() {
        let err = parse_public::<X25519>(&[0u8; 31]).unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
    }
}
