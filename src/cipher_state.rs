//! One-shot AEAD keyed with a 64-bit counter nonce (spec §4.1).
#![forbid(unsafe_code)]

use crate::primitives::AeadAlg;
use crate::{Error, Result};
use core::marker::PhantomData;
use zeroize::Zeroize;

/// `(k: optional 32-byte key, n: 64-bit nonce)`.
///
/// While `k` is unset, `encrypt_with_ad`/`decrypt_with_ad` pass the payload
/// through unchanged and ignore AD, matching an un-keyed `SymmetricState`.
pub struct CipherState<A: AeadAlg> {
    key: Option<[u8; 32]>,
    n: u64,
    _alg: PhantomData<A>,
}

/// Nonce values `>= NONCE_EXHAUSTED` may never be used; `n` must stay below
/// this bound for every successful operation.
const NONCE_EXHAUSTED: u64 = u64::MAX;

impl<A: AeadAlg> CipherState<A> {
    /// Construct with no key set.
    pub fn empty() -> Self {
        Self { key: None, n: 0, _alg: PhantomData }
    }

    /// `InitializeKey(k)`: set the key and reset `n` to zero.
    pub fn initialize_key(&mut self, k: [u8; 32]) {
        self.key = Some(k);
        self.n = 0;
    }

    /// Whether a key is currently set.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Overwrite the nonce counter directly (used by rekey/test paths).
    pub fn set_nonce(&mut self, n: u64) {
        self.n = n;
    }

    /// Current nonce counter (the value that will be used on the next
    /// operation).
    pub fn nonce(&self) -> u64 {
        self.n
    }

    /// `EncryptWithAd`: pass through if unkeyed, else seal and advance `n`.
    pub fn encrypt_with_ad(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = self.key else {
            return Ok(plaintext.to_vec());
        };
        if self.n >= NONCE_EXHAUSTED {
            return Err(Error::Crypto("cipher state nonce space exhausted".into()));
        }
        let ct = A::seal(&key, self.n, ad, plaintext)?;
        self.n += 1;
        Ok(ct)
    }

    /// `DecryptWithAd`: pass through if unkeyed, else open and advance `n`
    /// only on success.
    pub fn decrypt_with_ad(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = self.key else {
            return Ok(ciphertext.to_vec());
        };
        if self.n >= NONCE_EXHAUSTED {
            return Err(Error::Crypto("cipher state nonce space exhausted".into()));
        }
        let pt = A::open(&key, self.n, ad, ciphertext)?;
        self.n += 1;
        Ok(pt)
    }

    /// Out-of-order producer: seal at the current `n`, returning the nonce
    /// used, and advance `n` (equivalent to in-order `encrypt_with_ad` plus
    /// surfacing the nonce).
    pub fn explicit_encrypt(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<(u64, Vec<u8>)> {
        let used = self.n;
        let ct = self.encrypt_with_ad(ad, plaintext)?;
        Ok((used, ct))
    }

    /// Out-of-order consumer: open at caller-supplied `n_given`, without
    /// reading or advancing this state's own counter.
    pub fn explicit_decrypt(&self, n_given: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some(key) = self.key else {
            return Ok(ciphertext.to_vec());
        };
        A::open(&key, n_given, ad, ciphertext)
    }

    /// `Rekey()`: replace `k` with the first 32 bytes of
    /// `ENCRYPT(k, MAXNONCE, "", zeros(32))`, leaving `n` untouched. No-op
    /// while unkeyed.
    pub fn rekey(&mut self) -> Result<()> {
        let Some(key) = self.key else {
            return Ok(());
        };
        let ct = A::seal(&key, NONCE_EXHAUSTED, &[], &[0u8; 32])?;
        let mut new_key = [0u8; 32];
        new_key.copy_from_slice(&ct[..32]);
        self.key = Some(new_key);
        Ok(())
    }
}

impl<A: AeadAlg> Drop for CipherState<A> {
    fn drop(&mut self) {
        if let Some(mut k) = self.key.take() {
            k.zeroize();
        }
        self.n = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ChaChaPoly;

    #[test]
    fn unkeyed_is_passthrough() {
        let mut cs = CipherState::<ChaChaPoly>::empty();
        let ct = cs.encrypt_with_ad(b"ad", b"plain").expect("passthrough");
        assert_eq!(ct, b"plain");
        assert_eq!(cs.nonce(), 0);
    }

    #[test]
    fn keyed_roundtrip_advances_nonce() {
        let mut tx = CipherState::<ChaChaPoly>::empty();
        tx.initialize_key([1u8; 32]);
        let mut rx = CipherState::<ChaChaPoly>::empty();
        rx.initialize_key([1u8; 32]);

        let ct0 = tx.encrypt_with_ad(b"ad", b"m0").expect("seal");
        assert_eq!(tx.nonce(), 1);
        let pt0 = rx.decrypt_with_ad(b"ad", &ct0).expect("open");
        assert_eq!(pt0, b"m0");
        assert_eq!(rx.nonce(), 1);

        let ct1 = tx.encrypt_with_ad(b"ad", b"m1").expect("seal");
        assert_eq!(tx.nonce(), 2);
        assert!(rx.decrypt_with_ad(b"ad", &ct1).is_ok());
    }

    #[test]
    fn tamper_detected() {
        let mut tx = CipherState::<ChaChaPoly>::empty();
        tx.initialize_key([2u8; 32]);
        let mut rx = CipherState::<ChaChaPoly>::empty();
        rx.initialize_key([2u8; 32]);
        let mut ct = tx.encrypt_with_ad(b"ad", b"m").expect("seal");
        *ct.last_mut().expect("non-empty") ^= 1;
        assert!(rx.decrypt_with_ad(b"ad", &ct).is_err());
        // Failed decrypt must not advance the counter.
        assert_eq!(rx.nonce(), 0);
    }

    #[test]
    fn explicit_roundtrip_out_of_order() {
        let mut tx = CipherState::<ChaChaPoly>::empty();
        tx.initialize_key([3u8; 32]);
        let rx = CipherState::<ChaChaPoly>::empty();
        let mut rx = rx;
        rx.initialize_key([3u8; 32]);

        let (n0, c0) = tx.explicit_encrypt(b"ad", b"first").expect("seal");
        let (n1, c1) = tx.explicit_encrypt(b"ad", b"second").expect("seal");
        // Consumer reads out of order; its own counter never advances.
        assert_eq!(rx.explicit_decrypt(n1, b"ad", &c1).expect("open"), b"second");
        assert_eq!(rx.explicit_decrypt(n0, b"ad", &c0).expect("open"), b"first");
        assert_eq!(rx.nonce(), 0);
    }

    #[test]
    fn nonce_overflow_refused() {
        let mut cs = CipherState::<ChaChaPoly>::empty();
        cs.initialize_key([4u8; 32]);
        cs.set_nonce(u64::MAX);
        assert!(cs.encrypt_with_ad(b"a", b"m").is_err());
    }

    #[test]
    fn rekey_changes_key_but_not_nonce() {
        let mut tx = CipherState::<ChaChaPoly>::empty();
        tx.initialize_key([5u8; 32]);
        let ct_before = tx.encrypt_with_ad(b"", b"m").expect("seal");
        tx.set_nonce(0);
        tx.rekey().expect("rekey");
        let ct_after = tx.encrypt_with_ad(b"", b"m").expect("seal");
        assert_ne!(ct_before, ct_after);
    }

    #[test]
    fn rekey_on_unkeyed_state_is_noop() {
        let mut cs = CipherState::<ChaChaPoly>::empty();
        cs.rekey().expect("noop");
        assert!(!cs.has_key());
    }
}
