//! Running transcript hash plus chaining key driving the handshake (spec §4.2).
#![forbid(unsafe_code)]

use crate::cipher_state::CipherState;
use crate::primitives::{AeadAlg, HashFn};
use crate::Result;
use core::marker::PhantomData;
use zeroize::Zeroize;

/// `(ck: HASHLEN bytes, h: HASHLEN bytes, cipher: CipherState)`.
///
/// `h` commits, in order, to every piece of material that appears on the
/// wire during the handshake; it is the basis of the final handshake hash
/// used for channel binding.
pub struct SymmetricState<H: HashFn, A: AeadAlg> {
    ck: Vec<u8>,
    h: Vec<u8>,
    cipher: CipherState<A>,
    _hash: PhantomData<H>,
}

impl<H: HashFn, A: AeadAlg> SymmetricState<H, A> {
    /// `InitializeSymmetric(protocol_name)`.
    pub fn initialize(protocol_name: &[u8]) -> Self {
        let h = if protocol_name.len() <= H::HASHLEN {
            let mut buf = vec![0u8; H::HASHLEN];
            buf[..protocol_name.len()].copy_from_slice(protocol_name);
            buf
        } else {
            H::hash(protocol_name)
        };
        let ck = h.clone();
        Self {
            ck,
            h,
            cipher: CipherState::empty(),
            _hash: PhantomData,
        }
    }

    /// `MixKey(input_key_material)`.
    pub fn mix_key(&mut self, input_key_material: &[u8]) -> Result<()> {
        let mut outputs = H::hkdf(&self.ck, input_key_material, 2)?;
        let mut temp_k = outputs.remove(1);
        self.ck.zeroize();
        self.ck = outputs.remove(0);
        truncate_key(&mut temp_k);
        let key: [u8; 32] = temp_k[..32].try_into().expect("truncated to 32 bytes");
        self.cipher.initialize_key(key);
        temp_k.zeroize();
        Ok(())
    }

    /// `MixHash(data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        let mut buf = Vec::with_capacity(self.h.len() + data.len());
        buf.extend_from_slice(&self.h);
        buf.extend_from_slice(data);
        let new_h = H::hash(&buf);
        buf.zeroize();
        self.h = new_h;
    }

    /// `MixKeyAndHash(input_key_material)`.
    pub fn mix_key_and_hash(&mut self, input_key_material: &[u8]) -> Result<()> {
        let mut outputs = H::hkdf(&self.ck, input_key_material, 3)?;
        let mut temp_k = outputs.remove(2);
        let temp_h = outputs.remove(1);
        self.ck.zeroize();
        self.ck = outputs.remove(0);
        self.mix_hash(&temp_h);
        truncate_key(&mut temp_k);
        let key: [u8; 32] = temp_k[..32].try_into().expect("truncated to 32 bytes");
        self.cipher.initialize_key(key);
        temp_k.zeroize();
        Ok(())
    }

    /// The running transcript hash. Becomes the handshake hash once `split`
    /// is called.
    pub fn get_handshake_hash(&self) -> Vec<u8> {
        self.h.clone()
    }

    /// Whether the inner cipher state currently holds a key.
    pub fn has_key(&self) -> bool {
        self.cipher.has_key()
    }

    /// `EncryptAndHash(plaintext)`. The transcript commits to the
    /// ciphertext, not the plaintext.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ct = self.cipher.encrypt_with_ad(&self.h, plaintext)?;
        self.mix_hash(&ct);
        Ok(ct)
    }

    /// `DecryptAndHash(ciphertext)`.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let pt = self.cipher.decrypt_with_ad(&self.h, ciphertext)?;
        self.mix_hash(ciphertext);
        Ok(pt)
    }

    /// `Split()`: derive two fresh cipher states from the final chaining key.
    pub fn split(&self) -> Result<(CipherState<A>, CipherState<A>)> {
        let mut outputs = H::hkdf(&self.ck, &[], 2)?;
        let mut k2 = outputs.remove(1);
        let mut k1 = outputs.remove(0);
        truncate_key(&mut k1);
        truncate_key(&mut k2);
        let mut c1 = CipherState::empty();
        c1.initialize_key(k1[..32].try_into().expect("truncated to 32 bytes"));
        let mut c2 = CipherState::empty();
        c2.initialize_key(k2[..32].try_into().expect("truncated to 32 bytes"));
        k1.zeroize();
        k2.zeroize();
        Ok((c1, c2))
    }
}

impl<H: HashFn, A: AeadAlg> Drop for SymmetricState<H, A> {
    fn drop(&mut self) {
        self.ck.zeroize();
        self.h.zeroize();
    }
}

/// HKDF outputs are HASHLEN bytes; cipher keys are always the first 32.
fn truncate_key(buf: &mut Vec<u8>) {
    buf.truncate(32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ChaChaPoly, Sha256Hash};

    type Ss = SymmetricState<Sha256Hash, ChaChaPoly>;

    #[test]
    fn short_name_is_padded() {
        let s = Ss::initialize(b"short");
        assert_eq!(s.get_handshake_hash().len(), 32);
        assert_eq!(&s.get_handshake_hash()[..5], b"short");
        assert!(s.get_handshake_hash()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn long_name_is_hashed() {
        let name = b"Noise_XXfallback_25519_ChaChaPoly_SHA256_but_much_longer_than_32_bytes";
        let s = Ss::initialize(name);
        assert_eq!(s.get_handshake_hash().len(), 32);
        assert_ne!(&s.get_handshake_hash()[..], &name[..32]);
    }

    #[test]
    fn different_prologue_changes_hash() {
        let mut a = Ss::initialize(b"Noise_NN_25519_ChaChaPoly_SHA256");
        let mut b = Ss::initialize(b"Noise_NN_25519_ChaChaPoly_SHA256");
        a.mix_hash(b"prologue-A");
        b.mix_hash(b"prologue-B");
        assert_ne!(a.get_handshake_hash(), b.get_handshake_hash());
    }

    #[test]
    fn encrypt_and_hash_commits_to_ciphertext() {
        let mut a = Ss::initialize(b"Noise_NN_25519_ChaChaPoly_SHA256");
        let ct = a.encrypt_and_hash(b"hello").expect("no key yet: passthrough");
        assert_eq!(ct, b"hello");
    }

    #[test]
    fn split_yields_independent_ciphers() {
        let mut a = Ss::initialize(b"Noise_NN_25519_ChaChaPoly_SHA256");
        a.mix_key(b"some shared secret material").expect("mix_key");
        let (mut c1, mut c2) = a.split().expect("split");
        let ct = c1.encrypt_with_ad(b"", b"m").expect("seal");
        assert!(c2.decrypt_with_ad(b"", &ct).is_err());
    }
}
