//! Protocol descriptor: handshake pattern + modifiers + primitive set,
//! fixed once at construction (spec §6, "protocol name string").
#![forbid(unsafe_code)]

use crate::pattern::{Modifiers, PatternName};
use crate::primitives::{AeadAlg, Dh, HashFn};
use crate::{Error, Result};
use core::marker::PhantomData;

/// The Noise spec's default upper bound on a single handshake or transport
/// message. Kept as a construction parameter rather than a constant so
/// implementers can raise or lower it per deployment.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 65535;

/// A fixed combination of handshake pattern, modifiers, and primitive
/// capabilities. Never renegotiated after construction.
pub struct Protocol<D: Dh, H: HashFn, A: AeadAlg> {
    pattern: PatternName,
    modifiers: Modifiers,
    max_message_len: usize,
    _dh: PhantomData<D>,
    _hash: PhantomData<H>,
    _aead: PhantomData<A>,
}

impl<D: Dh, H: HashFn, A: AeadAlg> Protocol<D, H, A> {
    /// Build a protocol descriptor. Rejects the `Fallback` modifier unless
    /// `pattern` is `XX` — it may otherwise only be reached via
    /// [`Protocol::fallback`].
    pub fn new(pattern: PatternName, modifiers: Modifiers) -> Result<Self> {
        if modifiers.fallback && !pattern.allows_fallback_modifier() {
            return Err(Error::Construction(format!(
                "fallback modifier is only valid on XX, not {}",
                pattern.as_str()
            )));
        }
        Ok(Self {
            pattern,
            modifiers,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            _dh: PhantomData,
            _hash: PhantomData,
            _aead: PhantomData,
        })
    }

    /// Build the `XXfallback` descriptor directly — the only legal way to
    /// set the `Fallback` modifier.
    pub fn xx_fallback() -> Self {
        Self {
            pattern: PatternName::XxFallback,
            modifiers: Modifiers::fallback(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            _dh: PhantomData,
            _hash: PhantomData,
            _aead: PhantomData,
        }
    }

    /// Override the maximum message length (default
    /// [`DEFAULT_MAX_MESSAGE_LEN`]).
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// The selected pattern.
    pub fn pattern(&self) -> PatternName {
        self.pattern
    }

    /// The selected modifiers.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// The configured maximum message length.
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    /// The canonical protocol name, e.g. `Noise_IKpsk2_25519_ChaChaPoly_SHA256`.
    /// This is what seeds the symmetric state's transcript hash.
    pub fn name(&self) -> String {
        format!(
            "Noise_{}{}_{}_{}_{}",
            self.pattern.as_str(),
            self.modifiers.suffix(),
            D::NAME,
            A::NAME,
            H::NAME,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ChaChaPoly, Sha256Hash, X25519};

    type P = Protocol<X25519, Sha256Hash, ChaChaPoly>;

    #[test]
    fn name_matches_canonical_form() {
        let p = P::new(PatternName::Ik, Modifiers::none()).expect("valid");
        assert_eq!(p.name(), "Noise_IK_25519_ChaChaPoly_SHA256");
    }

    #[test]
    fn modifier_suffix_is_appended() {
        let p = P::new(PatternName::Ik, Modifiers { psk2: true, ..Modifiers::none() }).expect("valid");
        assert_eq!(p.name(), "Noise_IKpsk2_25519_ChaChaPoly_SHA256");
    }

    #[test]
    fn fallback_rejected_on_non_xx() {
        assert!(P::new(PatternName::Ik, Modifiers::fallback()).is_err());
    }

    #[test]
    fn xx_fallback_constructor_names_correctly() {
        let p = P::xx_fallback();
        assert_eq!(p.name(), "Noise_XXfallback_25519_ChaChaPoly_SHA256");
    }

    #[test]
    fn default_max_message_len_is_spec_default() {
        let p = P::new(PatternName::Nn, Modifiers::none()).expect("valid");
        assert_eq!(p.max_message_len(), DEFAULT_MAX_MESSAGE_LEN);
    }
}
