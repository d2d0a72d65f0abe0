//! The closed registry of handshake patterns and modifiers (spec §4.3).
#![forbid(unsafe_code)]

use crate::{Error, Result};

/// A token interpreted during `WriteMessage`/`ReadMessage`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// Transmit a fresh ephemeral public key.
    E,
    /// Transmit a static public key (encrypted if a key is active).
    S,
    /// Mix `DH(e, re)`.
    Ee,
    /// Mix `DH(e, rs)` (initiator) or `DH(s, re)` (responder).
    Es,
    /// Mix `DH(s, re)` (initiator) or `DH(e, rs)` (responder).
    Se,
    /// Mix `DH(s, rs)`.
    Ss,
    /// Consume the next queued PSK and `MixKeyAndHash`.
    Psk,
}

/// A pre-message token: only `E` or `S` ever appear before the handshake
/// proper (in practice only `S`, for the standard pattern set).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreMessageToken {
    /// The party's ephemeral public key is already known.
    E,
    /// The party's static public key is already known.
    S,
}

/// An ordered list of tokens forming one handshake message.
pub type MessagePattern = Vec<Token>;

/// Canonical name of a registry pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternName {
    N,
    K,
    X,
    Nn,
    Nk,
    Nx,
    Xn,
    Xk,
    Xx,
    Kn,
    Kk,
    Kx,
    In,
    Ik,
    Ix,
    XxFallback,
}

impl PatternName {
    /// Look up a pattern by its canonical token string (e.g. `"IK"`,
    /// `"XXfallback"`).
    pub fn from_str(name: &str) -> Result<Self> {
        Ok(match name {
            "N" => Self::N,
            "K" => Self::K,
            "X" => Self::X,
            "NN" => Self::Nn,
            "NK" => Self::Nk,
            "NX" => Self::Nx,
            "XN" => Self::Xn,
            "XK" => Self::Xk,
            "XX" => Self::Xx,
            "KN" => Self::Kn,
            "KK" => Self::Kk,
            "KX" => Self::Kx,
            "IN" => Self::In,
            "IK" => Self::Ik,
            "IX" => Self::Ix,
            "XXfallback" => Self::XxFallback,
            other => return Err(Error::Construction(format!("unknown handshake pattern {other}"))),
        })
    }

    /// Canonical token string, as it appears in a Noise protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::N => "N",
            Self::K => "K",
            Self::X => "X",
            Self::Nn => "NN",
            Self::Nk => "NK",
            Self::Nx => "NX",
            Self::Xn => "XN",
            Self::Xk => "XK",
            Self::Xx => "XX",
            Self::Kn => "KN",
            Self::Kk => "KK",
            Self::Kx => "KX",
            Self::In => "IN",
            Self::Ik => "IK",
            Self::Ix => "IX",
            Self::XxFallback => "XXfallback",
        }
    }

    /// Pre-message tokens known to the initiator and responder before the
    /// first handshake message.
    pub fn pre_messages(&self) -> (Vec<PreMessageToken>, Vec<PreMessageToken>) {
        use PreMessageToken::S as PS;
        match self {
            Self::N | Self::X | Self::Nk | Self::Xk | Self::Ik => (vec![], vec![PS]),
            Self::K | Self::Kk => (vec![PS], vec![PS]),
            Self::Kn | Self::Kx => (vec![PS], vec![]),
            Self::Nn | Self::Nx | Self::Xn | Self::Xx | Self::In | Self::Ix => (vec![], vec![]),
            Self::XxFallback => (vec![PreMessageToken::E], vec![]),
        }
    }

    /// The ordered list of message patterns for this handshake.
    pub fn message_patterns(&self) -> Vec<MessagePattern> {
        use Token::*;
        match self {
            Self::N => vec![vec![E, Es]],
            Self::K => vec![vec![E, Es, Ss]],
            Self::X => vec![vec![E, Es, S, Ss]],
            Self::Nn => vec![vec![E], vec![E, Ee]],
            Self::Nk => vec![vec![E, Es], vec![E, Ee]],
            Self::Nx => vec![vec![E], vec![E, Ee, S, Es]],
            Self::Xn => vec![vec![E], vec![E, Ee], vec![S, Se]],
            Self::Xk => vec![vec![E, Es], vec![E, Ee], vec![S, Se]],
            Self::Xx => vec![vec![E], vec![E, Ee, S, Es], vec![S, Se]],
            Self::Kn => vec![vec![E], vec![E, Ee, Se]],
            Self::Kk => vec![vec![E, Es, Ss], vec![E, Ee, Se]],
            Self::Kx => vec![vec![E], vec![E, Ee, Se, S, Es]],
            Self::In => vec![vec![E, S], vec![E, Ee, Se]],
            Self::Ik => vec![vec![E, Es, S, Ss], vec![E, Ee, Se]],
            Self::Ix => vec![vec![E, S], vec![E, Ee, Se, S, Es]],
            // The first XX message ("-> e") becomes the retained-ephemeral
            // pre-message on fallback; only the last two remain.
            Self::XxFallback => vec![vec![E, Ee, S, Es], vec![S, Se]],
        }
    }

    /// Whether this pattern may carry the `Fallback` modifier.
    pub fn allows_fallback_modifier(&self) -> bool {
        matches!(self, Self::Xx)
    }
}

/// Modifier bitset: `{Fallback, Psk0, Psk1, Psk2, Psk3}`.
///
/// `PskN` for `N > 0` appends a PSK token at the end of message pattern
/// `N - 1`; `Psk0` prepends one at the start of message pattern 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub fallback: bool,
    pub psk0: bool,
    pub psk1: bool,
    pub psk2: bool,
    pub psk3: bool,
}

impl Modifiers {
    /// No modifiers set.
    pub fn none() -> Self {
        Self::default()
    }

    /// Just the `Fallback` modifier.
    pub fn fallback() -> Self {
        Self { fallback: true, ..Self::default() }
    }

    /// How many PSK bits are set — must equal the number of PSKs supplied
    /// at construction.
    pub fn psk_count(&self) -> usize {
        [self.psk0, self.psk1, self.psk2, self.psk3].iter().filter(|b| **b).count()
    }

    /// Canonical modifier suffix, e.g. `psk2` or `fallback`, in the fixed
    /// order the Noise spec lists them.
    pub fn suffix(&self) -> String {
        let mut s = String::new();
        if self.fallback {
            s.push_str("fallback");
        }
        if self.psk0 {
            s.push_str("psk0");
        }
        if self.psk1 {
            s.push_str("psk1");
        }
        if self.psk2 {
            s.push_str("psk2");
        }
        if self.psk3 {
            s.push_str("psk3");
        }
        s
    }

    /// Insert `PSK` tokens into `patterns` per the modifier-placement rules.
    pub fn apply_psk_insertions(&self, patterns: &mut [MessagePattern]) -> Result<()> {
        if self.psk0 {
            let first = patterns
                .first_mut()
                .ok_or_else(|| Error::Construction("psk0 requires at least one message pattern".into()))?;
            first.insert(0, Token::Psk);
        }
        for (bit, idx) in [(self.psk1, 0usize), (self.psk2, 1), (self.psk3, 2)] {
            if bit {
                let pat = patterns
                    .get_mut(idx)
                    .ok_or_else(|| Error::Construction(format!("psk{} has no matching message pattern", idx + 1)))?;
                pat.push(Token::Psk);
            }
        }
        Ok(())
    }
}
