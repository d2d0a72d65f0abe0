//! Noise Protocol Framework core (revision 33).
//!
//! - `primitives`: pluggable AEAD / Diffie-Hellman / hash capabilities
//! - `cipher_state` / `symmetric_state`: key derivation and AEAD machinery
//!   driving the handshake
//! - `pattern`: the closed registry of handshake patterns and modifiers
//! - `handshake`: the token-driven handshake state machine, including
//!   `XXfallback` recovery
//! - `transport`: the post-handshake secure channel, in-order and
//!   out-of-order (explicit-nonce)
//! - `buffer`: scatter-gather helpers for segmented wire I/O
#![forbid(unsafe_code)]

pub mod buffer;
pub mod cipher_state;
pub mod handshake;
pub mod keypair;
pub mod pattern;
pub mod primitives;
pub mod protocol;
pub mod symmetric_state;
pub mod transport;

/// Errors produced anywhere in the handshake/transport machinery.
///
/// The four variants correspond to the error taxonomy: construction-time
/// misconfiguration, protocol misuse by the caller, cryptographic failure
/// (terminal for the state it occurred in), and use-after-dispose.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrong-sized key, missing required key, surplus key, forbidden
    /// modifier, or PSK count/size mismatch at construction time.
    #[error("construction error: {0}")]
    Construction(String),
    /// Operation attempted out of turn, after completion, or with a buffer
    /// too small / payload too large.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),
    /// AEAD tag verification, DH, or nonce-space failure. Terminal for the
    /// handshake or transport that raised it.
    #[error("cryptographic failure: {0}")]
    Crypto(String),
    /// Operation attempted on a handshake or transport after it was
    /// disposed/completed.
    #[error("disposed object accessed")]
    Disposed,
}

/// Result alias used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;
