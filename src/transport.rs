//! The post-handshake secure channel: in-order and out-of-order
//! (explicit-nonce) transport over a completed handshake (spec §5).
#![forbid(unsafe_code)]

use crate::cipher_state::CipherState;
use crate::primitives::AeadAlg;
use crate::{Error, Result};

/// A pair of cipher states produced by `HandshakeState::split`, oriented by
/// role. One-way patterns leave the unused direction `None`.
pub struct Transport<A: AeadAlg> {
    is_initiator: bool,
    send: Option<CipherState<A>>,
    recv: Option<CipherState<A>>,
    max_message_len: usize,
}

impl<A: AeadAlg> Transport<A> {
    pub(crate) fn new(
        is_initiator: bool,
        send: Option<CipherState<A>>,
        recv: Option<CipherState<A>>,
        max_message_len: usize,
    ) -> Self {
        Self { is_initiator, send, recv, max_message_len }
    }

    /// Whether this transport was the initiator's side of the handshake.
    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    /// Whether this transport can only send, or only receive (a one-way
    /// pattern such as `N`, `K`, or `X`).
    pub fn is_one_way(&self) -> bool {
        self.send.is_none() || self.recv.is_none()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_message_len {
            Err(Error::ProtocolMisuse(format!(
                "message of {len} bytes exceeds max_message_len {}",
                self.max_message_len
            )))
        } else {
            Ok(())
        }
    }

    /// Encrypt `plaintext` with the next in-order nonce, writing
    /// ciphertext‖tag to `out`. Errors if this transport has no send
    /// direction (a one-way pattern's receive-only side).
    pub fn write(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize> {
        self.check_len(plaintext.len() + 16)?;
        let send = self
            .send
            .as_mut()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no send direction".into()))?;
        let ct = send.encrypt_with_ad(&[], plaintext)?;
        if out.len() < ct.len() {
            return Err(Error::ProtocolMisuse(format!(
                "output buffer too small: need {}, have {}",
                ct.len(),
                out.len()
            )));
        }
        out[..ct.len()].copy_from_slice(&ct);
        Ok(ct.len())
    }

    /// Decrypt the next in-order ciphertext, writing plaintext to `out`.
    /// Errors if this transport has no receive direction.
    pub fn read(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize> {
        self.check_len(ciphertext.len())?;
        let recv = self
            .recv
            .as_mut()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no receive direction".into()))?;
        let pt = recv.decrypt_with_ad(&[], ciphertext)?;
        if out.len() < pt.len() {
            return Err(Error::ProtocolMisuse(format!(
                "output buffer too small: need {}, have {}",
                pt.len(),
                out.len()
            )));
        }
        out[..pt.len()].copy_from_slice(&pt);
        Ok(pt.len())
    }

    /// Encrypt `plaintext` at the current send nonce without assuming
    /// in-order delivery, returning the nonce used alongside the ciphertext
    /// length written to `out`.
    pub fn write_explicit(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<(u64, usize)> {
        self.check_len(plaintext.len() + 16)?;
        let send = self
            .send
            .as_mut()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no send direction".into()))?;
        let (n, ct) = send.explicit_encrypt(&[], plaintext)?;
        if out.len() < ct.len() {
            return Err(Error::ProtocolMisuse(format!(
                "output buffer too small: need {}, have {}",
                ct.len(),
                out.len()
            )));
        }
        out[..ct.len()].copy_from_slice(&ct);
        Ok((n, ct.len()))
    }

    /// Decrypt a ciphertext known to have been sealed at nonce `n`,
    /// regardless of delivery order. Does not touch the receive side's own
    /// nonce counter, so messages may arrive and be read in any order.
    pub fn read_at(&self, n: u64, ciphertext: &[u8], out: &mut [u8]) -> Result<usize> {
        self.check_len(ciphertext.len())?;
        let recv = self
            .recv
            .as_ref()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no receive direction".into()))?;
        let pt = recv.explicit_decrypt(n, &[], ciphertext)?;
        if out.len() < pt.len() {
            return Err(Error::ProtocolMisuse(format!(
                "output buffer too small: need {}, have {}",
                pt.len(),
                out.len()
            )));
        }
        out[..pt.len()].copy_from_slice(&pt);
        Ok(pt.len())
    }

    /// Rekey the send direction (`Rekey()` applied to the send cipher
    /// state).
    pub fn rekey_send(&mut self) -> Result<()> {
        self.send
            .as_mut()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no send direction".into()))?
            .rekey()
    }

    /// Rekey the receive direction.
    pub fn rekey_recv(&mut self) -> Result<()> {
        self.recv
            .as_mut()
            .ok_or_else(|| Error::ProtocolMisuse("transport has no receive direction".into()))?
            .rekey()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ChaChaPoly;

    fn paired_transports() -> (Transport<ChaChaPoly>, Transport<ChaChaPoly>) {
        let mut a = CipherState::<ChaChaPoly>::empty();
        a.initialize_key([9u8; 32]);
        let mut b = CipherState::<ChaChaPoly>::empty();
        b.initialize_key([8u8; 32]);
        let init = Transport::new(true, Some(a), Some(CipherState::empty()), 65535);
        (init, Transport::new(false, Some(CipherState::empty()), Some(b), 65535))
    }

    #[test]
    fn in_order_roundtrip() {
        let (mut init, mut resp) = paired_transports();
        let mut ct = [0u8; 64];
        let n = init.write(b"hello", &mut ct).expect("write");
        let mut pt = [0u8; 64];
        let m = resp.read(&ct[..n], &mut pt).expect("read");
        assert_eq!(&pt[..m], b"hello");
    }

    #[test]
    fn one_way_transport_refuses_wrong_direction() {
        let mut one_way = Transport::<ChaChaPoly>::new(true, Some(CipherState::empty()), None, 65535);
        assert!(one_way.is_one_way());
        let mut buf = [0u8; 16];
        let err = one_way.read(b"x", &mut buf).unwrap_err();
        assert!(matches!(err, Error::ProtocolMisuse(_)));
    }

    #[test]
    fn out_of_order_reads_in_scrambled_order() {
        let mut tx = CipherState::<ChaChaPoly>::empty();
        tx.initialize_key([6u8; 32]);
        let mut rx = CipherState::<ChaChaPoly>::empty();
        rx.initialize_key([6u8; 32]);
        let mut init = Transport::new(true, Some(tx), Some(CipherState::empty()), 65535);
        let mut resp = Transport::new(false, Some(CipherState::empty()), Some(rx), 65535);

        let msgs: [&[u8]; 4] = [b"one", b"two", b"three", b"four"];
        let mut cts = Vec::new();
        for m in msgs {
            let mut buf = [0u8; 64];
            let (n, len) = init.write_explicit(m, &mut buf).expect("seal");
            cts.push((n, buf[..len].to_vec()));
        }
        for idx in [0usize, 3, 2, 1] {
            let (n, ct) = &cts[idx];
            let mut pt = [0u8; 64];
            let len = resp.read_at(*n, ct, &mut pt).expect("open");
            assert_eq!(&pt[..len], msgs[idx]);
        }
    }

    #[test]
    fn rekey_send_changes_subsequent_ciphertexts() {
        let (mut init, _resp) = paired_transports();
        let mut ct1 = [0u8; 64];
        let n1 = init.write(b"same", &mut ct1).expect("write1");
        init.rekey_send().expect("rekey");
        // Reuse the same nonce space is not possible without resetting; the
        // point here is just that rekey succeeds and the cipher remains usable.
        let mut ct2 = [0u8; 64];
        let n2 = init.write(b"same", &mut ct2).expect("write2");
        assert_ne!(&ct1[..n1], &ct2[..n2]);
    }
}
