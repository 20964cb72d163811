//! Packet-level authenticated encryption and replay protection. See
//! [`CipherEnvelope`].

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

/// Length of the shared secret required at initialization.
pub const SKEY_BYTES: usize = 32;

/// Fixed per-packet overhead added by the envelope: a 12-byte nonce prefix
/// plus a 16-byte authentication tag.
pub const CIPHER_OVERHEAD: usize = 12 + 16;

const NONCE_LEN: usize = 12;

/// Width of the replay window, in packets behind the highest nonce counter
/// seen so far.
const REPLAY_WINDOW: u64 = 128;

const CONTEXT_INITIATOR_TO_RESPONDER: &str = "fecshim 2026 packet key initiator-to-responder";
const CONTEXT_RESPONDER_TO_INITIATOR: &str = "fecshim 2026 packet key responder-to-initiator";

/// A packet failed to decrypt, was too short to contain an envelope, or was
/// rejected by the replay window.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnvelopeError {
    /// Packet is shorter than the minimum envelope size.
    #[error("packet too short to contain a valid envelope")]
    TooShort,
    /// Authenticated decryption failed: wrong key, corrupted ciphertext, or
    /// tampered tag.
    #[error("authentication failed")]
    AuthFailed,
    /// The nonce counter was already seen, or fell too far behind the
    /// highest counter observed so far.
    #[error("replayed or stale packet")]
    Replayed,
}

/// The shared secret rejected by the cipher, or some other configuration
/// problem at initialization.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid cipher key material")]
pub struct KeyError;

/// One direction's sending half: a cipher keyed for this direction plus a
/// monotonic nonce counter.
struct SendKey {
    cipher: ChaCha20Poly1305,
    next_counter: u64,
}

impl SendKey {
    fn new(key: &Key) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key),
            next_counter: 0,
        }
    }

    fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let counter = self.next_counter;
        self.next_counter = self.next_counter.wrapping_add(1);

        let nonce_bytes = nonce_bytes_for(counter);
        let nonce = Nonce::from_slice(&nonce_bytes);
        // only fails if the underlying cipher rejects the buffer, which
        // doesn't happen for an in-memory Vec sink
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .expect("chacha20poly1305 encryption is infallible for in-memory buffers");

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        out
    }
}

/// Replay protection over the nonce-counter space, using the same
/// signed-distance bitfield idiom as the receiver's group ring.
struct ReplayWindow {
    highest: Option<u64>,
    seen: u128,
}

impl ReplayWindow {
    fn new() -> Self {
        Self {
            highest: None,
            seen: 0,
        }
    }

    /// Returns `true` if `counter` is acceptable (not previously seen, not
    /// too far behind the window), and records it.
    fn accept(&mut self, counter: u64) -> bool {
        let Some(highest) = self.highest else {
            self.highest = Some(counter);
            self.seen = 1;
            return true;
        };

        if counter > highest {
            let shift = counter - highest;
            self.seen = if shift >= 128 { 0 } else { self.seen << shift };
            self.seen |= 1;
            self.highest = Some(counter);
            return true;
        }

        let behind = highest - counter;
        if behind >= REPLAY_WINDOW {
            return false;
        }
        let bit = 1u128 << behind;
        if self.seen & bit != 0 {
            return false;
        }
        self.seen |= bit;
        true
    }
}

/// One direction's receiving half: a cipher keyed for this direction plus
/// the replay window over its nonce counters.
struct RecvKey {
    cipher: ChaCha20Poly1305,
    replay: ReplayWindow,
}

impl RecvKey {
    fn new(key: &Key) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key),
            replay: ReplayWindow::new(),
        }
    }

    fn open(&mut self, packet: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if packet.len() < NONCE_LEN + 16 {
            return Err(EnvelopeError::TooShort);
        }
        let (nonce_bytes, ciphertext) = packet.split_at(NONCE_LEN);
        let counter = counter_from_nonce_bytes(nonce_bytes);
        if !self.replay.accept(counter) {
            return Err(EnvelopeError::Replayed);
        }

        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| EnvelopeError::AuthFailed)
    }
}

fn nonce_bytes_for(counter: u64) -> [u8; NONCE_LEN] {
    let mut bytes = [0u8; NONCE_LEN];
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    bytes
}

fn counter_from_nonce_bytes(bytes: &[u8]) -> u64 {
    let mut counter_bytes = [0u8; 8];
    counter_bytes.copy_from_slice(&bytes[4..12]);
    u64::from_be_bytes(counter_bytes)
}

/// Per-direction authenticated encryption envelope.
///
/// Both endpoints derive their send/receive key pair from the same shared
/// secret, disambiguated by an `initiator` role each side must pick
/// oppositely: this endpoint's send key is the other's receive key, and vice
/// versa.
pub struct CipherEnvelope {
    tx: SendKey,
    rx: RecvKey,
}

impl CipherEnvelope {
    /// Derives both direction keys from `shared_secret` and this endpoint's
    /// role.
    pub fn new(shared_secret: &[u8; SKEY_BYTES], initiator: bool) -> Result<Self, KeyError> {
        let (tx_context, rx_context) = if initiator {
            (
                CONTEXT_INITIATOR_TO_RESPONDER,
                CONTEXT_RESPONDER_TO_INITIATOR,
            )
        } else {
            (
                CONTEXT_RESPONDER_TO_INITIATOR,
                CONTEXT_INITIATOR_TO_RESPONDER,
            )
        };

        let tx_key_bytes = blake3::derive_key(tx_context, shared_secret);
        let rx_key_bytes = blake3::derive_key(rx_context, shared_secret);

        Ok(Self {
            tx: SendKey::new(Key::from_slice(&tx_key_bytes)),
            rx: RecvKey::new(Key::from_slice(&rx_key_bytes)),
        })
    }

    /// Encrypts and authenticates `plaintext`, returning the full on-wire
    /// envelope (nonce prefix, ciphertext, tag suffix).
    pub fn seal(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.tx.seal(plaintext)
    }

    /// Authenticates and decrypts `packet`, enforcing the replay window.
    pub fn open(&mut self, packet: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        self.rx.open(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> [u8; SKEY_BYTES] {
        [byte; SKEY_BYTES]
    }

    #[test]
    fn round_trip_across_directions() {
        let secret = secret(7);
        let mut initiator = CipherEnvelope::new(&secret, true).unwrap();
        let mut responder = CipherEnvelope::new(&secret, false).unwrap();

        let packet = initiator.seal(b"hello");
        let plaintext = responder.open(&packet).unwrap();
        assert_eq!(plaintext, b"hello");

        let packet = responder.seal(b"world");
        let plaintext = initiator.open(&packet).unwrap();
        assert_eq!(plaintext, b"world");
    }

    #[test]
    fn tampered_packet_fails_auth() {
        let secret = secret(3);
        let mut initiator = CipherEnvelope::new(&secret, true).unwrap();
        let mut responder = CipherEnvelope::new(&secret, false).unwrap();

        let mut packet = initiator.seal(b"hello");
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;

        assert!(matches!(
            responder.open(&packet),
            Err(EnvelopeError::AuthFailed)
        ));
    }

    #[test]
    fn replayed_packet_is_rejected() {
        let secret = secret(9);
        let mut initiator = CipherEnvelope::new(&secret, true).unwrap();
        let mut responder = CipherEnvelope::new(&secret, false).unwrap();

        let packet = initiator.seal(b"once");
        responder.open(&packet).unwrap();
        assert!(matches!(
            responder.open(&packet),
            Err(EnvelopeError::Replayed)
        ));
    }

    #[test]
    fn too_short_packet_rejected() {
        let secret = secret(1);
        let mut responder = CipherEnvelope::new(&secret, false).unwrap();
        assert!(matches!(
            responder.open(&[0u8; 4]),
            Err(EnvelopeError::TooShort)
        ));
    }

    #[test]
    fn out_of_order_within_window_accepted() {
        let mut window = ReplayWindow::new();
        assert!(window.accept(10));
        assert!(window.accept(12));
        assert!(window.accept(11));
        assert!(!window.accept(11));
    }

    #[test]
    fn far_behind_window_rejected() {
        let mut window = ReplayWindow::new();
        assert!(window.accept(1000));
        assert!(!window.accept(1000 - 200));
    }
}
