//! The caller-supplied callback surface. See [`Interface`].

/// Callbacks the engine drives synchronously; the embedding application
/// implements this to receive data and to transmit packets.
///
/// Every method is called from inside one of [`Endpoint`](crate::Endpoint)'s
/// public methods, on the calling thread, and never re-entrantly.
pub trait Interface {
    /// Delivers a data payload: either an original received directly, or one
    /// recovered from an erasure-coded group.
    fn on_packet(&mut self, payload: &[u8]);

    /// Delivers an out-of-band application payload. The first byte is the
    /// caller-chosen type code (always `>= 0x10`, see [`crate::wire::type_byte::OOB_BASE`]).
    fn on_oob(&mut self, payload: &[u8]);

    /// Transmits an already-encrypted datagram to the peer.
    fn send_data(&mut self, packet: &[u8]);
}
