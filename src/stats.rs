//! Endpoint-wide counters, useful for diagnostics and tests.

/// Running counters for one [`Endpoint`](crate::Endpoint).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    /// Data/recovery packets sent.
    pub packets_sent: u64,
    /// Data/recovery packets received and authenticated.
    pub packets_received: u64,
    /// Packets dropped for failing authentication or the replay window.
    pub packets_dropped: u64,
    /// Original payloads delivered directly (not recovered).
    pub originals_delivered: u64,
    /// Original payloads recovered via the erasure decoder.
    pub originals_recovered: u64,
    /// Originals permanently lost (group closed with missing originals and
    /// decoding declared infeasible, or superseded before decodable).
    pub originals_lost: u64,
    /// Code groups closed on the sender side.
    pub groups_closed_tx: u64,
    /// Code groups marked done on the receiver side.
    pub groups_closed_rx: u64,
    /// Pongs sent.
    pub pongs_sent: u64,
    /// Pongs received.
    pub pongs_received: u64,
}
