//! Cuts the outbound stream into code groups, produces recovery symbols, and
//! paces their emission. See [`Encoder`].

use web_time::{Duration, Instant};

use crate::{
    fec::{FecCoder, FecError},
    ring::GroupRing,
    seq::{GroupId, SymbolId},
    wire::{OriginalPayload, SymbolHeader},
};

/// Largest number of originals permitted in a single code group, bounded so
/// the systematic encoder stays within its design limits.
pub const MAX_GROUP_ORIGINALS: u16 = 64;

/// A payload passed to [`Endpoint::send`](crate::Endpoint::send) exceeded
/// what fits in one symbol.
#[derive(Debug, Clone, thiserror::Error)]
#[error("payload of {len} bytes exceeds the {max} byte limit")]
pub struct PayloadTooLarge {
    /// The payload's length.
    pub len: usize,
    /// The largest permitted length.
    pub max: usize,
}

/// A symbol ready to be enveloped and handed to the transport.
#[derive(Debug, Clone)]
pub struct OutgoingSymbol {
    /// Header describing this symbol's place in its group.
    pub header: SymbolHeader,
    /// Padded plaintext payload.
    pub payload: Vec<u8>,
}

/// The currently-open sender-side group: originals accumulated so far, not
/// yet padded or coded.
struct OpenGroup {
    code_group: GroupId,
    /// Length-prefixed, unpadded encodings of each original.
    originals: Vec<Vec<u8>>,
    opened_at: Instant,
}

impl OpenGroup {
    fn new(code_group: GroupId, now: Instant) -> Self {
        Self {
            code_group,
            originals: Vec::new(),
            opened_at: now,
        }
    }
}

/// Recovery symbols from the most recently closed group, trickled out across
/// the current group's window. Replaced (dropping any remainder) whenever a
/// further group closes.
struct PendingRecovery {
    code_group: GroupId,
    original_count: u16,
    next_symbol_id: SymbolId,
    symbols: Vec<Vec<u8>>,
    emit_interval: Duration,
    /// Schedule time of the next symbol, advanced by `emit_interval` each
    /// emission regardless of when it actually goes out, so a tick that
    /// lands well after several interval boundaries drains all of them
    /// instead of only the one due right now.
    next_due: Instant,
}

/// Cuts outbound payloads into code groups, emits originals immediately, and
/// paces recovery symbol emission across the following group's window.
pub struct Encoder {
    next_code_group: GroupId,
    open: OpenGroup,
    pending_recovery: Option<PendingRecovery>,
    swap_interval: Duration,
    group_stamps: GroupRing<Option<Instant>>,
}

/// A group has just closed: carries everything [`crate::delay::DelayEstimator`]
/// and the OOB layer need, and the originals to pad/code.
pub struct ClosedGroup {
    /// The group that closed.
    pub code_group: GroupId,
    /// Length-prefixed, unpadded original encodings.
    pub originals: Vec<Vec<u8>>,
}

impl Encoder {
    /// Creates a new encoder starting at group 0, with an initial swap
    /// interval (typically `min_delay`, before any delay sample exists).
    #[must_use]
    pub fn new(initial_swap_interval: Duration, now: Instant) -> Self {
        Self {
            next_code_group: GroupId::ZERO.next(),
            open: OpenGroup::new(GroupId::ZERO, now),
            pending_recovery: None,
            swap_interval: initial_swap_interval,
            group_stamps: GroupRing::new_from_fn(|_| None),
        }
    }

    /// Updates the swap interval used for the *next* close decision, given a
    /// fresh delay estimate clamped by the caller.
    pub fn set_swap_interval(&mut self, interval: Duration) {
        self.swap_interval = interval;
    }

    /// The group currently accepting originals.
    #[must_use]
    pub fn current_group(&self) -> GroupId {
        self.open.code_group
    }

    /// Encodes `payload` as the next original in the current group, and
    /// reports whether the group must now close (symbol count limit
    /// reached). The caller still has to transmit the returned symbol and,
    /// if `should_close` is `true`, follow up with [`Encoder::close`].
    pub fn send(
        &mut self,
        payload: &[u8],
        max_symbol_payload: usize,
    ) -> Result<(OutgoingSymbol, bool), PayloadTooLarge> {
        let mut encoded = encode_original(payload);
        if encoded.len() > max_symbol_payload {
            return Err(PayloadTooLarge {
                len: payload.len(),
                max: max_symbol_payload,
            });
        }
        // every symbol in a group shares one padded length L; since
        // originals are emitted immediately rather than held back until the
        // group's true maximum is known, L is fixed to the configured
        // per-symbol ceiling instead of the in-group maximum
        encoded.resize(max_symbol_payload, 0);

        let symbol_id = self.open.originals.len() as SymbolId;
        let header = SymbolHeader {
            code_group: self.open.code_group,
            symbol_id,
            // not yet known until close; the receiver treats these as
            // provisional until it sees the first symbol of a new group
            original_count: symbol_id + 1,
            recovery_count: 0,
        };
        let out = OutgoingSymbol {
            header,
            payload: encoded.clone(),
        };
        self.open.originals.push(encoded);

        let should_close = self.open.originals.len() >= usize::from(MAX_GROUP_ORIGINALS);
        Ok((out, should_close))
    }

    /// Closes the current group, recording its close timestamp for RTT
    /// matching and starting the next one. Returns the closed group's raw
    /// originals for the caller to pad and run through the erasure coder.
    pub fn close(&mut self, now: Instant) -> ClosedGroup {
        let closing_id = self.open.code_group;
        *self.group_stamps.get_mut(closing_id) = Some(now);

        let next_id = self.next_code_group;
        self.next_code_group = next_id.next();
        let closed = std::mem::replace(&mut self.open, OpenGroup::new(next_id, now));

        ClosedGroup {
            code_group: closed.code_group,
            originals: closed.originals,
        }
    }

    /// Whether the open group's age has reached the current swap interval.
    /// An empty group never closes on time alone: closing it would still
    /// advance the 8-bit group id, so an idle endpoint ticking every few
    /// milliseconds would burn through the id space and desync the
    /// receiver's cursor long before any data was ever sent.
    #[must_use]
    pub fn should_close_by_time(&self, now: Instant) -> bool {
        !self.open.originals.is_empty()
            && now.saturating_duration_since(self.open.opened_at) >= self.swap_interval
    }

    /// Installs freshly produced recovery symbols for a just-closed group,
    /// to be paced out across the new current group's window. Drops any
    /// symbols still undelivered from a previous recovery batch.
    pub fn install_recovery(
        &mut self,
        code_group: GroupId,
        original_count: u16,
        symbols: Vec<Vec<u8>>,
        now: Instant,
    ) {
        if symbols.is_empty() {
            self.pending_recovery = None;
            return;
        }
        let emit_interval = self.swap_interval / u32::try_from(symbols.len()).unwrap_or(1).max(1);
        self.pending_recovery = Some(PendingRecovery {
            code_group,
            original_count,
            next_symbol_id: original_count,
            symbols,
            emit_interval,
            // due immediately, so the first recovery symbol goes out on the
            // next tick rather than waiting a full pacing interval
            next_due: now,
        });
    }

    /// Returns the next recovery symbol due for emission, if its scheduled
    /// time has passed. Call this in a loop: a tick arriving well after
    /// several pacing intervals have elapsed drains all of the symbols that
    /// fell due in the meantime, one per call, rather than only the first.
    pub fn due_recovery_symbol(&mut self, now: Instant) -> Option<OutgoingSymbol> {
        let pending = self.pending_recovery.as_mut()?;
        if now < pending.next_due {
            return None;
        }

        let index = usize::from(pending.next_symbol_id - pending.original_count);
        let payload = pending.symbols.get(index)?.clone();
        let header = SymbolHeader {
            code_group: pending.code_group,
            symbol_id: pending.next_symbol_id,
            original_count: pending.original_count,
            recovery_count: pending.symbols.len() as u16,
        };
        pending.next_symbol_id += 1;
        pending.next_due += pending.emit_interval;

        if usize::from(pending.next_symbol_id - pending.original_count) >= pending.symbols.len() {
            self.pending_recovery = None;
        }

        Some(OutgoingSymbol { header, payload })
    }

    /// Looks up when a given group closed, for RTT matching against an
    /// incoming pong.
    #[must_use]
    pub fn group_closed_at(&self, code_group: GroupId) -> Option<Instant> {
        *self.group_stamps.get(code_group)
    }
}

fn encode_original(payload: &[u8]) -> Vec<u8> {
    use octs::Encode;
    let original = OriginalPayload {
        data: payload.to_vec().into(),
    };
    let mut buf = Vec::new();
    original
        .encode(&mut buf)
        .expect("encoding to a growable Vec is infallible");
    buf
}

/// Pads every entry of `originals` up to the length of the longest one, and
/// runs the erasure coder over the result to produce `recovery_count`
/// recovery symbols.
pub fn pad_and_encode(
    originals: &[Vec<u8>],
    recovery_count: u16,
) -> Result<(usize, Vec<Vec<u8>>), FecError> {
    let symbol_len = originals.iter().map(Vec::len).max().unwrap_or(0);
    let padded: Vec<Vec<u8>> = originals
        .iter()
        .map(|o| {
            let mut buf = o.clone();
            buf.resize(symbol_len, 0);
            buf
        })
        .collect();

    if recovery_count == 0 || padded.is_empty() {
        return Ok((symbol_len, Vec::new()));
    }

    let originals_count =
        u16::try_from(padded.len()).expect("group size bounded by MAX_GROUP_ORIGINALS");
    let coder = FecCoder::new(originals_count, recovery_count)?;
    let recovery = coder.encode(&padded)?;
    Ok((symbol_len, recovery))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_emits_original_and_tracks_close_threshold() {
        let mut encoder = Encoder::new(Duration::from_millis(20), Instant::now());
        let (symbol, should_close) = encoder.send(b"hello", 1024).unwrap();
        assert!(symbol.header.is_original());
        assert_eq!(symbol.header.symbol_id, 0);
        assert!(!should_close);
    }

    #[test]
    fn closing_group_advances_id_and_resets() {
        let mut encoder = Encoder::new(Duration::from_millis(20), Instant::now());
        encoder.send(b"a", 1024).unwrap();
        let now = Instant::now();
        let closed = encoder.close(now);
        assert_eq!(closed.code_group, GroupId::ZERO);
        assert_eq!(closed.originals.len(), 1);
        assert_eq!(encoder.current_group(), GroupId::ZERO.next());
        assert_eq!(encoder.group_closed_at(GroupId::ZERO), Some(now));
    }

    #[test]
    fn pad_and_encode_produces_uniform_length_recovery() {
        let originals = vec![vec![1, 2, 3], vec![4, 5], vec![6, 7, 8, 9]];
        let (symbol_len, recovery) = pad_and_encode(&originals, 2).unwrap();
        assert_eq!(symbol_len, 4);
        assert_eq!(recovery.len(), 2);
        for r in &recovery {
            assert_eq!(r.len(), symbol_len);
        }
    }

    #[test]
    fn recovery_paces_across_ticks() {
        let mut encoder = Encoder::new(Duration::from_millis(80), Instant::now());
        let now = Instant::now();
        encoder.install_recovery(GroupId::ZERO, 4, vec![vec![1], vec![2]], now);

        assert!(encoder.due_recovery_symbol(now).is_some());
        assert!(encoder.due_recovery_symbol(now).is_none());

        let later = now + Duration::from_millis(50);
        let symbol = encoder.due_recovery_symbol(later).unwrap();
        assert_eq!(symbol.header.symbol_id, 5);
    }

    #[test]
    fn new_recovery_batch_drops_remainder_of_old() {
        let mut encoder = Encoder::new(Duration::from_millis(80), Instant::now());
        let now = Instant::now();
        encoder.install_recovery(GroupId::ZERO, 4, vec![vec![1], vec![2]], now);
        encoder.due_recovery_symbol(now);

        encoder.install_recovery(GroupId::ZERO.next(), 4, vec![vec![9]], now);
        let symbol = encoder.due_recovery_symbol(now).unwrap();
        assert_eq!(symbol.header.code_group, GroupId::ZERO.next());
    }

    #[test]
    fn lagged_tick_drains_every_symbol_that_fell_due() {
        // a 40ms window split across 4 recovery symbols paces them 10ms
        // apart; a single tick landing 35ms later should drain all 4,
        // not just the one due right now
        let mut encoder = Encoder::new(Duration::from_millis(40), Instant::now());
        let now = Instant::now();
        encoder.install_recovery(GroupId::ZERO, 4, vec![vec![1], vec![2], vec![3], vec![4]], now);

        let later = now + Duration::from_millis(35);
        let mut drained = Vec::new();
        while let Some(symbol) = encoder.due_recovery_symbol(later) {
            drained.push(symbol.header.symbol_id);
        }
        assert_eq!(drained, vec![4, 5, 6, 7]);
    }
}
