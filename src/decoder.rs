//! Receiver-side code-group tracking and erasure decoding. See [`Decoder`].

use std::collections::BTreeMap;

use crate::{
    fec::FecCoder,
    loss::GroupObservation,
    ring::GroupRing,
    seq::{GroupId, SymbolId},
    wire::{OriginalPayload, SymbolHeader},
};

/// How far behind the cursor a group id may fall before it's treated as
/// stale rather than merely old.
const STALE_DISTANCE: i16 = 128;

#[derive(Debug, Default)]
enum GroupState {
    #[default]
    Empty,
    Open(OpenGroup),
    Done {
        original_count: u16,
        seen: u16,
    },
}

#[derive(Debug, Default)]
struct OpenGroup {
    /// Final counts, learned from the first recovery symbol seen (originals
    /// carry only a provisional count that isn't trustworthy).
    final_counts: Option<(u16, u16)>,
    /// Raw symbol bytes, keyed by symbol id, pending decode.
    symbols: BTreeMap<SymbolId, Vec<u8>>,
    /// Original ids already delivered upward, so a recovered duplicate of an
    /// already-seen original is suppressed.
    delivered: Vec<bool>,
}

impl OpenGroup {
    fn originals_seen(&self) -> usize {
        match self.final_counts {
            Some((original_count, _)) => self
                .symbols
                .keys()
                .filter(|&&id| id < original_count)
                .count(),
            None => self.symbols.len(),
        }
    }
}

/// A payload ready for upward delivery, tagged with whether it arrived
/// directly or was recovered.
#[derive(Debug, Clone)]
pub struct DeliveredOriginal {
    /// Decoded application payload.
    pub payload: Vec<u8>,
    /// `true` if this came from the erasure decoder rather than directly off
    /// the wire.
    pub recovered: bool,
}

/// Everything a completed [`Decoder::receive`] call might produce.
#[derive(Debug, Default)]
pub struct ReceiveOutcome {
    /// Originals ready for upward delivery, in ascending symbol-id order.
    pub deliveries: Vec<DeliveredOriginal>,
    /// Set if the group this symbol belonged to (or a superseded one) just
    /// finished, for loss-window bookkeeping.
    pub closed_groups: Vec<(GroupId, GroupObservation)>,
}

/// A symbol failed to decode, or carried parameters inconsistent with the
/// rest of its group.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// The symbol's declared `symbol_id` doesn't fit any sane group layout
    /// (e.g. recovery count so large the coder would reject it).
    #[error("symbol parameters inconsistent with group {code_group:?}")]
    InconsistentParams {
        /// The offending group.
        code_group: GroupId,
    },
}

/// Tracks every in-flight code group in a 256-slot ring, delivers originals
/// immediately, and invokes the erasure decoder once enough symbols have
/// arrived for an incomplete group.
pub struct Decoder {
    ring: GroupRing<GroupState>,
    cursor: Option<GroupId>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Creates a decoder with every ring slot empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: GroupRing::new_from_fn(|_| GroupState::Empty),
            cursor: None,
        }
    }

    /// Processes one authenticated symbol.
    pub fn receive(
        &mut self,
        header: SymbolHeader,
        payload: Vec<u8>,
    ) -> Result<ReceiveOutcome, DecodeError> {
        let mut outcome = ReceiveOutcome::default();
        self.advance_cursor(header.code_group, &mut outcome);

        if let Some(cursor) = self.cursor {
            if cursor.dist_to(header.code_group) < -STALE_DISTANCE {
                // stale: older than the window behind the cursor
                return Ok(outcome);
            }
        }

        let is_recovery = !header.is_original();
        let is_done = matches!(self.ring.get(header.code_group), GroupState::Done { .. });
        if is_done {
            // already resolved; still useful for statistics, which were
            // already finalized when it closed
        } else {
            if matches!(self.ring.get(header.code_group), GroupState::Empty) {
                *self.ring.get_mut(header.code_group) = GroupState::Open(OpenGroup::default());
            }
            self.insert_symbol(header, payload, is_recovery, &mut outcome)?;
        }

        self.maybe_finish(header.code_group, &mut outcome)?;
        Ok(outcome)
    }

    fn insert_symbol(
        &mut self,
        header: SymbolHeader,
        payload: Vec<u8>,
        is_recovery: bool,
        outcome: &mut ReceiveOutcome,
    ) -> Result<(), DecodeError> {
        let GroupState::Open(open) = self.ring.get_mut(header.code_group) else {
            return Ok(());
        };

        if is_recovery && open.final_counts.is_none() {
            open.final_counts = Some((header.original_count, header.recovery_count));
            open.delivered
                .resize(usize::from(header.original_count), false);
        }

        if !is_recovery {
            let id = usize::from(header.symbol_id);
            if open.delivered.len() <= id {
                open.delivered.resize(id + 1, false);
            }
            if !open.delivered[id] {
                open.delivered[id] = true;
                outcome.deliveries.push(DeliveredOriginal {
                    payload: depad(&payload),
                    recovered: false,
                });
            }
        }

        open.symbols.entry(header.symbol_id).or_insert(payload);
        Ok(())
    }

    fn maybe_finish(
        &mut self,
        code_group: GroupId,
        outcome: &mut ReceiveOutcome,
    ) -> Result<(), DecodeError> {
        let GroupState::Open(open) = self.ring.get(code_group) else {
            return Ok(());
        };
        let Some((original_count, recovery_count)) = open.final_counts else {
            return Ok(());
        };

        let originals_seen = open.originals_seen();
        if open.symbols.len() < usize::from(original_count) {
            return Ok(());
        }

        if originals_seen < usize::from(original_count) {
            self.decode_group(code_group, original_count, recovery_count, outcome)?;
        }

        self.finish_group(code_group, original_count, outcome);
        Ok(())
    }

    fn decode_group(
        &mut self,
        code_group: GroupId,
        original_count: u16,
        recovery_count: u16,
        outcome: &mut ReceiveOutcome,
    ) -> Result<(), DecodeError> {
        let GroupState::Open(open) = self.ring.get_mut(code_group) else {
            return Ok(());
        };

        let coder = FecCoder::new(original_count, recovery_count)
            .map_err(|_| DecodeError::InconsistentParams { code_group })?;

        let shards: Vec<Option<Vec<u8>>> = (0..original_count + recovery_count)
            .map(|id| open.symbols.get(&id).cloned())
            .collect();

        match coder.decode(shards) {
            Ok(originals) => {
                for (id, payload) in originals.into_iter().enumerate() {
                    if !open.delivered[id] {
                        open.delivered[id] = true;
                        outcome.deliveries.push(DeliveredOriginal {
                            payload: depad(&payload),
                            recovered: true,
                        });
                    }
                }
            }
            Err(_) => {
                // infeasible: originals already delivered stay delivered,
                // the rest are permanently lost
            }
        }
        Ok(())
    }

    fn finish_group(&mut self, code_group: GroupId, original_count: u16, outcome: &mut ReceiveOutcome) {
        let seen = {
            let GroupState::Open(open) = self.ring.get(code_group) else {
                return;
            };
            u16::try_from(open.originals_seen()).unwrap_or(original_count)
        };
        outcome
            .closed_groups
            .push((code_group, GroupObservation { seen: u32::from(seen), count: u32::from(original_count) }));
        *self.ring.get_mut(code_group) = GroupState::Done {
            original_count,
            seen,
        };
    }

    /// Advances the cursor on seeing a new-looking group id. Only groups
    /// that fall more than [`STALE_DISTANCE`] behind the *new* cursor are
    /// superseded: a group sitting at cursor+1 still has its recovery
    /// symbols arriving during the next group's window (spec 4.2) and must
    /// stay open to receive them, so closing on every single-step advance
    /// would drop that recovery traffic against an already-`Done` group.
    fn advance_cursor(&mut self, seen_id: GroupId, outcome: &mut ReceiveOutcome) {
        let Some(cursor) = self.cursor else {
            self.cursor = Some(seen_id);
            return;
        };

        let dist = cursor.dist_to(seen_id);
        if dist <= 0 {
            return;
        }

        let stale = u8::try_from(STALE_DISTANCE).unwrap_or(u8::MAX);
        let mut id = GroupId::new(cursor.0.wrapping_sub(stale));
        let end = GroupId::new(seen_id.0.wrapping_sub(stale));
        while id != end {
            self.supersede(id, outcome);
            id = id.next();
        }
        self.cursor = Some(seen_id);
    }

    fn supersede(&mut self, code_group: GroupId, outcome: &mut ReceiveOutcome) {
        let counts = {
            let GroupState::Open(open) = self.ring.get(code_group) else {
                return;
            };
            let seen = u16::try_from(open.originals_seen()).unwrap_or(0);
            // the true original_count may never be learned if this group's
            // recovery symbols never arrived before being overtaken; fall
            // back to what was actually seen, which undercounts loss for
            // this one group but never overcounts it
            let original_count = open.final_counts.map_or(seen, |(count, _)| count);
            (original_count, seen)
        };
        let (original_count, seen) = counts;

        if original_count > 0 {
            outcome.closed_groups.push((
                code_group,
                GroupObservation {
                    seen: u32::from(seen),
                    count: u32::from(original_count),
                },
            ));
        }
        *self.ring.get_mut(code_group) = GroupState::Done {
            original_count,
            seen,
        };
    }
}

fn depad(padded: &[u8]) -> Vec<u8> {
    use octs::Decode;
    let mut cursor: &[u8] = padded;
    OriginalPayload::decode(&mut cursor)
        .map(|p| p.data.to_vec())
        .unwrap_or_default()
}
