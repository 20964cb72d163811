//! The public facade tying every sub-component together. See [`Endpoint`].

use octs::{Decode, Encode, FixedEncodeLenHint};
use web_time::Instant;

use crate::{
    cipher::{CipherEnvelope, SKEY_BYTES},
    config::{ConfigError, Settings},
    decoder::Decoder,
    delay::DelayEstimator,
    encoder::{self, Encoder, OutgoingSymbol, PayloadTooLarge},
    loss::LossEstimator,
    oob::PongScheduler,
    pool::BufferPool,
    redundancy::plan_recovery_count,
    stats::Stats,
    wire::{type_byte, Pong, Symbol, SymbolHeader},
};

/// A [`Endpoint::send`] call was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// See [`PayloadTooLarge`].
    #[error(transparent)]
    TooLarge(#[from] PayloadTooLarge),
}

/// A [`Endpoint::send_oob`] call was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendOobError {
    /// The payload's type byte fell in the range reserved by the core.
    #[error("oob payload type byte {0:#04x} is reserved")]
    ReservedTypeByte(u8),
    /// The payload was empty, so it had no type byte.
    #[error("oob payload must carry at least one type byte")]
    Empty,
}

/// The caller-facing engine: every public method runs on the calling thread,
/// synchronously, calling back into the configured [`Interface`](crate::Interface)
/// as needed.
pub struct Endpoint {
    settings: Settings,
    cipher: CipherEnvelope,
    encoder: Encoder,
    decoder: Decoder,
    /// Our own measured inbound loss, reported to the peer via pongs.
    local_loss: LossEstimator,
    /// The peer's most recently reported loss, used to plan our outbound
    /// redundancy. Defaults to our configured floor until a pong arrives.
    remote_loss: f64,
    delay: DelayEstimator,
    pongs: PongScheduler,
    stats: Stats,
    pool: BufferPool,
}

impl Endpoint {
    /// One-shot setup: derives both direction keys and initializes every
    /// sub-component.
    pub fn initialize(
        shared_secret: &[u8; SKEY_BYTES],
        settings: Settings,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let cipher = CipherEnvelope::new(shared_secret, settings.initiator)?;

        let min_delay = settings.min_delay;
        let min_loss = settings.min_loss;
        let max_delay = settings.max_delay;

        Ok(Self {
            encoder: Encoder::new(min_delay, now),
            decoder: Decoder::new(),
            local_loss: LossEstimator::new(min_loss),
            remote_loss: min_loss,
            delay: DelayEstimator::new(min_delay, max_delay),
            pongs: PongScheduler::new(),
            stats: Stats::default(),
            pool: BufferPool::new(),
            cipher,
            settings,
        })
    }

    /// Current running counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    fn max_symbol_payload(&self) -> usize {
        let header_len = SymbolHeader::MAX_ENCODE_LEN;
        self.settings
            .max_data_size
            .saturating_sub(crate::cipher::CIPHER_OVERHEAD)
            .saturating_sub(header_len)
    }

    /// Appends `payload` to the current code group and emits it immediately
    /// as an original symbol.
    pub fn send(&mut self, payload: &[u8], now: Instant) -> Result<(), SendError> {
        let max_symbol_payload = self.max_symbol_payload();
        let (symbol, should_close) = self.encoder.send(payload, max_symbol_payload)?;
        self.emit_symbol(&symbol);
        if should_close {
            self.close_current_group(now);
        }
        Ok(())
    }

    /// Sends an application-opaque out-of-band message. `payload[0]` is the
    /// caller's type code and must be `>= 0x10`.
    pub fn send_oob(&mut self, payload: &[u8]) -> Result<(), SendOobError> {
        let &type_byte = payload.first().ok_or(SendOobError::Empty)?;
        if type_byte < type_byte::OOB_BASE {
            return Err(SendOobError::ReservedTypeByte(type_byte));
        }
        let envelope = self.cipher.seal(payload);
        self.settings.interface.send_data(&envelope);
        Ok(())
    }

    /// Drives timer-based decisions: swap-timer checks, recovery pacing, and
    /// the pong scheduler.
    pub fn tick(&mut self, now: Instant) {
        self.encoder.set_swap_interval(self.delay.get());

        if self.encoder.should_close_by_time(now) {
            self.close_current_group(now);
        }

        while let Some(symbol) = self.encoder.due_recovery_symbol(now) {
            self.emit_symbol(&symbol);
        }

        if let Some(pong) = self.pongs.due_pong(now, self.delay.get()) {
            self.emit_pong(&pong);
        }
    }

    /// Authenticates and processes an inbound datagram. Failures are
    /// dropped silently, as required by the envelope's failure semantics.
    pub fn recv(&mut self, packet: &[u8], now: Instant) {
        let plaintext = match self.cipher.open(packet) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::debug!(?err, "dropping packet");
                self.stats.packets_dropped += 1;
                return;
            }
        };
        self.dispatch(&plaintext, now);
    }

    /// Releases resources held by this endpoint. Safe to call more than
    /// once.
    pub fn finalize(&mut self) {
        // no background resources outside `Drop`-managed memory in the
        // inline (non-`worker`) configuration
    }

    fn dispatch(&mut self, plaintext: &[u8], now: Instant) {
        let Some(&type_byte) = plaintext.first() else {
            return;
        };

        match type_byte {
            type_byte::ORIGINAL | type_byte::RECOVERY => self.dispatch_symbol(plaintext),
            type_byte::PONG => self.dispatch_pong(plaintext, now),
            b if b < type_byte::OOB_BASE => {
                tracing::debug!(type_byte = b, "dropping reserved type byte");
            }
            _ => self.settings.interface.on_oob(plaintext),
        }
    }

    fn dispatch_symbol(&mut self, plaintext: &[u8]) {
        let mut cursor: &[u8] = plaintext;
        let Ok(symbol) = Symbol::decode(&mut cursor) else {
            tracing::debug!("dropping malformed symbol");
            return;
        };
        self.stats.packets_received += 1;

        let Ok(outcome) = self
            .decoder
            .receive(symbol.header, symbol.payload.to_vec())
        else {
            tracing::debug!("dropping symbol with inconsistent group parameters");
            return;
        };

        for delivery in outcome.deliveries {
            if delivery.recovered {
                self.stats.originals_recovered += 1;
            } else {
                self.stats.originals_delivered += 1;
            }
            self.settings.interface.on_packet(&delivery.payload);
        }

        for (code_group, observation) in outcome.closed_groups {
            self.stats.groups_closed_rx += 1;
            if observation.seen < observation.count {
                self.stats.originals_lost += u64::from(observation.count - observation.seen);
            }
            self.local_loss.observe(observation);
            self.pongs.observe(code_group, observation);
        }
    }

    fn dispatch_pong(&mut self, plaintext: &[u8], now: Instant) {
        let mut cursor: &[u8] = plaintext;
        let Ok(pong) = Pong::decode(&mut cursor) else {
            tracing::debug!("dropping malformed pong");
            return;
        };
        self.stats.pongs_received += 1;

        if pong.count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let remote_loss = 1.0 - (f64::from(pong.seen) / f64::from(pong.count));
            self.remote_loss = remote_loss.max(self.settings.min_loss);
        }

        if let Some(closed_at) = self.encoder.group_closed_at(pong.code_group) {
            let rtt = now.saturating_duration_since(closed_at);
            self.delay.update(rtt);
        }
    }

    fn close_current_group(&mut self, now: Instant) {
        let closed = self.encoder.close(now);
        self.stats.groups_closed_tx += 1;

        let original_count = match u16::try_from(closed.originals.len()) {
            Ok(count) => count,
            Err(_) => return,
        };
        if original_count == 0 {
            return;
        }

        let recovery_count =
            plan_recovery_count(self.remote_loss, original_count, self.settings.target_loss);

        let Ok((_, recovery)) = encoder::pad_and_encode(&closed.originals, recovery_count) else {
            return;
        };

        self.encoder
            .install_recovery(closed.code_group, original_count, recovery, now);
    }

    fn emit_symbol(&mut self, symbol: &OutgoingSymbol) {
        let wire_symbol = Symbol {
            header: symbol.header,
            payload: symbol.payload.clone().into(),
        };
        let mut plaintext = self.pool.take();
        let encoded = wire_symbol.encode(&mut plaintext).is_ok();
        if encoded {
            let envelope = self.cipher.seal(&plaintext);
            self.settings.interface.send_data(&envelope);
            self.stats.packets_sent += 1;
        }
        self.pool.give(plaintext);
    }

    fn emit_pong(&mut self, pong: &Pong) {
        let mut plaintext = self.pool.take();
        let encoded = pong.encode(&mut plaintext).is_ok();
        if encoded {
            let envelope = self.cipher.seal(&plaintext);
            self.settings.interface.send_data(&envelope);
            self.stats.pongs_sent += 1;
        }
        self.pool.give(plaintext);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.finalize();
    }
}
