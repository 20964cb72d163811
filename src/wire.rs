//! Plaintext wire format carried inside the [cipher envelope](crate::cipher).
//!
//! Layout, as read top-to-bottom by [`PacketKind::decode`]:
//!
//! ```text
//! DataHeader = type:u8 | code_group:u8 | symbol_id:VarInt<u16> | original_count:VarInt<u16> | recovery_count:VarInt<u16> | payload_len:VarInt<u16> | payload
//! PongHeader = type:u8 | code_group:u8 | seen:VarInt<u32> | count:VarInt<u32> | rtt_ms:VarInt<u32>
//! OobHeader  = type:u8 | payload
//! ```

use std::convert::Infallible;

use octs::{BufTooShortOr, Bytes, Decode, Encode, EncodeLen, FixedEncodeLenHint, Read, VarInt, Write};

use crate::seq::{GroupId, SymbolId};

/// Type byte discriminating the payload following it.
///
/// `0x00..=0x02` are reserved by this crate (original, recovery, pong).
/// `0x03..=0x0F` are reserved for future core use and dropped if seen.
/// `0x10..=0xFF` are free for application-defined OOB messages.
pub mod type_byte {
    /// An [original symbol](crate::wire::SymbolHeader).
    pub const ORIGINAL: u8 = 0x00;
    /// A [recovery symbol](crate::wire::SymbolHeader).
    pub const RECOVERY: u8 = 0x01;
    /// A [`Pong`](crate::wire::Pong).
    pub const PONG: u8 = 0x02;
    /// First type byte value reserved for future core use.
    pub const RESERVED_BASE: u8 = 0x03;
    /// First type byte value available to application OOB messages.
    pub const OOB_BASE: u8 = 0x10;
}

/// Header shared by original and recovery symbols.
///
/// Whether `symbol_id < original_count` determines if this is an original or
/// a recovery symbol; see [`type_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct SymbolHeader {
    /// Code group this symbol belongs to.
    pub code_group: GroupId,
    /// Index of this symbol within the group.
    pub symbol_id: SymbolId,
    /// Number of original symbols in the group, as known by the sender at the
    /// time this symbol was emitted.
    pub original_count: u16,
    /// Number of recovery symbols planned for the group, as known by the
    /// sender at the time this symbol was emitted.
    pub recovery_count: u16,
}

impl SymbolHeader {
    /// Whether this header describes an original (as opposed to recovery)
    /// symbol.
    #[must_use]
    pub const fn is_original(&self) -> bool {
        self.symbol_id < self.original_count
    }
}

impl FixedEncodeLenHint for SymbolHeader {
    const MIN_ENCODE_LEN: usize = 1 + GroupId::ENCODE_LEN + 3 * VarInt::<u16>::MIN_ENCODE_LEN;
    const MAX_ENCODE_LEN: usize = 1 + GroupId::ENCODE_LEN + 3 * VarInt::<u16>::MAX_ENCODE_LEN;
}

impl EncodeLen for SymbolHeader {
    fn encode_len(&self) -> usize {
        1 + GroupId::ENCODE_LEN
            + VarInt(self.symbol_id).encode_len()
            + VarInt(self.original_count).encode_len()
            + VarInt(self.recovery_count).encode_len()
    }
}

impl Encode for SymbolHeader {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        let type_byte = if self.is_original() {
            type_byte::ORIGINAL
        } else {
            type_byte::RECOVERY
        };
        dst.write(&type_byte)?;
        dst.write(&self.code_group)?;
        dst.write(&VarInt(self.symbol_id))?;
        dst.write(&VarInt(self.original_count))?;
        dst.write(&VarInt(self.recovery_count))?;
        Ok(())
    }
}

/// Failed to decode a [`SymbolHeader`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed symbol header")]
pub struct SymbolHeaderDecodeError;

impl Decode for SymbolHeader {
    type Error = SymbolHeaderDecodeError;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        // the type byte only distinguishes original vs recovery, which is
        // redundant with symbol_id < original_count; consume and discard it
        let _type_byte: u8 = src.read().map_err(|e| e.map_or(SymbolHeaderDecodeError))?;
        Ok(Self {
            code_group: src.read().map_err(|e| e.map_or(SymbolHeaderDecodeError))?,
            symbol_id: src
                .read::<VarInt<u16>>()
                .map_err(|e| e.map_or(SymbolHeaderDecodeError))?
                .0,
            original_count: src
                .read::<VarInt<u16>>()
                .map_err(|e| e.map_or(SymbolHeaderDecodeError))?
                .0,
            recovery_count: src
                .read::<VarInt<u16>>()
                .map_err(|e| e.map_or(SymbolHeaderDecodeError))?
                .0,
        })
    }
}

/// A full symbol: [`SymbolHeader`] plus its length-prefixed, padded payload.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Metadata.
    pub header: SymbolHeader,
    /// The symbol's padded payload, `L` bytes long, shared uniformly across
    /// every symbol in the group.
    pub payload: Bytes,
}

impl EncodeLen for Symbol {
    fn encode_len(&self) -> usize {
        self.header.encode_len() + self.payload.len()
    }
}

impl Encode for Symbol {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&self.header)?;
        dst.write_from(self.payload.clone())?;
        Ok(())
    }
}

/// Failed to decode a [`Symbol`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SymbolDecodeError {
    /// See [`SymbolHeaderDecodeError`].
    #[error(transparent)]
    Header(#[from] SymbolHeaderDecodeError),
}

impl Decode for Symbol {
    type Error = SymbolDecodeError;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        let header = src
            .read::<SymbolHeader>()
            .map_err(|e| e.map_or(SymbolDecodeError::Header))?;
        // everything remaining in this packet is the padded payload: a
        // symbol is always the last thing in a packet, there is no trailer
        let payload = src.read_remaining();
        Ok(Self { header, payload })
    }
}

/// An application payload before padding, carrying its own length so the
/// decoder can strip padding added to bring it up to the group's symbol
/// length `L`.
#[derive(Debug, Clone)]
pub struct OriginalPayload {
    /// Raw application bytes, as given to [`Endpoint::send`](crate::Endpoint::send).
    pub data: Bytes,
}

impl EncodeLen for OriginalPayload {
    fn encode_len(&self) -> usize {
        VarInt(self.data.len()).encode_len() + self.data.len()
    }
}

impl Encode for OriginalPayload {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&VarInt(self.data.len()))?;
        dst.write_from(self.data.clone())?;
        Ok(())
    }
}

/// Failed to decode an [`OriginalPayload`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("length prefix exceeds padded symbol length")]
pub struct OriginalPayloadDecodeError;

impl Decode for OriginalPayload {
    type Error = OriginalPayloadDecodeError;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        let len = src
            .read::<VarInt<usize>>()
            .map_err(|e| e.map_or(OriginalPayloadDecodeError))?
            .0;
        let data = src
            .read_next(len)
            .map_err(|e| e.map_or(OriginalPayloadDecodeError))?;
        Ok(Self { data })
    }
}

/// An OOB telemetry message acknowledging a closed code group.
///
/// See [`crate::oob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Pong {
    /// The group being acknowledged.
    pub code_group: GroupId,
    /// How many distinct originals the receiver actually saw for that group.
    pub seen: u32,
    /// How many originals the group was supposed to contain.
    pub count: u32,
    /// The receiver's measured RTT-or-delay, in milliseconds.
    pub rtt_ms: u32,
}

impl FixedEncodeLenHint for Pong {
    const MIN_ENCODE_LEN: usize = 1 + GroupId::ENCODE_LEN + 3 * VarInt::<u32>::MIN_ENCODE_LEN;
    const MAX_ENCODE_LEN: usize = 1 + GroupId::ENCODE_LEN + 3 * VarInt::<u32>::MAX_ENCODE_LEN;
}

impl EncodeLen for Pong {
    fn encode_len(&self) -> usize {
        1 + GroupId::ENCODE_LEN
            + VarInt(self.seen).encode_len()
            + VarInt(self.count).encode_len()
            + VarInt(self.rtt_ms).encode_len()
    }
}

impl Encode for Pong {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&type_byte::PONG)?;
        dst.write(&self.code_group)?;
        dst.write(&VarInt(self.seen))?;
        dst.write(&VarInt(self.count))?;
        dst.write(&VarInt(self.rtt_ms))?;
        Ok(())
    }
}

/// Failed to decode a [`Pong`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed pong")]
pub struct PongDecodeError;

impl Decode for Pong {
    type Error = PongDecodeError;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        let _type_byte: u8 = src.read().map_err(|e| e.map_or(PongDecodeError))?;
        Ok(Self {
            code_group: src.read().map_err(|e| e.map_or(PongDecodeError))?,
            seen: src
                .read::<VarInt<u32>>()
                .map_err(|e| e.map_or(PongDecodeError))?
                .0,
            count: src
                .read::<VarInt<u32>>()
                .map_err(|e| e.map_or(PongDecodeError))?
                .0,
            rtt_ms: src
                .read::<VarInt<u32>>()
                .map_err(|e| e.map_or(PongDecodeError))?
                .0,
        })
    }
}
