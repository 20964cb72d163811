//! Wrapping 8-bit identifiers used for code groups, and the signed-distance
//! arithmetic needed to compare them correctly across a wraparound.
//!
//! Same technique as a wrapping 16-bit sequence number, narrowed to `u8`
//! since code groups wrap at 256 per the wire format.

use std::{cmp::Ordering, convert::Infallible, fmt};

use derive_more::{Add, AddAssign, From, Sub, SubAssign};
use octs::{BufTooShortOr, Decode, Encode, FixedEncodeLen, Read, Write};

/// An 8-bit identifier for a code group, which wraps around at 256.
///
/// Direct `<`/`>` comparisons are unsound across a wraparound; use
/// [`GroupId::dist_to`] instead.
///
/// ```text
///     253    254    255     0      1
/// ... --|------|------|------|------|-- ...
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, From, Add, AddAssign, Sub, SubAssign)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupId(pub u8);

impl GroupId {
    /// Group id `0`.
    pub const ZERO: Self = Self(0);

    /// Creates a new group id from a raw byte.
    #[must_use]
    pub const fn new(n: u8) -> Self {
        Self(n)
    }

    /// Signed distance "elapsed" travelling from `self` to `rhs`, taking
    /// wraparound into account.
    ///
    /// This is `rhs - self`, performed in wrapping 8-bit arithmetic then
    /// reinterpreted as a signed value, so it always returns the smallest
    /// path around the 256-value ring.
    ///
    /// # Examples
    ///
    /// ```
    /// use fecshim::seq::GroupId;
    /// assert_eq!(GroupId::new(0).dist_to(GroupId::new(5)), 5);
    /// assert_eq!(GroupId::new(5).dist_to(GroupId::new(0)), -5);
    /// assert_eq!(GroupId::new(255).dist_to(GroupId::new(0)), 1);
    /// assert_eq!(GroupId::new(0).dist_to(GroupId::new(255)), -1);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // that's exactly what we want
    pub const fn dist_to(self, rhs: Self) -> i16 {
        (rhs.0.wrapping_sub(self.0) as i8) as i16
    }

    /// Returns `self + 1`, wrapping at 256.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl PartialOrd for GroupId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupId {
    /// Orders by signed distance from `self`, so this is only meaningful for
    /// group ids that are "close" to each other (within +/-128). This is a
    /// wraparound-aware ordering, not a plain numeric one.
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_to(*other).cmp(&0)
    }
}

impl FixedEncodeLen for GroupId {
    const ENCODE_LEN: usize = u8::ENCODE_LEN;
}

impl Encode for GroupId {
    type Error = Infallible;

    fn encode(&self, mut dst: impl Write) -> Result<(), BufTooShortOr<Self::Error>> {
        dst.write(&self.0)
    }
}

impl Decode for GroupId {
    type Error = Infallible;

    fn decode(mut src: impl Read) -> Result<Self, BufTooShortOr<Self::Error>> {
        Ok(Self(src.read()?))
    }
}

/// Identifies a single symbol (original or recovery) within a code group.
///
/// Values `0..original_count` are originals; values `>= original_count` are
/// recovery symbols.
pub type SymbolId = u16;
