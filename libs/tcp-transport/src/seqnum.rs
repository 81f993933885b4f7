use std::fmt;
use std::ops::Add;

/// A position in the 32-bit wrapping TCP sequence space.
///
/// A connection anchors the space at its ISN (the `zero_point`); [`SeqNum::wrap`]
/// and [`SeqNum::unwrap`] convert between this space and 64-bit absolute
/// positions, which never wrap within a connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNum(u32);

const SPAN: u64 = 1 << 32;

impl SeqNum {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Samples a random initial sequence number.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Maps an absolute position onto the wrapping space anchored at `zero_point`.
    pub fn wrap(n: u64, zero_point: SeqNum) -> Self {
        zero_point + n as u32
    }

    /// Maps this value back to the absolute position closest to `checkpoint`.
    ///
    /// Of the infinitely many absolute positions sharing these low 32 bits, the
    /// one with minimal distance to `checkpoint` is returned; candidates outside
    /// the u64 range are never chosen.
    pub fn unwrap(self, zero_point: SeqNum, checkpoint: u64) -> u64 {
        let offset = u64::from(self.0.wrapping_sub(zero_point.0));
        let checkpoint_low = checkpoint & (SPAN - 1);
        let candidate = (checkpoint & !(SPAN - 1)) | offset;

        if candidate >= SPAN && offset > checkpoint_low && offset - checkpoint_low > SPAN / 2 {
            return candidate - SPAN;
        }

        if candidate < u64::MAX - (SPAN - 1)
            && checkpoint_low > offset
            && checkpoint_low - offset > SPAN / 2
        {
            return candidate + SPAN;
        }

        candidate
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl Add<u32> for SeqNum {
    type Output = SeqNum;

    fn add(self, rhs: u32) -> Self::Output {
        SeqNum(self.0.wrapping_add(rhs))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
