use std::{fmt, num::Wrapping};

/// 8-bit sequence number. All arithmetic wraps modulo 256.
///
/// There is no ordering: two numbers can only be compared by how far each
/// lies ahead of a common base, see [`Seq8::sub`] and [`Seq8::is_before`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct Seq8 {
    n: u8,
}

impl Seq8 {
    #[must_use]
    pub fn from_u8(n: u8) -> Self {
        Seq8 { n }
    }

    #[must_use]
    #[inline]
    pub fn to_u8(&self) -> u8 {
        self.n
    }

    #[must_use]
    pub fn zero() -> Self {
        Seq8::from_u8(0)
    }

    #[must_use]
    pub fn add_usize(&self, n: usize) -> Self {
        // only the low byte matters modulo 256
        let s = Wrapping(self.n) + Wrapping((n % 256) as u8);
        Seq8 { n: s.0 }
    }

    /// Distance from `other` forward to `self`, modulo 256.
    #[must_use]
    pub fn sub(&self, other: &Self) -> usize {
        let s = Wrapping(self.n) - Wrapping(other.n);
        s.0 as usize
    }

    /// Whether `self` lies strictly before `other`, both counted forward from
    /// `base`.
    #[must_use]
    pub fn is_before(&self, other: &Self, base: &Self) -> bool {
        self.sub(base) < other.sub(base)
    }

    pub fn increment(&mut self) {
        *self = self.add_usize(1);
    }
}

impl fmt::Display for Seq8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.n)
    }
}
