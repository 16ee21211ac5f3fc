use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Width of the word backing every state and flag field.
pub type Constant = u32;

/// A typed bit container over a single machine word. Addition sets bits,
/// subtraction clears them, and the `has_all`/`has_any` pair covers the
/// two membership tests the transition rules are written in.
///
/// The layout is deliberately public: bits in the low byte belong to the
/// engine, everything above is reserved for callers and passes through
/// the engine untouched.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct BitField {
    pub value: Constant,
}

impl BitField {
    #[inline]
    pub const fn new(value: Constant) -> BitField {
        BitField { value }
    }

    /// Tests if all the given bits are set.
    #[inline]
    pub fn has_all<B: Into<BitField>>(self, other: B) -> bool {
        let other = other.into().value;
        (self.value & other) == other
    }

    /// Tests if any of the given bits is set.
    #[inline]
    pub fn has_any<B: Into<BitField>>(self, other: B) -> bool {
        (self.value & other.into().value) != 0
    }
}

impl From<Constant> for BitField {
    #[inline]
    fn from(value: Constant) -> Self {
        BitField { value }
    }
}

impl From<BitField> for Constant {
    #[inline]
    fn from(field: BitField) -> Self {
        field.value
    }
}

/// Returns the field with the given bits set.
impl<B: Into<BitField>> Add<B> for BitField {
    type Output = BitField;

    #[inline]
    fn add(self, other: B) -> BitField {
        BitField::new(self.value | other.into().value)
    }
}

impl<B: Into<BitField>> AddAssign<B> for BitField {
    #[inline]
    fn add_assign(&mut self, other: B) {
        self.value |= other.into().value;
    }
}

/// Returns the field with the given bits cleared.
impl<B: Into<BitField>> Sub<B> for BitField {
    type Output = BitField;

    #[inline]
    fn sub(self, other: B) -> BitField {
        BitField::new(self.value & !other.into().value)
    }
}

impl<B: Into<BitField>> SubAssign<B> for BitField {
    #[inline]
    fn sub_assign(&mut self, other: B) {
        self.value &= !other.into().value;
    }
}

impl PartialEq<Constant> for BitField {
    #[inline]
    fn eq(&self, other: &Constant) -> bool {
        self.value == *other
    }
}

impl fmt::Debug for BitField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BitField({:#010b})", self.value)
    }
}
