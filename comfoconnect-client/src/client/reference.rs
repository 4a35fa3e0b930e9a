//! Request reference numbering.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Deserialize;

/// How many bits the reference counter uses before wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum ReferenceWidth {
    Bits16,
    #[default]
    Bits32,
}

impl ReferenceWidth {
    pub fn max(self) -> u32 {
        match self {
            ReferenceWidth::Bits16 => u16::MAX as u32,
            ReferenceWidth::Bits32 => u32::MAX,
        }
    }
}

impl TryFrom<u8> for ReferenceWidth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(ReferenceWidth::Bits16),
            32 => Ok(ReferenceWidth::Bits32),
            other => Err(format!("reference width must be 16 or 32, got {}", other)),
        }
    }
}

/// Hands out request references: 1, 2, 3, ... wrapping back to 1.
#[derive(Debug)]
pub struct ReferenceCounter {
    next: AtomicU32,
    width: ReferenceWidth,
}

impl ReferenceCounter {
    pub fn new(width: ReferenceWidth) -> Self {
        Self::starting_at(1, width)
    }

    pub(crate) fn starting_at(first: u32, width: ReferenceWidth) -> Self {
        Self {
            next: AtomicU32::new(first.clamp(1, width.max())),
            width,
        }
    }

    pub fn next(&self) -> u32 {
        let max = self.width.max();
        // The closure always returns Some, so both arms carry the old value.
        match self.next.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
            Some(if cur >= max { 1 } else { cur + 1 })
        }) {
            Ok(cur) | Err(cur) => cur,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let refs = ReferenceCounter::new(ReferenceWidth::Bits32);
        assert_eq!(refs.next(), 1);
        assert_eq!(refs.next(), 2);
        assert_eq!(refs.next(), 3);
    }

    #[test]
    fn test_wraps_16_bit() {
        let refs = ReferenceCounter::starting_at(u16::MAX as u32 - 1, ReferenceWidth::Bits16);
        assert_eq!(refs.next(), 65534);
        assert_eq!(refs.next(), 65535);
        assert_eq!(refs.next(), 1);
    }

    #[test]
    fn test_wraps_32_bit_without_zero() {
        let refs = ReferenceCounter::starting_at(u32::MAX, ReferenceWidth::Bits32);
        assert_eq!(refs.next(), u32::MAX);
        assert_eq!(refs.next(), 1);
    }

    #[test]
    fn test_width_from_bits() {
        assert_eq!(ReferenceWidth::try_from(16), Ok(ReferenceWidth::Bits16));
        assert!(ReferenceWidth::try_from(8).is_err());
    }
}
