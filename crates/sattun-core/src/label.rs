use std::fmt;

/// Mask keeping the 48 bits a label is made of.
const LABEL_MASK: u64 = (1 << 48) - 1;

/// A 6-byte identifier correlating the frames of one PDU.
///
/// Labels are generated by incrementing the previous one and wrap silently at 2^48.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PduLabel(u64);

impl PduLabel {
    /// Length of a label on the wire.
    pub const LENGTH: usize = 6;
    /// Label preceding the first one generated by a fresh counter.
    pub const ZERO: PduLabel = PduLabel(0);

    /// Creates a label from the low 48 bits of `value`.
    pub const fn new(value: u64) -> Self {
        Self(value & LABEL_MASK)
    }

    /// Returns the numeric value of the label.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the label following this one, wrapping after `2^48 - 1`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }

    /// Big-endian wire representation.
    pub fn to_bytes(self) -> [u8; Self::LENGTH] {
        let mut bytes = [0; Self::LENGTH];
        bytes.copy_from_slice(&self.0.to_be_bytes()[2..]);
        bytes
    }

    /// Reads a label from its big-endian wire representation.
    pub fn from_bytes(bytes: [u8; Self::LENGTH]) -> Self {
        let mut wide = [0; 8];
        wide[2..].copy_from_slice(&bytes);
        Self(u64::from_be_bytes(wide))
    }
}

impl fmt::Display for PduLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_generated_label_is_one() {
        assert_eq!(PduLabel::ZERO.next().value(), 1);
        assert_eq!(PduLabel::ZERO.next().to_bytes(), [0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_label_wraps_at_48_bits() {
        let last = PduLabel::new(LABEL_MASK);
        assert_eq!(last.next(), PduLabel::ZERO);
        assert_eq!(PduLabel::new(1 << 48), PduLabel::ZERO);
    }

    #[test]
    fn test_label_bytes_are_big_endian() {
        let label = PduLabel::new(0x0102_0304_0506);
        assert_eq!(label.to_bytes(), [1, 2, 3, 4, 5, 6]);
        assert_eq!(PduLabel::from_bytes([1, 2, 3, 4, 5, 6]), label);
        assert_eq!(label.to_string(), "010203040506");
    }
}
