//! General-purpose register model and register-pair constraints.

use thiserror::Error;

/// Number of general-purpose registers (`R0`..`R5`).
pub const REGISTER_COUNT: u8 = 6;

/// A general-purpose register index in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Register(u8);

impl Register {
    /// Creates a register from its index, rejecting anything past `R5`.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < REGISTER_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Returns the register index (`0..=5`).
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Register constraint violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterError {
    /// Register index past `R5`.
    #[error("invalid register R{0}")]
    InvalidIndex(u8),
    /// Pair is not one of the consecutive even/odd pairs.
    #[error("invalid register pair R{0}:R{1}")]
    InvalidPair(u8, u8),
}

/// Validates a register pair.
///
/// Legal pairs are the consecutive even/odd pairs `R0:R1`, `R2:R3` and
/// `R4:R5`; the pair is identified in the register byte by its even half.
///
/// # Errors
///
/// Returns `RegisterError::InvalidPair` for any other combination.
pub const fn validate_pair(lo: Register, hi: Register) -> Result<(), RegisterError> {
    if lo.index() % 2 == 0 && hi.index() == lo.index() + 1 {
        Ok(())
    } else {
        Err(RegisterError::InvalidPair(lo.index(), hi.index()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{validate_pair, Register, RegisterError, REGISTER_COUNT};

    #[test]
    fn new_accepts_only_machine_registers() {
        for index in 0..REGISTER_COUNT {
            assert_eq!(Register::new(index).map(Register::index), Some(index));
        }
        assert_eq!(Register::new(6), None);
        assert_eq!(Register::new(255), None);
    }

    #[test]
    fn display_uses_assembly_spelling() {
        let reg = Register::new(3).unwrap();
        assert_eq!(reg.to_string(), "R3");
    }

    #[rstest]
    #[case(0, 1)]
    #[case(2, 3)]
    #[case(4, 5)]
    fn consecutive_even_odd_pairs_are_legal(#[case] lo: u8, #[case] hi: u8) {
        let lo = Register::new(lo).unwrap();
        let hi = Register::new(hi).unwrap();
        assert_eq!(validate_pair(lo, hi), Ok(()));
    }

    #[rstest]
    #[case(1, 2)]
    #[case(3, 4)]
    #[case(0, 2)]
    #[case(1, 0)]
    #[case(5, 4)]
    #[case(2, 2)]
    fn other_pairings_are_rejected(#[case] lo: u8, #[case] hi: u8) {
        let lo_reg = Register::new(lo).unwrap();
        let hi_reg = Register::new(hi).unwrap();
        assert_eq!(
            validate_pair(lo_reg, hi_reg),
            Err(RegisterError::InvalidPair(lo, hi))
        );
    }
}
