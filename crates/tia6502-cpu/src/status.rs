//! CPU status register (P) flags.
//!
//! ```text
//! 7  6  5  4  3  2  1  0
//! N  V  E  B  D  I  Z  C
//! │  │  │  │  │  │  │  └─ Carry
//! │  │  │  │  │  │  └──── Zero
//! │  │  │  │  │  └─────── Interrupt disable
//! │  │  │  │  └────────── Decimal mode
//! │  │  │  └───────────── Break (exists only in the pushed byte, see below)
//! │  │  └──────────────── "E" — unused, always 1
//! │  └─────────────────── Overflow
//! └────────────────────── Negative
//! ```
//!
//! `B` is not part of the CPU's architectural state: the real chip has no
//! flip-flop for it. It is synthesized when flags are pushed to the stack
//! (1 for PHP/BRK, 0 for an IRQ or NMI entry) and discarded on every pull.
//! [`Status`] still carries a `B` bit so the type can represent a byte taken
//! from or destined for the stack, but [`Status::to_stack_byte`] and
//! [`Status::from_stack_byte`] are the only places that should ever touch it.

use bitflags::bitflags;

bitflags! {
    /// CPU status register flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// Carry.
        const C = 1 << 0;
        /// Zero.
        const Z = 1 << 1;
        /// Interrupt disable.
        const I = 1 << 2;
        /// Decimal mode.
        const D = 1 << 3;
        /// Break — meaningful only on the pushed byte.
        const B = 1 << 4;
        /// Unused, always set. Never allowed to influence an ALU result.
        const E = 1 << 5;
        /// Overflow.
        const V = 1 << 6;
        /// Negative.
        const N = 1 << 7;
    }
}

impl Status {
    /// Flags immediately after power-on/reset: I and E set, everything else clear.
    pub const POWER_ON: Self = Self::I.union(Self::E);

    /// Mask of flags PLP/RTI are allowed to change. B and E are not among them.
    pub const PLP_MASK: Self = Self::C
        .union(Self::Z)
        .union(Self::I)
        .union(Self::D)
        .union(Self::V)
        .union(Self::N);

    /// Sets Z from `value == 0` and N from bit 7 of `value`.
    #[inline]
    pub fn set_zn(&mut self, value: u8) {
        self.set_flag(Self::Z, value == 0);
        self.set_flag(Self::N, value & 0x80 != 0);
    }

    /// Sets or clears a single flag.
    #[inline]
    pub fn set_flag(&mut self, flag: Self, set: bool) {
        if set {
            *self |= flag;
        } else {
            *self &= !flag;
        }
    }

    /// Produces the byte that PHP/BRK/an interrupt entry places on the stack.
    /// E is always 1; B is 1 only for a software-initiated push (PHP, BRK).
    #[inline]
    #[must_use]
    pub const fn to_stack_byte(self, software_push: bool) -> u8 {
        let mut value = (self.bits() & !Self::B.bits()) | Self::E.bits();
        if software_push {
            value |= Self::B.bits();
        }
        value
    }

    /// Reconstructs flags from a byte pulled off the stack (PLP, RTI). B is
    /// discarded — it was never a real bit — and E is forced high.
    #[inline]
    #[must_use]
    pub fn from_stack_byte(value: u8) -> Self {
        Self::from_bits_truncate((value & !Self::B.bits()) | Self::E.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_has_i_and_e() {
        let status = Status::POWER_ON;
        assert!(status.contains(Status::I));
        assert!(status.contains(Status::E));
        assert!(!status.contains(Status::C));
        assert!(!status.contains(Status::N));
    }

    #[test]
    fn set_zn_zero() {
        let mut status = Status::empty();
        status.set_zn(0);
        assert!(status.contains(Status::Z));
        assert!(!status.contains(Status::N));
    }

    #[test]
    fn set_zn_negative() {
        let mut status = Status::empty();
        status.set_zn(0x80);
        assert!(!status.contains(Status::Z));
        assert!(status.contains(Status::N));
    }

    #[test]
    fn to_stack_byte_php_sets_b_and_e() {
        let status = Status::C | Status::Z;
        let byte = status.to_stack_byte(true);
        assert_eq!(byte & Status::B.bits(), Status::B.bits());
        assert_eq!(byte & Status::E.bits(), Status::E.bits());
    }

    #[test]
    fn to_stack_byte_hardware_interrupt_clears_b() {
        let status = Status::C | Status::Z;
        let byte = status.to_stack_byte(false);
        assert_eq!(byte & Status::B.bits(), 0);
        assert_eq!(byte & Status::E.bits(), Status::E.bits());
    }

    #[test]
    fn from_stack_byte_discards_b_forces_e() {
        let status = Status::from_stack_byte(0xFF);
        assert!(!status.contains(Status::B));
        assert!(status.contains(Status::E));
        assert!(status.contains(Status::C));
        assert!(status.contains(Status::N));
    }

    #[test]
    fn from_stack_byte_forces_e_even_if_clear() {
        let status = Status::from_stack_byte(0x00);
        assert!(status.contains(Status::E));
        assert!(!status.contains(Status::B));
    }

    #[test]
    fn plp_mask_excludes_b_and_e() {
        assert!(!Status::PLP_MASK.contains(Status::B));
        assert!(!Status::PLP_MASK.contains(Status::E));
        assert!(Status::PLP_MASK.contains(Status::N));
        assert!(Status::PLP_MASK.contains(Status::C));
    }
}
