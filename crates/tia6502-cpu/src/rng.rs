//! Config/RNG collaborator (C9).
//!
//! Supplied optionally to [`crate::Cpu::reset`] to scramble the register
//! file the way real silicon powers up in an unpredictable state. Hosts
//! that want deterministic "uninitialized memory" tests implement this
//! trait over their own generator (for instance, wrapping `rand::Rng`);
//! when no collaborator is supplied, reset zeroes the registers instead.

/// A source of bounded random integers used only at reset.
pub trait Rng {
    /// Returns a value in `[0, upper]` inclusive.
    fn int(&mut self, upper: u32) -> u32;
}
