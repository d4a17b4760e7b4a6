//! The fundamental unit of time in the emulator.

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// Master ticks per colour clock (one DMA bus cycle).
pub const TICKS_PER_CCK: i64 = 8;

/// Master ticks per 68000 clock.
pub const TICKS_PER_CPU: i64 = 4;

/// Master ticks per CIA E-clock.
pub const TICKS_PER_ECLOCK: i64 = 40;

/// A count of master clock ticks.
///
/// Used both for absolute points in time ("cycle 1234 since power-on") and
/// for durations. Signed, so the difference of two cycles is a cycle.
/// [`Cycle::NEVER`] marks "nothing pending" and sorts after every real cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cycle(pub i64);

impl Cycle {
    pub const ZERO: Self = Self(0);
    pub const NEVER: Self = Self(i64::MAX);

    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// `n` colour clocks.
    #[must_use]
    pub const fn cck(n: i64) -> Self {
        Self(n * TICKS_PER_CCK)
    }

    /// `n` CPU clocks.
    #[must_use]
    pub const fn cpu(n: i64) -> Self {
        Self(n * TICKS_PER_CPU)
    }

    /// `n` E-clocks.
    #[must_use]
    pub const fn eclock(n: i64) -> Self {
        Self(n * TICKS_PER_ECLOCK)
    }

    #[must_use]
    pub const fn is_never(self) -> bool {
        self.0 == i64::MAX
    }

    /// Whole colour clocks elapsed.
    #[must_use]
    pub const fn as_cck(self) -> i64 {
        self.0.div_euclid(TICKS_PER_CCK)
    }

    /// Round up to the next multiple of `step` ticks.
    #[must_use]
    pub const fn align_up(self, step: i64) -> Self {
        let rem = self.0.rem_euclid(step);
        if rem == 0 { self } else { Self(self.0 + (step - rem)) }
    }

    /// First colour clock boundary strictly after this cycle.
    #[must_use]
    pub const fn next_cck(self) -> Self {
        Self((self.as_cck() + 1) * TICKS_PER_CCK)
    }
}

// Arithmetic saturates so that NEVER + delta stays NEVER.
impl Add for Cycle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Cycle {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Cycle {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Cycle {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_sub(rhs.0);
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
