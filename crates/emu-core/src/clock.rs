//! Master clock configuration.

use crate::Cycle;

/// Master clock configuration for a system.
///
/// Each system has a master crystal that drives all timing. Components may
/// run at divided rates, but everything derives from this frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterClock {
    /// Crystal frequency in Hz (e.g., `28_375_160` for a PAL Amiga).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Ticks per frame at the given frame rate (integer division).
    #[must_use]
    pub const fn ticks_per_frame(&self, frames_per_second: u64) -> Cycle {
        Cycle::new((self.frequency_hz / frames_per_second) as i64)
    }

    /// Ticks elapsing in `ms` milliseconds of emulated time.
    #[must_use]
    pub const fn millis(&self, ms: u64) -> Cycle {
        Cycle::new((self.frequency_hz * ms / 1000) as i64)
    }

    /// Ticks elapsing in `secs` seconds of emulated time, rounded down.
    #[must_use]
    pub fn seconds(&self, secs: f64) -> Cycle {
        Cycle::new((self.frequency_hz as f64 * secs) as i64)
    }
}
