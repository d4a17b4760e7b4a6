//! Beam geometry.
//!
//! The beam position is not stored anywhere. It is a pure function of the
//! master cycle, which lets the scheduler turn "line 40, CCK $1C" into an
//! absolute cycle and back without asking Agnus.

use emu_core::{Cycle, TICKS_PER_CCK};

pub const CCKS_PER_LINE: u16 = 227;
pub const PAL_LINES_PER_FRAME: u16 = 312;
pub const NTSC_LINES_PER_FRAME: u16 = 262;
pub const PAL_CRYSTAL_HZ: u64 = 28_375_160;
pub const NTSC_CRYSTAL_HZ: u64 = 28_636_360;

/// Video region (affects timing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    /// PAL: 312 lines, 28.375160 MHz crystal.
    #[default]
    Pal,
    /// NTSC: 262 lines, 28.636360 MHz crystal.
    Ntsc,
}

impl Region {
    #[must_use]
    pub const fn crystal_hz(self) -> u64 {
        match self {
            Region::Pal => PAL_CRYSTAL_HZ,
            Region::Ntsc => NTSC_CRYSTAL_HZ,
        }
    }
}

/// A beam position within one frame. `h` counts colour clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Beam {
    pub v: u16,
    pub h: u16,
}

impl Beam {
    #[must_use]
    pub const fn new(v: u16, h: u16) -> Self {
        Self { v, h }
    }
}

/// Frame layout in colour clocks and lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BeamGeometry {
    pub ccks_per_line: u16,
    pub lines_per_frame: u16,
}

impl BeamGeometry {
    pub const PAL: Self = Self {
        ccks_per_line: CCKS_PER_LINE,
        lines_per_frame: PAL_LINES_PER_FRAME,
    };

    pub const NTSC: Self = Self {
        ccks_per_line: CCKS_PER_LINE,
        lines_per_frame: NTSC_LINES_PER_FRAME,
    };

    #[must_use]
    pub const fn for_region(region: Region) -> Self {
        match region {
            Region::Pal => Self::PAL,
            Region::Ntsc => Self::NTSC,
        }
    }

    #[must_use]
    pub const fn ticks_per_line(self) -> i64 {
        self.ccks_per_line as i64 * TICKS_PER_CCK
    }

    #[must_use]
    pub const fn ticks_per_frame(self) -> i64 {
        self.lines_per_frame as i64 * self.ticks_per_line()
    }

    #[must_use]
    pub const fn is_valid(self, beam: Beam) -> bool {
        beam.v < self.lines_per_frame && beam.h < self.ccks_per_line
    }

    /// Frames completed before `cycle`.
    #[must_use]
    pub const fn frame(self, cycle: Cycle) -> i64 {
        cycle.get().div_euclid(self.ticks_per_frame())
    }

    #[must_use]
    pub const fn beam(self, cycle: Cycle) -> Beam {
        let cck = cycle.as_cck();
        let cpl = self.ccks_per_line as i64;
        let line = cck.div_euclid(cpl);
        Beam {
            v: line.rem_euclid(self.lines_per_frame as i64) as u16,
            h: cck.rem_euclid(cpl) as u16,
        }
    }

    #[must_use]
    pub const fn frame_start(self, cycle: Cycle) -> Cycle {
        Cycle::new(self.frame(cycle) * self.ticks_per_frame())
    }

    #[must_use]
    pub const fn line_start(self, cycle: Cycle) -> Cycle {
        let tpl = self.ticks_per_line();
        Cycle::new(cycle.get().div_euclid(tpl) * tpl)
    }

    /// Start of the line after the one containing `cycle`.
    #[must_use]
    pub const fn next_line(self, cycle: Cycle) -> Cycle {
        Cycle::new(self.line_start(cycle).get() + self.ticks_per_line())
    }

    /// Start of the frame after the one containing `cycle`.
    #[must_use]
    pub const fn next_frame(self, cycle: Cycle) -> Cycle {
        Cycle::new(self.frame_start(cycle).get() + self.ticks_per_frame())
    }

    /// The cycle at which `beam` is reached in the frame containing `cycle`.
    #[must_use]
    pub const fn cycle_in_frame(self, cycle: Cycle, beam: Beam) -> Cycle {
        let offset = beam.v as i64 * self.ccks_per_line as i64 + beam.h as i64;
        Cycle::new(self.frame_start(cycle).get() + offset * TICKS_PER_CCK)
    }
}

impl Default for BeamGeometry {
    fn default() -> Self {
        Self::PAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pal_ticks_per_frame() {
        // 312 lines * 227 CCKs * 8 = 566,592
        assert_eq!(BeamGeometry::PAL.ticks_per_frame(), 566_592);
    }

    #[test]
    fn ntsc_ticks_per_frame() {
        // 262 lines * 227 CCKs * 8 = 475,792
        assert_eq!(BeamGeometry::NTSC.ticks_per_frame(), 475_792);
    }

    #[test]
    fn beam_follows_the_clock() {
        let geo = BeamGeometry::PAL;
        assert_eq!(geo.beam(Cycle::ZERO), Beam::new(0, 0));
        assert_eq!(geo.beam(Cycle::cck(226)), Beam::new(0, 226));
        assert_eq!(geo.beam(Cycle::cck(227)), Beam::new(1, 0));
        assert_eq!(geo.beam(Cycle::cck(227 * 312 + 5)), Beam::new(0, 5));
        assert_eq!(geo.frame(Cycle::cck(227 * 312 + 5)), 1);
    }

    #[test]
    fn beam_and_cycle_round_trip_within_a_frame() {
        let geo = BeamGeometry::PAL;
        let now = Cycle::new(3 * geo.ticks_per_frame() + 1234);
        let at = geo.cycle_in_frame(now, Beam::new(100, 0x40));
        assert_eq!(geo.beam(at), Beam::new(100, 0x40));
        assert_eq!(geo.frame(at), 3);
    }

    #[test]
    fn line_and_frame_boundaries() {
        let geo = BeamGeometry::PAL;
        let tpl = geo.ticks_per_line();
        assert_eq!(geo.next_line(Cycle::ZERO), Cycle::new(tpl));
        assert_eq!(geo.next_line(Cycle::new(tpl - 1)), Cycle::new(tpl));
        assert_eq!(geo.next_line(Cycle::new(tpl)), Cycle::new(2 * tpl));
        assert_eq!(geo.next_frame(Cycle::new(5)), Cycle::new(geo.ticks_per_frame()));
    }

    #[test]
    fn positions_outside_the_frame_are_invalid() {
        let geo = BeamGeometry::NTSC;
        assert!(geo.is_valid(Beam::new(261, 226)));
        assert!(!geo.is_valid(Beam::new(262, 0)));
        assert!(!geo.is_valid(Beam::new(0, 227)));
    }
}
