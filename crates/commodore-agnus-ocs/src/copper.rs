//! Copper - Coprocessor for synchronized register updates.
//!
//! The copper does not tick. The chipset calls [`Copper::fetch`] from the
//! copper slot whenever the arbiter granted it the bus, and asks
//! [`Copper::wake_target`] where to sleep while a WAIT is pending.

use crate::beam::{Beam, BeamGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum State {
    #[default]
    Idle,
    Fetch1, // Fetch first word
    Fetch2, // Fetch second word
    Wait,   // Waiting for beam position
}

/// Outcome of one copper bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// First word fetched, or an instruction finished without side effects.
    Continue,
    /// MOVE completed: write `value` to custom register `reg`.
    Move { reg: u16, value: u16 },
    /// WAIT not yet satisfied.
    Wait,
    /// End-of-list marker; idle until the next restart.
    EndOfList,
    /// MOVE to a protected register.
    Halted { reg: u16 },
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Copper {
    pub state: State,
    pub cop1lc: u32,
    pub cop2lc: u32,
    pub pc: u32,
    pub ir1: u16,
    pub ir2: u16,
    pub danger: bool, // COPCON bit 1
}

impl Copper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restart_cop1(&mut self) {
        log::debug!("copper: restart at ${:06X}", self.cop1lc);
        self.pc = self.cop1lc;
        self.state = State::Fetch1;
    }

    pub fn restart_cop2(&mut self) {
        self.pc = self.cop2lc;
        self.state = State::Fetch1;
    }

    /// The copper wants the bus for an instruction fetch.
    #[must_use]
    pub fn wants_bus(&self) -> bool {
        matches!(self.state, State::Fetch1 | State::Fetch2)
    }

    /// Address of the next instruction word.
    #[must_use]
    pub fn fetch_address(&self) -> u32 {
        self.pc
    }

    /// Consume one instruction word read from `pc` during a granted cycle.
    pub fn fetch(&mut self, word: u16, beam: Beam) -> Step {
        match self.state {
            State::Fetch1 => {
                self.ir1 = word;
                self.pc = self.pc.wrapping_add(2);
                self.state = State::Fetch2;
                Step::Continue
            }
            State::Fetch2 => {
                self.ir2 = word;
                self.pc = self.pc.wrapping_add(2);
                self.execute(beam)
            }
            State::Idle | State::Wait => Step::Continue,
        }
    }

    fn execute(&mut self, beam: Beam) -> Step {
        if (self.ir1 & 1) == 0 {
            // MOVE
            let reg = self.ir1 & 0x01FE;
            if reg < 0x40 && !(self.danger && reg >= 0x20) {
                self.state = State::Idle;
                return Step::Halted { reg };
            }
            self.state = State::Fetch1;
            return Step::Move {
                reg,
                value: self.ir2,
            };
        }

        if self.is_end_of_list() {
            self.state = State::Idle;
            return Step::EndOfList;
        }

        let is_skip = (self.ir2 & 1) != 0;
        if is_skip {
            // SKIP: if beam position reached, skip next instruction
            if self.check_wait(beam) {
                self.pc = self.pc.wrapping_add(4);
            }
            self.state = State::Fetch1;
            Step::Continue
        } else if self.check_wait(beam) {
            self.state = State::Fetch1;
            Step::Continue
        } else {
            self.state = State::Wait;
            Step::Wait
        }
    }

    /// Re-check a pending WAIT. Returns `true` when the copper resumes.
    pub fn wake(&mut self, beam: Beam) -> bool {
        if self.state == State::Wait && self.check_wait(beam) {
            self.state = State::Fetch1;
            return true;
        }
        false
    }

    /// Earliest beam position in this frame that satisfies the pending WAIT,
    /// when it can be computed directly. `None` means "poll".
    ///
    /// Only fully-masked waits on lines below 256 are solved exactly; the
    /// comparator sees V7 wrap on later lines.
    #[must_use]
    pub fn wake_target(&self, now: Beam, geometry: BeamGeometry) -> Option<Beam> {
        if self.state != State::Wait || now.v > 0xFF {
            return None;
        }
        let mask_v = (self.ir2 >> 8) & 0x7F;
        let mask_h = (self.ir2 >> 1) & 0x7F;
        if mask_v != 0x7F || mask_h != 0x7F {
            return None;
        }

        let wait_v = (self.ir1 >> 8) & 0xFF;
        let wait_h = ((self.ir1 >> 1) & 0x7F) * 2;
        let target = if wait_h < geometry.ccks_per_line {
            Beam::new(wait_v, wait_h)
        } else {
            Beam::new(wait_v + 1, 0)
        };
        (target > now && geometry.is_valid(target)).then_some(target)
    }

    fn is_end_of_list(&self) -> bool {
        self.ir1 == 0xFFFF && self.ir2 == 0xFFFE
    }

    fn check_wait(&self, beam: Beam) -> bool {
        // End-of-list marker ($FFFF,$FFFE): never resolves.
        if self.is_end_of_list() {
            return false;
        }

        let wait_v = (self.ir1 >> 8) & 0xFF;
        let wait_h = (self.ir1 >> 1) & 0x7F;
        let mask_v = (self.ir2 >> 8) & 0x7F;
        let mask_h = (self.ir2 >> 1) & 0x7F;

        let cur_v = beam.v & 0xFF;
        let cur_h = (beam.h >> 1) & 0x7F;

        let cmp_cur = ((cur_v & mask_v) << 7) | (cur_h & mask_h);
        let cmp_wait = ((wait_v & mask_v) << 7) | (wait_h & mask_h);
        let result = cmp_cur >= cmp_wait;

        // V7 has no mask bit and is always compared. Without this, WAIT
        // VP=$F4 falsely triggers at line $74.
        if result && (wait_v & 0x80 != 0) && (cur_v & 0x80 == 0) {
            return false;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cop: &mut Copper, words: &[u16], beam: Beam) -> Vec<Step> {
        words.iter().map(|&w| cop.fetch(w, beam)).collect()
    }

    #[test]
    fn move_reports_register_and_value() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        let steps = run(&mut cop, &[0x0180, 0x0F00], Beam::new(0, 0));
        assert_eq!(
            steps,
            vec![Step::Continue, Step::Move { reg: 0x180, value: 0x0F00 }]
        );
        assert_eq!(cop.state, State::Fetch1);
        assert_eq!(cop.pc, 4);
    }

    #[test]
    fn skip_advances_pc_when_condition_met() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        // VP=0 HP=0, V mask $80 (so only V7 compares), SKIP bit set
        run(&mut cop, &[0x0001, 0x8001], Beam::new(100, 100));
        assert_eq!(cop.state, State::Fetch1);
        assert_eq!(cop.pc, 8); // Skipped one instruction (4 bytes)
    }

    #[test]
    fn skip_does_not_advance_when_condition_not_met() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        // SKIP waiting for vpos >= 200 - current beam at line 50
        run(&mut cop, &[0xC801, 0xFF01], Beam::new(50, 0));
        assert_eq!(cop.state, State::Fetch1);
        assert_eq!(cop.pc, 4);
    }

    #[test]
    fn unsatisfied_wait_sleeps_until_its_beam_position() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        // WAIT for line $40, CCK $30
        let steps = run(&mut cop, &[0x4031, 0xFFFE], Beam::new(10, 0));
        assert_eq!(steps[1], Step::Wait);
        assert!(!cop.wants_bus());

        let target = cop.wake_target(Beam::new(10, 0), BeamGeometry::PAL);
        assert_eq!(target, Some(Beam::new(0x40, 0x30)));

        assert!(!cop.wake(Beam::new(0x40, 0x2F)));
        assert!(cop.wake(Beam::new(0x40, 0x30)));
        assert!(cop.wants_bus());
    }

    #[test]
    fn partially_masked_wait_has_no_direct_target() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        run(&mut cop, &[0x4031, 0xFF80], Beam::new(10, 0)); // H mask 0x40
        assert_eq!(cop.state, State::Wait);
        assert_eq!(cop.wake_target(Beam::new(10, 0), BeamGeometry::PAL), None);
    }

    #[test]
    fn end_of_list_stops_the_copper() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        let steps = run(&mut cop, &[0xFFFF, 0xFFFE], Beam::new(300, 0));
        assert_eq!(steps[1], Step::EndOfList);
        assert_eq!(cop.state, State::Idle);
    }

    #[test]
    fn move_to_protected_register_halts_unless_danger_allows_it() {
        let mut cop = Copper::new();
        cop.restart_cop1();
        let steps = run(&mut cop, &[0x0024, 0x8000], Beam::new(0, 0)); // DSKLEN
        assert_eq!(steps[1], Step::Halted { reg: 0x024 });

        let mut cop = Copper::new();
        cop.danger = true;
        cop.restart_cop1();
        let steps = run(&mut cop, &[0x0024, 0x8000], Beam::new(0, 0));
        assert_eq!(steps[1], Step::Move { reg: 0x024, value: 0x8000 });

        cop.restart_cop1();
        let steps = run(&mut cop, &[0x0010, 0x0000], Beam::new(0, 0));
        assert_eq!(steps[1], Step::Halted { reg: 0x010 });
    }
}
