//! Blitter - channel state machine.
//!
//! A blit is a sequence of words; each word is a short series of channel
//! accesses (A, B, C reads then the D write), one bus cycle apiece. The
//! chipset's blitter slot calls [`Blitter::step`] once per granted cycle.

use crate::ChipMemory;

const BLTCON0_USEA: u16 = 0x0800;
const BLTCON0_USEB: u16 = 0x0400;
const BLTCON0_USEC: u16 = 0x0200;
const BLTCON0_USED: u16 = 0x0100;
const BLTCON1_LINE: u16 = 0x0001;
const BLTCON1_DESC: u16 = 0x0002;
const BLTCON1_FCI: u16 = 0x0004;
const BLTCON1_IFE: u16 = 0x0008;
const BLTCON1_EFE: u16 = 0x0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum Channel {
    A,
    B,
    C,
    D,
    /// No channel enabled: the word still costs one internal cycle.
    Internal,
}

/// Outcome of one blitter cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitStep {
    Continue,
    Done,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Blitter {
    pub bltcon0: u16,
    pub bltcon1: u16,
    pub afwm: u16,
    pub alwm: u16,
    pub apt: u32,
    pub bpt: u32,
    pub cpt: u32,
    pub dpt: u32,
    pub amod: i16,
    pub bmod: i16,
    pub cmod: i16,
    pub dmod: i16,
    pub adat: u16,
    pub bdat: u16,
    pub cdat: u16,

    busy: bool,
    zero: bool,
    width: u16,
    height: u16,
    x: u16,
    y: u16,
    sequence: [Channel; 4],
    sequence_len: usize,
    phase: usize,
    a_prev: u16,
    b_prev: u16,
    fill_carry: bool,
}

impl Blitter {
    pub fn new() -> Self {
        Self {
            bltcon0: 0,
            bltcon1: 0,
            afwm: 0xFFFF,
            alwm: 0xFFFF,
            apt: 0,
            bpt: 0,
            cpt: 0,
            dpt: 0,
            amod: 0,
            bmod: 0,
            cmod: 0,
            dmod: 0,
            adat: 0,
            bdat: 0,
            cdat: 0,
            busy: false,
            zero: true,
            width: 0,
            height: 0,
            x: 0,
            y: 0,
            sequence: [Channel::Internal; 4],
            sequence_len: 1,
            phase: 0,
            a_prev: 0,
            b_prev: 0,
            fill_carry: false,
        }
    }

    /// BBUSY.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// BZERO: every D word of the last blit was zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.zero
    }

    /// Words left in the current blit (including the one in progress).
    #[must_use]
    pub fn words_remaining(&self) -> u32 {
        if !self.busy {
            return 0;
        }
        let done = u32::from(self.y) * u32::from(self.width) + u32::from(self.x);
        u32::from(self.width) * u32::from(self.height) - done
    }

    /// BLTSIZE write: latch the geometry and start.
    pub fn start(&mut self, bltsize: u16) {
        let width = bltsize & 0x003F;
        let height = (bltsize >> 6) & 0x03FF;
        self.width = if width == 0 { 64 } else { width };
        self.height = if height == 0 { 1024 } else { height };
        self.x = 0;
        self.y = 0;
        self.phase = 0;
        self.a_prev = 0;
        self.b_prev = 0;
        self.fill_carry = self.bltcon1 & BLTCON1_FCI != 0;
        self.zero = true;
        self.busy = true;

        if self.is_line_mode() {
            log::warn!("line mode blit: timing only, no pixels are drawn");
            self.width = 1;
            self.sequence = [Channel::Internal; 4];
            self.sequence_len = 1;
        } else {
            self.build_sequence();
        }

        log::debug!(
            "blit start {}x{} con0={:04X} con1={:04X}",
            self.width,
            self.height,
            self.bltcon0,
            self.bltcon1
        );
    }

    fn build_sequence(&mut self) {
        let mut len = 0;
        for (bit, channel) in [
            (BLTCON0_USEA, Channel::A),
            (BLTCON0_USEB, Channel::B),
            (BLTCON0_USEC, Channel::C),
            (BLTCON0_USED, Channel::D),
        ] {
            if self.bltcon0 & bit != 0 {
                self.sequence[len] = channel;
                len += 1;
            }
        }
        if len == 0 {
            self.sequence[0] = Channel::Internal;
            len = 1;
        }
        self.sequence_len = len;
    }

    fn is_line_mode(&self) -> bool {
        self.bltcon1 & BLTCON1_LINE != 0
    }

    fn descending(&self) -> bool {
        self.bltcon1 & BLTCON1_DESC != 0
    }

    /// The next cycle of the current word needs chip RAM.
    #[must_use]
    pub fn wants_bus(&self) -> bool {
        self.busy && self.sequence[self.phase] != Channel::Internal
    }

    /// Run one cycle: a channel access (or an internal cycle).
    pub fn step(&mut self, mem: &mut impl ChipMemory) -> BlitStep {
        if !self.busy {
            return BlitStep::Done;
        }

        let step: i32 = if self.descending() { -2 } else { 2 };
        match self.sequence[self.phase] {
            Channel::A => {
                self.adat = mem.read_word(self.apt);
                self.apt = self.apt.wrapping_add_signed(step);
            }
            Channel::B => {
                self.bdat = mem.read_word(self.bpt);
                self.bpt = self.bpt.wrapping_add_signed(step);
            }
            Channel::C => {
                self.cdat = mem.read_word(self.cpt);
                self.cpt = self.cpt.wrapping_add_signed(step);
            }
            Channel::D => {
                let d = self.compute_word();
                mem.write_word(self.dpt, d);
                self.dpt = self.dpt.wrapping_add_signed(step);
            }
            Channel::Internal => {
                if !self.is_line_mode() {
                    self.compute_word();
                }
            }
        }

        self.phase += 1;
        if self.phase < self.sequence_len {
            return BlitStep::Continue;
        }

        // D disabled: the word is still computed for BZERO.
        if self.bltcon0 & BLTCON0_USED == 0 && self.sequence[0] != Channel::Internal {
            self.compute_word();
        }
        self.phase = 0;
        self.end_word()
    }

    fn end_word(&mut self) -> BlitStep {
        self.x += 1;
        if self.x < self.width {
            return BlitStep::Continue;
        }

        self.x = 0;
        self.y += 1;
        self.apply_modulos();
        self.fill_carry = self.bltcon1 & BLTCON1_FCI != 0;
        if self.y < self.height {
            return BlitStep::Continue;
        }

        self.busy = false;
        log::debug!("blit done, zero={}", self.zero);
        BlitStep::Done
    }

    fn apply_modulos(&mut self) {
        let sign = if self.descending() { -1 } else { 1 };
        let uses = |bit: u16| self.bltcon0 & bit != 0;
        let (a, b, c, d) = (
            uses(BLTCON0_USEA),
            uses(BLTCON0_USEB),
            uses(BLTCON0_USEC),
            uses(BLTCON0_USED),
        );
        if a {
            self.apt = self.apt.wrapping_add_signed(sign * i32::from(self.amod));
        }
        if b {
            self.bpt = self.bpt.wrapping_add_signed(sign * i32::from(self.bmod));
        }
        if c {
            self.cpt = self.cpt.wrapping_add_signed(sign * i32::from(self.cmod));
        }
        if d {
            self.dpt = self.dpt.wrapping_add_signed(sign * i32::from(self.dmod));
        }
    }

    fn compute_word(&mut self) -> u16 {
        let first = self.x == 0;
        let last = self.x + 1 == self.width;

        let mut a = self.adat;
        if first {
            a &= self.afwm;
        }
        if last {
            a &= self.alwm;
        }

        let a_shift = u32::from(self.bltcon0 >> 12);
        let b_shift = u32::from(self.bltcon1 >> 12);
        let (a_out, b_out) = if self.descending() {
            (
                shift_descending(a, self.a_prev, a_shift),
                shift_descending(self.bdat, self.b_prev, b_shift),
            )
        } else {
            (
                shift_ascending(a, self.a_prev, a_shift),
                shift_ascending(self.bdat, self.b_prev, b_shift),
            )
        };
        self.a_prev = a;
        self.b_prev = self.bdat;

        let mut d = minterm(self.bltcon0 as u8, a_out, b_out, self.cdat);
        if self.descending() && self.bltcon1 & (BLTCON1_IFE | BLTCON1_EFE) != 0 {
            d = fill(d, &mut self.fill_carry, self.bltcon1 & BLTCON1_EFE != 0);
        }
        if d != 0 {
            self.zero = false;
        }
        d
    }

    /// Abort without completing (reset).
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}

fn shift_ascending(word: u16, prev: u16, shift: u32) -> u16 {
    (((u32::from(prev) << 16) | u32::from(word)) >> shift) as u16
}

fn shift_descending(word: u16, prev: u16, shift: u32) -> u16 {
    ((((u32::from(word) << 16) | u32::from(prev)) << shift) >> 16) as u16
}

/// Apply the logic function `lf` to A, B and C.
fn minterm(lf: u8, a: u16, b: u16, c: u16) -> u16 {
    let mut d = 0;
    for (bit, term) in [
        (0x80, a & b & c),
        (0x40, a & b & !c),
        (0x20, a & !b & c),
        (0x10, a & !b & !c),
        (0x08, !a & b & c),
        (0x04, !a & b & !c),
        (0x02, !a & !b & c),
        (0x01, !a & !b & !c),
    ] {
        if lf & bit != 0 {
            d |= term;
        }
    }
    d
}

/// Area fill, right to left within the word.
fn fill(word: u16, carry: &mut bool, exclusive: bool) -> u16 {
    let mut out = 0;
    for bit in 0..16 {
        let mask = 1u16 << bit;
        let edge = word & mask != 0;
        if exclusive {
            *carry ^= edge;
            if *carry {
                out |= mask;
            }
        } else {
            if edge || *carry {
                out |= mask;
            }
            *carry ^= edge;
        }
    }
    out
}
