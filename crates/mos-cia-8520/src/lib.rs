//! MOS 8520 Complex Interface Adapter (CIA).
//!
//! The 8520 is a general-purpose I/O and timer chip used in the Amiga (two
//! instances: CIA-A and CIA-B). It provides two 8-bit I/O ports, two 16-bit
//! countdown timers, a 24-bit time-of-day counter, a serial shift register,
//! and an interrupt controller.
//!
//! The chip does not own a clock. [`Cia8520::tick`] advances the timers by
//! one E-clock and is only needed while [`Cia8520::is_active`] holds;
//! [`Cia8520::tod_pulse`] is driven by the VSYNC/HSYNC input.

mod tod;

use core::fmt;

use emu_core::{Component, InfoCell, Observable, Value};

pub use tod::{Tod, TodInfo};

pub const ICR_TA: u8 = 0x01;
pub const ICR_TB: u8 = 0x02;
pub const ICR_ALARM: u8 = 0x04;
pub const ICR_SP: u8 = 0x08;
pub const ICR_FLG: u8 = 0x10;

const CRB_ALARM: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CiaInfo {
    pub pra: u8,
    pub prb: u8,
    pub ddra: u8,
    pub ddrb: u8,
    pub timer_a: u16,
    pub latch_a: u16,
    pub running_a: bool,
    pub timer_b: u16,
    pub latch_b: u16,
    pub running_b: bool,
    pub cra: u8,
    pub crb: u8,
    pub icr: u8,
    pub imr: u8,
    pub sdr: u8,
    pub irq: bool,
    pub tod: TodInfo,
}

/// MOS 8520 Complex Interface Adapter.
#[derive(Debug, Clone)]
pub struct Cia8520 {
    label: &'static str,
    port_a: u8,
    port_b: u8,
    ddr_a: u8,
    ddr_b: u8,
    pub external_a: u8,
    pub external_b: u8,

    timer_a: u16,
    timer_a_latch: u16,
    timer_a_running: bool,
    timer_a_oneshot: bool,
    timer_a_force_load: bool,

    timer_b: u16,
    timer_b_latch: u16,
    timer_b_running: bool,
    timer_b_oneshot: bool,
    timer_b_force_load: bool,

    icr_status: u8,
    icr_mask: u8,

    cra: u8,
    crb: u8,

    sdr: u8,
    tod: Tod,
    published: InfoCell<CiaInfo>,
}

impl Cia8520 {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            port_a: 0xFF,
            port_b: 0xFF,
            ddr_a: 0,
            ddr_b: 0,
            external_a: 0xFF,
            external_b: 0xFF,
            timer_a: 0xFFFF,
            timer_a_latch: 0xFFFF,
            timer_a_running: false,
            timer_a_oneshot: false,
            timer_a_force_load: false,
            timer_b: 0xFFFF,
            timer_b_latch: 0xFFFF,
            timer_b_running: false,
            timer_b_oneshot: false,
            timer_b_force_load: false,
            icr_status: 0,
            icr_mask: 0,
            cra: 0,
            crb: 0,
            sdr: 0,
            tod: Tod::new(),
            published: InfoCell::default(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// A timer is counting or a force load is pending, so the chip needs
    /// E-clock ticks.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.timer_a_running
            || self.timer_b_running
            || self.timer_a_force_load
            || self.timer_b_force_load
    }

    /// Advance the timers by one E-clock.
    pub fn tick(&mut self) {
        let mut timer_a_underflow = false;

        if self.timer_a_force_load {
            self.timer_a = self.timer_a_latch;
            self.timer_a_force_load = false;
        }

        if self.timer_a_running && (self.cra & 0x20 == 0) {
            if self.timer_a == 0 {
                self.icr_status |= ICR_TA;
                timer_a_underflow = true;
                self.timer_a = self.timer_a_latch;
                if self.timer_a_oneshot {
                    self.timer_a_running = false;
                    self.cra &= !0x01;
                }
            } else {
                self.timer_a -= 1;
            }
        }

        if self.timer_b_force_load {
            self.timer_b = self.timer_b_latch;
            self.timer_b_force_load = false;
        }

        if self.timer_b_running {
            let timer_b_source = (self.crb >> 5) & 0x03;
            let timer_b_should_count = match timer_b_source {
                0x00 => true,
                0x02 | 0x03 => timer_a_underflow,
                _ => false,
            };

            if timer_b_should_count {
                if self.timer_b == 0 {
                    self.icr_status |= ICR_TB;
                    self.timer_b = self.timer_b_latch;
                    if self.timer_b_oneshot {
                        self.timer_b_running = false;
                        self.crb &= !0x01;
                    }
                } else {
                    self.timer_b -= 1;
                }
            }
        }
    }

    /// One pulse on the TOD input.
    pub fn tod_pulse(&mut self) {
        if self.tod.increment() {
            log::trace!("{}: TOD alarm at {}", self.label, self.tod);
            self.icr_status |= ICR_ALARM;
        }
    }

    /// Falling edge on the /FLAG input.
    pub fn flag_edge(&mut self) {
        self.icr_status |= ICR_FLG;
    }

    /// The /IRQ output is asserted.
    #[must_use]
    pub fn irq_active(&self) -> bool {
        (self.icr_status & self.icr_mask & 0x1F) != 0
    }

    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x08 => self.tod.read(0, self.alarm_select()),
            0x09 => self.tod.read(1, self.alarm_select()),
            0x0A => self.tod.read(2, self.alarm_select()),
            0x0D => self.read_icr_and_clear(),
            other => self.peek(other),
        }
    }

    /// Register value without read side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        match reg & 0x0F {
            0x00 => (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a),
            0x01 => (self.port_b & self.ddr_b) | (self.external_b & !self.ddr_b),
            0x02 => self.ddr_a,
            0x03 => self.ddr_b,
            0x04 => self.timer_a as u8,
            0x05 => (self.timer_a >> 8) as u8,
            0x06 => self.timer_b as u8,
            0x07 => (self.timer_b >> 8) as u8,
            0x08 => self.tod.peek(0),
            0x09 => self.tod.peek(1),
            0x0A => self.tod.peek(2),
            0x0C => self.sdr,
            0x0D => self.icr_status | if self.irq_active() { 0x80 } else { 0 },
            0x0E => self.cra,
            0x0F => self.crb,
            _ => 0xFF,
        }
    }

    pub fn read_icr_and_clear(&mut self) -> u8 {
        let any = if self.irq_active() { 0x80 } else { 0x00 };
        let result = self.icr_status | any;
        self.icr_status = 0;
        result
    }

    fn alarm_select(&self) -> bool {
        self.crb & CRB_ALARM != 0
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => self.port_a = value,
            0x01 => self.port_b = value,
            0x02 => self.ddr_a = value,
            0x03 => self.ddr_b = value,
            0x04 => self.timer_a_latch = (self.timer_a_latch & 0xFF00) | u16::from(value),
            0x05 => {
                self.timer_a_latch = (self.timer_a_latch & 0x00FF) | (u16::from(value) << 8);
                if !self.timer_a_running {
                    self.timer_a = self.timer_a_latch;
                    // 8520: In one-shot mode, writing the timer high byte
                    // initiates counting regardless of the start bit.
                    if self.timer_a_oneshot {
                        self.timer_a_running = true;
                        self.cra |= 0x01;
                    }
                }
            }
            0x06 => self.timer_b_latch = (self.timer_b_latch & 0xFF00) | u16::from(value),
            0x07 => {
                self.timer_b_latch = (self.timer_b_latch & 0x00FF) | (u16::from(value) << 8);
                if !self.timer_b_running {
                    self.timer_b = self.timer_b_latch;
                    if self.timer_b_oneshot {
                        self.timer_b_running = true;
                        self.crb |= 0x01;
                    }
                }
            }
            0x08..=0x0A => {
                let alarm_select = self.alarm_select();
                if self.tod.write(usize::from((reg & 0x0F) - 0x08), value, alarm_select) {
                    log::trace!("{}: TOD written onto alarm {}", self.label, self.tod);
                    self.icr_status |= ICR_ALARM;
                }
            }
            0x0C => self.sdr = value,
            0x0D => {
                if value & 0x80 != 0 {
                    self.icr_mask |= value & 0x1F;
                } else {
                    self.icr_mask &= !(value & 0x1F);
                }
            }
            0x0E => {
                self.cra = value;
                self.timer_a_running = value & 0x01 != 0;
                self.timer_a_oneshot = value & 0x08 != 0;
                if value & 0x10 != 0 {
                    self.timer_a_force_load = true;
                }
            }
            0x0F => {
                self.crb = value;
                self.timer_b_running = value & 0x01 != 0;
                self.timer_b_oneshot = value & 0x08 != 0;
                if value & 0x10 != 0 {
                    self.timer_b_force_load = true;
                }
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn tod(&self) -> &Tod {
        &self.tod
    }

    pub fn tod_mut(&mut self) -> &mut Tod {
        &mut self.tod
    }

    pub fn timer_a(&self) -> u16 {
        self.timer_a
    }

    pub fn timer_b(&self) -> u16 {
        self.timer_b
    }

    pub fn icr_status(&self) -> u8 {
        self.icr_status
    }

    pub fn icr_mask(&self) -> u8 {
        self.icr_mask
    }

    pub fn port_a_output(&self) -> u8 {
        (self.port_a & self.ddr_a) | (self.external_a & !self.ddr_a)
    }

    /// Port B pins as seen from outside: undriven pins float high.
    pub fn port_b_output(&self) -> u8 {
        (self.port_b & self.ddr_b) | !self.ddr_b
    }

    #[must_use]
    pub fn info(&self) -> CiaInfo {
        CiaInfo {
            pra: self.port_a_output(),
            prb: self.port_b_output(),
            ddra: self.ddr_a,
            ddrb: self.ddr_b,
            timer_a: self.timer_a,
            latch_a: self.timer_a_latch,
            running_a: self.timer_a_running,
            timer_b: self.timer_b,
            latch_b: self.timer_b_latch,
            running_b: self.timer_b_running,
            cra: self.cra,
            crb: self.crb,
            icr: self.icr_status,
            imr: self.icr_mask,
            sdr: self.sdr,
            irq: self.irq_active(),
            tod: self.tod.info(),
        }
    }

    pub fn inspect(&self) {
        self.published.publish(self.info());
    }

    #[must_use]
    pub fn info_cell(&self) -> InfoCell<CiaInfo> {
        self.published.clone()
    }
}

impl Component for Cia8520 {
    type Snapshot = CiaInfo;

    /// Clears all registers to power-on state. A soft reset (the 68000
    /// RESET instruction) leaves the TOD counter and alarm alone.
    fn reset(&mut self, hard: bool) {
        let tod = self.tod;
        let published = self.published.clone();
        *self = Self::new(self.label);
        self.published = published;
        if !hard {
            self.tod.set_counter(tod.counter());
            self.tod.set_alarm(tod.alarm());
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "{}", self.label)?;
        writeln!(
            out,
            "  PRA {:02X} DDRA {:02X}  PRB {:02X} DDRB {:02X}",
            self.port_a_output(),
            self.ddr_a,
            self.port_b_output(),
            self.ddr_b
        )?;
        writeln!(
            out,
            "  TA {:04X}/{:04X} {}  TB {:04X}/{:04X} {}",
            self.timer_a,
            self.timer_a_latch,
            if self.timer_a_running { "run" } else { "stop" },
            self.timer_b,
            self.timer_b_latch,
            if self.timer_b_running { "run" } else { "stop" },
        )?;
        writeln!(out, "  ICR {:02X} IMR {:02X}", self.icr_status, self.icr_mask)?;
        writeln!(out, "  TOD {} alarm {:06X}", self.tod, self.tod.alarm())
    }

    fn snapshot(&self) -> CiaInfo {
        self.info()
    }
}

impl Observable for Cia8520 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pra" => Some(self.port_a_output().into()),
            "prb" => Some(self.port_b_output().into()),
            "timer_a" => Some(self.timer_a.into()),
            "timer_b" => Some(self.timer_b.into()),
            "icr" => Some(self.icr_status.into()),
            "imr" => Some(self.icr_mask.into()),
            "irq" => Some(self.irq_active().into()),
            "tod.counter" => Some(self.tod.counter().into()),
            "tod.alarm" => Some(self.tod.alarm().into()),
            "tod.stopped" => Some(self.tod.is_stopped().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pra",
            "prb",
            "timer_a",
            "timer_b",
            "icr",
            "imr",
            "irq",
            "tod.counter",
            "tod.alarm",
            "tod.stopped",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_timer_underflows_and_reloads() {
        let mut cia = Cia8520::new("CIA-A");
        cia.write(0x04, 2);
        cia.write(0x05, 0);
        cia.write(0x0D, 0x80 | ICR_TA);
        cia.write(0x0E, 0x01);
        assert!(cia.is_active());

        for _ in 0..3 {
            cia.tick();
        }
        assert!(cia.irq_active());
        assert_eq!(cia.timer_a(), 2);
        assert_eq!(cia.read(0x0D), 0x80 | ICR_TA);
        assert!(!cia.irq_active());
        assert!(cia.is_active());
    }

    #[test]
    fn oneshot_timer_stops_after_underflow() {
        let mut cia = Cia8520::new("CIA-B");
        cia.write(0x0E, 0x08); // one-shot, stopped
        cia.write(0x04, 1);
        cia.write(0x05, 0); // high byte write starts it
        assert!(cia.is_active());

        cia.tick();
        cia.tick();
        assert_eq!(cia.icr_status() & ICR_TA, ICR_TA);
        assert!(!cia.is_active());
    }

    #[test]
    fn timer_b_counts_timer_a_underflows() {
        let mut cia = Cia8520::new("CIA-A");
        cia.write(0x04, 0);
        cia.write(0x05, 0);
        cia.write(0x06, 1);
        cia.write(0x07, 0);
        cia.write(0x0F, 0x41); // count TA underflows, start
        cia.write(0x0E, 0x01);

        cia.tick();
        assert_eq!(cia.timer_b(), 0);
        cia.tick();
        assert_eq!(cia.icr_status() & ICR_TB, ICR_TB);
    }

    #[test]
    fn tod_alarm_sets_icr_bit_2() {
        let mut cia = Cia8520::new("CIA-A");
        cia.write(0x0F, CRB_ALARM);
        cia.write(0x0A, 0);
        cia.write(0x09, 0);
        cia.write(0x08, 3);
        cia.write(0x0F, 0);
        cia.write(0x0D, 0x80 | ICR_ALARM);

        cia.tod_pulse();
        cia.tod_pulse();
        assert!(!cia.irq_active());
        cia.tod_pulse();
        assert!(cia.irq_active());
        assert_eq!(cia.read(0x0D), 0x80 | ICR_ALARM);
    }

    #[test]
    fn setting_the_clock_to_the_alarm_sets_icr_bit_2() {
        let mut cia = Cia8520::new("CIA-B");
        cia.tod_mut().set_alarm(0x00_0010);
        cia.write(0x0D, 0x80 | ICR_ALARM);

        cia.write(0x0A, 0x00);
        cia.write(0x09, 0x00);
        assert!(!cia.irq_active());
        cia.write(0x08, 0x10);
        assert!(cia.irq_active());
        assert_eq!(cia.read(0x0D), 0x80 | ICR_ALARM);

        cia.tod_pulse();
        assert_eq!(cia.read(0x0D), 0);
    }

    #[test]
    fn tod_registers_latch_through_the_bus() {
        let mut cia = Cia8520::new("CIA-B");
        cia.tod_mut().set_counter(0x00_01FF);
        assert_eq!(cia.read(0x0A), 0x00);
        cia.tod_pulse();
        assert_eq!(cia.read(0x09), 0x01);
        assert_eq!(cia.read(0x08), 0xFF);
        assert_eq!(cia.peek(0x09), 0x02);
    }

    #[test]
    fn soft_reset_keeps_tod() {
        let mut cia = Cia8520::new("CIA-A");
        cia.tod_mut().set_counter(0x1234);
        cia.write(0x0E, 0x01);
        cia.reset(false);
        assert_eq!(cia.tod().counter(), 0x1234);
        assert!(!cia.is_active());
        cia.reset(true);
        assert_eq!(cia.tod().counter(), 0);
    }

    #[test]
    fn port_b_output_floats_high_on_inputs() {
        let mut cia = Cia8520::new("CIA-B");
        cia.write(0x03, 0x0F);
        cia.write(0x01, 0x05);
        assert_eq!(cia.port_b_output(), 0xF5);
        assert_eq!(cia.query("prb"), Some(Value::U8(0xF5)));
    }

    #[test]
    fn flag_edge_interrupts_when_unmasked() {
        let mut cia = Cia8520::new("CIA-B");
        cia.flag_edge();
        assert!(!cia.irq_active());
        cia.write(0x0D, 0x80 | ICR_FLG);
        assert!(cia.irq_active());
        assert_eq!(cia.read(0x0D), 0x80 | ICR_FLG);
        assert!(!cia.irq_active());
    }
}
