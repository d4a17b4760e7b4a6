//! The chip units and the glue between them.
//!
//! Everything here runs either from an event handler or from the per-CCK
//! bus step, always with the scheduler passed in alongside. Cross-unit
//! effects (interrupts, drive lines, DMA transfers) go through the methods
//! below so that each one reschedules whatever slot it affects.

use std::collections::VecDeque;

use commodore_agnus_ocs::arbiter::{PRIORITY, PRIORITY_BLITTER_NASTY};
use commodore_agnus_ocs::{
    Agnus, Blitter, BusArbiter, BusOwner, ChipMemory, Copper, CopperState, CopperStep,
    DmaRequests, EventId, EventSlot, Scheduler, UnitRequests, DMAF_AUD0EN, DMAF_BLTEN,
    DMAF_COPEN, DMAF_DSKEN,
};
use commodore_paula_8364::{DiskOptions, DriveState, IrqSource, Paula8364, IPL_DELAY, TICKS_PER_BIT_CELL};
use drive_amiga_floppy::{AmigaFloppyDrive, FloppyDisk, MotorChange, MOTOR_SPINUP_ECLOCKS};
use emu_core::{Component, Cycle, MasterClock, TICKS_PER_ECLOCK};
use mos_cia_8520::Cia8520;

use crate::config::ChipsetConfig;
use crate::memory::ChipRam;
use crate::ChipsetError;

/// Retry interval for a WAIT whose wake-up position cannot be computed.
const COPPER_POLL: Cycle = Cycle::cck(2);

/// Time before Agnus sees a write to one of its display DMA registers.
pub(crate) const REG_WRITE_DELAY: Cycle = Cycle::cck(2);

/// Shortest gap between ejecting a disk and inserting the next one.
const DISK_SWAP_DELAY_MS: u64 = 1500;

// CIA-B PRB drive control lines, all active low.
const PRB_STEP: u8 = 0x01;
const PRB_DIR: u8 = 0x02;
const PRB_SIDE: u8 = 0x04;
const PRB_SEL0: u8 = 0x08;
const PRB_MOTOR: u8 = 0x80;

// CIA-A PRA bits driven by the selected drives.
const PRA_DRIVE_STATUS: u8 = 0x3C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CiaId {
    A,
    B,
}

impl CiaId {
    fn slot(self) -> EventSlot {
        match self {
            CiaId::A => EventSlot::CiaA,
            CiaId::B => EventSlot::CiaB,
        }
    }
}

/// Source of a custom register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Writer {
    Cpu,
    Copper,
}

impl Writer {
    fn slot(self) -> EventSlot {
        match self {
            Writer::Cpu => EventSlot::RegCpu,
            Writer::Copper => EventSlot::RegCopper,
        }
    }
}

/// Registers Agnus latches for display DMA a little after the write.
fn latched_late(offset: u16) -> bool {
    matches!(offset, 0x092 | 0x094 | 0x0E0..=0x0F6 | 0x100 | 0x108 | 0x10A)
}

fn reg_write_payload(offset: u16, val: u16) -> u64 {
    (u64::from(offset) << 16) | u64::from(val)
}

/// Handler context: every unit the scheduler's slots belong to.
#[derive(Debug)]
pub struct Units {
    pub(crate) agnus: Agnus,
    pub(crate) arbiter: BusArbiter,
    pub(crate) copper: Copper,
    pub(crate) blitter: Blitter,
    pub(crate) paula: Paula8364,
    pub(crate) cia_a: Cia8520,
    pub(crate) cia_b: Cia8520,
    pub(crate) drives: [AmigaFloppyDrive; 4],
    pub(crate) memory: ChipRam,
    pub(crate) config: ChipsetConfig,
    pub(crate) clock: MasterClock,
    pending_disks: [Option<FloppyDisk>; 4],
    pub(crate) cpu_request: bool,
    /// Colour clock the arbiter last decided.
    pub(crate) bus_clock: Cycle,
    /// Level the CPU will see once every queued change has arrived.
    ipl_target: u8,
    /// IPL changes on their way to the CPU, oldest first.
    ipl_pipeline: VecDeque<(Cycle, u8)>,
}

impl Units {
    pub(crate) fn new(config: ChipsetConfig) -> Self {
        let options = DiskOptions {
            auto_dsksync: config.auto_dsksync,
            lock_dsksync: config.lock_dsksync,
        };
        let connected = config.connected_drives;
        Self {
            agnus: Agnus::new(),
            arbiter: BusArbiter::new(),
            copper: Copper::new(),
            blitter: Blitter::new(),
            paula: Paula8364::new(options),
            cia_a: Cia8520::new("CIA-A"),
            cia_b: Cia8520::new("CIA-B"),
            drives: std::array::from_fn(|n| AmigaFloppyDrive::new(n as u8, connected[n])),
            memory: ChipRam::new(config.chip_ram_kib as usize * 1024),
            clock: MasterClock::new(config.region.crystal_hz()),
            config,
            pending_disks: Default::default(),
            cpu_request: false,
            bus_clock: Cycle::ZERO,
            ipl_target: 0,
            ipl_pipeline: VecDeque::new(),
        }
    }

    /// Arm the free-running slots relative to the current clock.
    pub(crate) fn power_on(&mut self, sched: &mut Scheduler<Units>) {
        let now = sched.now();
        let geometry = sched.geometry();
        sched.schedule_abs(
            EventSlot::Raster,
            geometry.next_line(now - Cycle::new(1)),
            EventId::LineStart,
            0,
        );
        sched.schedule_abs(EventSlot::TodA, geometry.next_frame(now), EventId::TodPulse, 0);
        sched.schedule_abs(EventSlot::TodB, geometry.next_line(now), EventId::TodPulse, 0);
        sched.schedule_rel(
            EventSlot::Inspector,
            self.inspection_interval(),
            EventId::Inspect,
            0,
        );
        self.refresh_drive_status();
    }

    pub(crate) fn reset(&mut self, hard: bool) {
        self.agnus = Agnus::new();
        self.arbiter.reset();
        self.copper = Copper::new();
        self.blitter.reset();
        self.paula.reset(hard);
        self.cia_a.reset(hard);
        self.cia_b.reset(hard);
        for drive in &mut self.drives {
            drive.reset(hard);
        }
        if hard {
            self.memory = ChipRam::new(self.memory.len());
        }
        self.pending_disks = Default::default();
        self.cpu_request = false;
        self.ipl_target = 0;
        self.ipl_pipeline.clear();
    }

    pub(crate) fn inspection_interval(&self) -> Cycle {
        self.clock.millis(self.config.inspection_interval_ms)
    }

    pub(crate) fn inspect(&self) {
        self.arbiter.inspect();
        self.paula.disk.inspect();
        self.cia_a.inspect();
        self.cia_b.inspect();
        for drive in &self.drives {
            drive.inspect();
        }
    }

    // Interrupts

    pub(crate) fn sync_ipl(&mut self, sched: &mut Scheduler<Units>) {
        let now = sched.now();
        self.sync_ipl_at(sched, now);
    }

    // Every change is delivered in order, each IPL_DELAY after it happened.
    fn sync_ipl_at(&mut self, sched: &mut Scheduler<Units>, at: Cycle) {
        let level = self.paula.compute_ipl();
        if level == self.ipl_target {
            return;
        }
        self.ipl_target = level;
        let due = at + IPL_DELAY;
        self.ipl_pipeline.push_back((due, level));
        if !sched.is_pending(EventSlot::Irq) {
            sched.schedule_abs(EventSlot::Irq, due, EventId::IplChange, u64::from(level));
        }
    }

    /// Hand the CPU every queued level that is due, then arm the slot for
    /// the next one.
    pub(crate) fn deliver_ipl(&mut self, sched: &mut Scheduler<Units>) {
        let now = sched.now();
        while let Some(&(due, level)) = self.ipl_pipeline.front() {
            if due > now {
                break;
            }
            self.paula.set_ipl(level);
            self.ipl_pipeline.pop_front();
        }
        if let Some(&(due, level)) = self.ipl_pipeline.front() {
            sched.schedule_abs(EventSlot::Irq, due, EventId::IplChange, u64::from(level));
        }
    }

    pub(crate) fn ipl_pipeline(&self) -> impl Iterator<Item = (Cycle, u8)> + '_ {
        self.ipl_pipeline.iter().copied()
    }

    /// Forward the CIA /IRQ lines to Paula (CIA-A on PORTS, CIA-B on EXTER).
    pub(crate) fn sync_cia_irqs(&mut self, sched: &mut Scheduler<Units>) {
        if self.cia_a.irq_active() {
            self.paula.raise(IrqSource::Ports);
        }
        if self.cia_b.irq_active() {
            self.paula.raise(IrqSource::Exter);
        }
        self.sync_ipl(sched);
    }

    // Bus

    /// The arbiter gave the current colour clock to `owner`.
    pub(crate) fn granted(&self, sched: &Scheduler<Units>, owner: BusOwner) -> bool {
        self.bus_clock == sched.now() && self.arbiter.owner() == owner
    }

    /// Decide who owns colour clock `at` and perform the fixed-slot
    /// transfers. Copper and blitter use their grant from their own slots.
    pub(crate) fn bus_cycle(&mut self, sched: &mut Scheduler<Units>, at: Cycle) {
        let hpos = sched.geometry().beam(at).h;
        let audio = (0..4u8)
            .filter(|&ch| self.paula.audio(usize::from(ch)).wants_word())
            .fold(0u8, |mask, ch| mask | (1 << ch));
        let wants = UnitRequests {
            disk: self.paula.disk.wants_dma(),
            audio,
            copper: self.copper.wants_bus() && self.agnus.dma_enabled(DMAF_COPEN),
            blitter: self.blitter.wants_bus() && self.agnus.dma_enabled(DMAF_BLTEN),
            cpu: self.cpu_request,
        };
        let requests = DmaRequests::for_slot(self.agnus.slot_claim(hpos), hpos, wants);
        let table = if self.agnus.blitter_nasty() {
            &PRIORITY_BLITTER_NASTY
        } else {
            &PRIORITY
        };
        let owner = self.arbiter.arbitrate(&requests, table);
        self.bus_clock = at;

        match owner {
            BusOwner::Disk => self.disk_dma(),
            BusOwner::Audio(ch) => {
                let ch = usize::from(ch);
                let word = self.memory.read_word(self.paula.audio(ch).fetch_address());
                self.paula.audio_fetch(ch, word);
            }
            BusOwner::Bitplane(plane) => self.agnus.bitplane_fetched(plane),
            _ => {}
        }
        self.sync_ipl_at(sched, at);
    }

    fn disk_dma(&mut self) {
        if self.paula.disk.state() == DriveState::Write {
            let word = self.memory.read_word(self.agnus.dsk_pt);
            self.paula.disk_dma_write(word);
            self.agnus.next_disk_address();
        } else if let Some(word) = self.paula.disk_dma_read() {
            let addr = self.agnus.next_disk_address();
            self.memory.write_word(addr, word);
        }
    }

    // Copper

    /// Schedule the copper's next action from its current state.
    pub(crate) fn kick_copper(&mut self, sched: &mut Scheduler<Units>) {
        if !self.agnus.dma_enabled(DMAF_COPEN) {
            sched.cancel(EventSlot::Copper);
        } else if self.copper.wants_bus() {
            let at = next_copper_cycle(sched);
            sched.schedule_abs(EventSlot::Copper, at, EventId::CopperFetch, 0);
        } else if self.copper.state == CopperState::Wait {
            self.copper_wait(sched);
        } else {
            sched.cancel(EventSlot::Copper);
        }
    }

    pub(crate) fn copper_wait(&mut self, sched: &mut Scheduler<Units>) {
        match self.copper.wake_target(sched.beam(), sched.geometry()) {
            Some(target) => {
                sched.schedule_pos(EventSlot::Copper, target, EventId::CopperWakeup, 0);
            }
            None => sched.schedule_rel(EventSlot::Copper, COPPER_POLL, EventId::CopperWakeup, 0),
        }
    }

    pub(crate) fn copper_fetch(&mut self, sched: &mut Scheduler<Units>) {
        if !self.copper.wants_bus() {
            return;
        }
        if !self.granted(sched, BusOwner::Copper) {
            let at = next_copper_cycle(sched);
            sched.schedule_abs(EventSlot::Copper, at, EventId::CopperFetch, 0);
            return;
        }

        let word = self.memory.read_word(self.copper.fetch_address());
        match self.copper.fetch(word, sched.beam()) {
            CopperStep::Continue | CopperStep::Wait => {}
            CopperStep::Move { reg, value } => {
                self.write_custom_reg(sched, Writer::Copper, reg, value);
            }
            CopperStep::EndOfList => log::trace!("copper: end of list at {}", sched.now()),
            CopperStep::Halted { reg } => {
                log::debug!("copper: halted on MOVE to {reg:#05X}");
            }
        }
        self.kick_copper(sched);
    }

    // Blitter

    pub(crate) fn schedule_blitter(&mut self, sched: &mut Scheduler<Units>, id: EventId) {
        let at = sched.now().next_cck();
        sched.schedule_abs(EventSlot::Blitter, at, id, 0);
    }

    // Registers

    /// Custom chip register write, from the CPU or a copper MOVE.
    ///
    /// Display DMA registers land `REG_WRITE_DELAY` later through the
    /// writer's slot. Each writer has one write in flight; a newer one
    /// makes the older land first.
    pub(crate) fn write_custom_reg(
        &mut self,
        sched: &mut Scheduler<Units>,
        writer: Writer,
        offset: u16,
        val: u16,
    ) {
        let offset = offset & 0x1FE;
        if !latched_late(offset) {
            self.apply_custom_reg(sched, offset, val);
            return;
        }

        let slot = writer.slot();
        if sched.is_pending(slot) {
            let pending = sched.event(slot);
            sched.cancel(slot);
            self.apply_reg_write(sched, pending.payload);
        }
        sched.schedule_rel(
            slot,
            REG_WRITE_DELAY,
            EventId::RegWrite,
            reg_write_payload(offset, val),
        );
    }

    /// A delayed write from `write_custom_reg` lands.
    pub(crate) fn apply_reg_write(&mut self, sched: &mut Scheduler<Units>, payload: u64) {
        let offset = ((payload >> 16) & 0x1FE) as u16;
        let val = (payload & 0xFFFF) as u16;
        self.apply_custom_reg(sched, offset, val);
    }

    fn apply_custom_reg(&mut self, sched: &mut Scheduler<Units>, offset: u16, val: u16) {
        match offset {
            // Disk
            0x020 => self.agnus.dsk_pt = set_high(self.agnus.dsk_pt, val),
            0x022 => self.agnus.dsk_pt = set_low(self.agnus.dsk_pt, val),
            0x024 => self.paula.poke_dsklen(val),
            0x07E => self.paula.disk.poke_dsksync(val),

            // Copper danger
            0x02E => self.copper.danger = val & 0x02 != 0,

            // Blitter
            0x040 => self.blitter.bltcon0 = val,
            0x042 => self.blitter.bltcon1 = val,
            0x044 => self.blitter.afwm = val,
            0x046 => self.blitter.alwm = val,
            0x048 => self.blitter.cpt = set_high(self.blitter.cpt, val),
            0x04A => self.blitter.cpt = set_low(self.blitter.cpt, val),
            0x04C => self.blitter.bpt = set_high(self.blitter.bpt, val),
            0x04E => self.blitter.bpt = set_low(self.blitter.bpt, val),
            0x050 => self.blitter.apt = set_high(self.blitter.apt, val),
            0x052 => self.blitter.apt = set_low(self.blitter.apt, val),
            0x054 => self.blitter.dpt = set_high(self.blitter.dpt, val),
            0x056 => self.blitter.dpt = set_low(self.blitter.dpt, val),
            0x058 => {
                self.blitter.start(val);
                self.schedule_blitter(sched, EventId::BlitterStart);
            }
            0x060 => self.blitter.cmod = (val & 0xFFFE) as i16,
            0x062 => self.blitter.bmod = (val & 0xFFFE) as i16,
            0x064 => self.blitter.amod = (val & 0xFFFE) as i16,
            0x066 => self.blitter.dmod = (val & 0xFFFE) as i16,
            0x070 => self.blitter.cdat = val,
            0x072 => self.blitter.bdat = val,
            0x074 => self.blitter.adat = val,

            // Copper
            0x080 => self.copper.cop1lc = set_high(self.copper.cop1lc, val),
            0x082 => self.copper.cop1lc = set_low(self.copper.cop1lc, val),
            0x084 => self.copper.cop2lc = set_high(self.copper.cop2lc, val),
            0x086 => self.copper.cop2lc = set_low(self.copper.cop2lc, val),
            0x088 => {
                self.copper.restart_cop1();
                self.kick_copper(sched);
            }
            0x08A => {
                self.copper.restart_cop2();
                self.kick_copper(sched);
            }

            // Display fetch window
            0x092 => self.agnus.ddfstrt = val & 0x00FC,
            0x094 => self.agnus.ddfstop = val & 0x00FC,

            0x096 => self.poke_dmacon(sched, val),

            // Interrupts
            0x09A => {
                self.paula.write_intena(val);
                self.sync_ipl(sched);
            }
            0x09C => {
                self.paula.write_intreq(val);
                self.sync_ipl(sched);
            }
            0x09E => self.paula.write_adkcon(val),

            // Audio
            0x0A0..=0x0DA => {
                if let Some(ch) = self.paula.write_audio_register(offset, val) {
                    let slot = EventSlot::audio(ch);
                    if self.paula.audio(ch).is_playing() && !sched.is_pending(slot) {
                        let period = self.paula.audio(ch).period();
                        sched.schedule_rel(slot, period, EventId::AudioPeriod, 0);
                    }
                }
            }

            // Bitplane pointers
            0x0E0..=0x0F6 => {
                let idx = usize::from((offset - 0x0E0) / 4);
                let pt = &mut self.agnus.bpl_pt[idx];
                *pt = if offset & 2 == 0 { set_high(*pt, val) } else { set_low(*pt, val) };
            }

            0x100 => self.agnus.bplcon0 = val,
            0x108 => self.agnus.bpl1mod = val as i16,
            0x10A => self.agnus.bpl2mod = val as i16,

            // Sprite pointers
            0x120..=0x13E => {
                let idx = usize::from((offset - 0x120) / 4);
                let pt = &mut self.agnus.spr_pt[idx];
                *pt = if offset & 2 == 0 { set_high(*pt, val) } else { set_low(*pt, val) };
            }

            _ => log::trace!("custom write {offset:#05X} = {val:#06X} ignored"),
        }
    }

    /// Custom chip register read. Write-only registers read as zero.
    pub(crate) fn read_custom_reg(&mut self, sched: &Scheduler<Units>, offset: u16) -> u16 {
        let beam = sched.beam();
        match offset & 0x1FE {
            0x002 => self.agnus.dmaconr(self.blitter.is_busy(), self.blitter.is_zero()),
            0x004 => (beam.v >> 8) & 1,
            0x006 => ((beam.v & 0xFF) << 8) | (beam.h & 0xFF),
            0x010 => self.paula.adkcon,
            0x01A => self
                .paula
                .disk
                .peek_dskbytr(self.agnus.dma_enabled(DMAF_DSKEN), sched.now()),
            0x01C => self.paula.intena,
            0x01E => self.paula.intreq,
            _ => 0,
        }
    }

    fn poke_dmacon(&mut self, sched: &mut Scheduler<Units>, val: u16) {
        let change = self.agnus.poke_dmacon(val);

        for ch in 0..4 {
            let bit = DMAF_AUD0EN << ch;
            let slot = EventSlot::audio(ch);
            if change.switched_on(bit) {
                self.paula.start_audio(ch);
                let period = self.paula.audio(ch).period();
                sched.schedule_rel(slot, period, EventId::AudioPeriod, 0);
            } else if change.switched_off(bit) {
                self.paula.stop_audio(ch);
                sched.cancel(slot);
            }
        }

        if change.switched_on(DMAF_COPEN) || change.switched_off(DMAF_COPEN) {
            self.kick_copper(sched);
        }
        if change.switched_on(DMAF_BLTEN) && self.blitter.is_busy() {
            self.schedule_blitter(sched, EventId::BlitterStep);
        }
        self.sync_ipl(sched);
    }

    // CIAs

    pub(crate) fn write_cia(&mut self, sched: &mut Scheduler<Units>, id: CiaId, reg: u8, val: u8) {
        let reg = reg & 0x0F;
        match id {
            CiaId::A => self.cia_a.write(reg, val),
            CiaId::B => self.cia_b.write(reg, val),
        }
        if id == CiaId::B && matches!(reg, 0x01 | 0x03) {
            self.update_drive_control(sched);
        }
        self.arm_cia(sched, id);
        self.sync_cia_irqs(sched);
    }

    pub(crate) fn read_cia(&mut self, id: CiaId, reg: u8) -> u8 {
        match id {
            CiaId::A => self.cia_a.read(reg),
            CiaId::B => self.cia_b.read(reg),
        }
    }

    // The timers only need E-clocks while one of them counts.
    fn arm_cia(&mut self, sched: &mut Scheduler<Units>, id: CiaId) {
        let active = match id {
            CiaId::A => self.cia_a.is_active(),
            CiaId::B => self.cia_b.is_active(),
        };
        let slot = id.slot();
        if active && !sched.is_pending(slot) {
            let at = (sched.now() + Cycle::new(1)).align_up(TICKS_PER_ECLOCK);
            sched.schedule_abs(slot, at, EventId::CiaExecute, 0);
        }
    }

    // Drives

    /// CIA-B PRB changed: drive the select, motor, side and step lines.
    fn update_drive_control(&mut self, sched: &mut Scheduler<Units>) {
        let prb = self.cia_b.port_b_output();
        let step = prb & PRB_STEP == 0;
        let dir_inward = prb & PRB_DIR == 0;
        let side_upper = prb & PRB_SIDE == 0;
        let motor = prb & PRB_MOTOR == 0;
        let ready_at = sched.now() + Cycle::eclock(MOTOR_SPINUP_ECLOCKS);

        let mut selected = None;
        for (n, drive) in self.drives.iter_mut().enumerate() {
            let sel = prb & (PRB_SEL0 << n) == 0;
            if drive.update_control(step, dir_inward, side_upper, sel, motor) == MotorChange::On {
                drive.begin_spin_up(ready_at);
            }
            if sel && drive.is_connected() && selected.is_none() {
                selected = Some(n as u8);
            }
        }
        self.paula.disk.select(selected);

        self.arm_motor(sched);
        if self.drives.iter().any(AmigaFloppyDrive::motor_on) && !sched.is_pending(EventSlot::Disk) {
            sched.schedule_rel(
                EventSlot::Disk,
                Cycle::new(TICKS_PER_BIT_CELL),
                EventId::DiskRotate,
                0,
            );
        }
        self.refresh_drive_status();
    }

    pub(crate) fn arm_motor(&mut self, sched: &mut Scheduler<Units>) {
        match self
            .drives
            .iter()
            .filter_map(AmigaFloppyDrive::spin_up_deadline)
            .min()
        {
            Some(at) => sched.schedule_abs(EventSlot::Motor, at.max(sched.now()), EventId::MotorCheck, 0),
            None => sched.cancel(EventSlot::Motor),
        }
    }

    /// Mirror the selected drives' status lines into CIA-A PRA.
    pub(crate) fn refresh_drive_status(&mut self) {
        let bits = self
            .drives
            .iter()
            .filter(|drive| drive.is_selected())
            .fold(PRA_DRIVE_STATUS, |bits, drive| bits & drive.status().pra_bits());
        self.cia_a.external_a = (self.cia_a.external_a & !PRA_DRIVE_STATUS) | bits;
    }

    /// One disk slot firing: every spinning drive moves on by
    /// `drive_speed` bit cells and the selected one talks to the controller.
    pub(crate) fn rotate_disk(&mut self, sched: &mut Scheduler<Units>) {
        let now = sched.now();
        let selected = self.paula.disk.selected().map(usize::from);

        for _ in 0..self.config.drive_speed {
            for (n, drive) in self.drives.iter_mut().enumerate() {
                if !drive.motor_on() {
                    continue;
                }
                if Some(n) != selected {
                    drive.read_bit_and_rotate();
                    continue;
                }

                let index = if self.paula.disk.is_writing() {
                    match self.paula.disk.shift_out() {
                        Some(bit) => drive.write_bit_and_rotate(bit),
                        None => drive.read_bit_and_rotate().index,
                    }
                } else {
                    let rotation = drive.read_bit_and_rotate();
                    self.paula.disk_shift_in(rotation.bit, now);
                    rotation.index
                };
                // The index sensor is wired to CIA-B /FLAG.
                if index {
                    self.cia_b.flag_edge();
                }
            }
        }

        if self.config.turbo_disk() && self.agnus.dma_enabled(DMAF_DSKEN) {
            while self.paula.disk.wants_dma() {
                self.disk_dma();
            }
        }
        self.sync_cia_irqs(sched);

        if self.drives.iter().any(AmigaFloppyDrive::motor_on) {
            sched.schedule_rel(
                EventSlot::Disk,
                Cycle::new(TICKS_PER_BIT_CELL),
                EventId::DiskRotate,
                0,
            );
        }
    }

    fn check_drive(&self, drive: usize) -> Result<(), ChipsetError> {
        if self.drives.get(drive).is_some_and(AmigaFloppyDrive::is_connected) {
            Ok(())
        } else {
            Err(ChipsetError::DriveNotConnected(drive))
        }
    }

    /// Queue a disk for `drive`. A disk already in the drive comes out now
    /// and the new one goes in no sooner than the swap delay.
    pub(crate) fn request_insert(
        &mut self,
        sched: &mut Scheduler<Units>,
        drive: usize,
        disk: FloppyDisk,
        delay: Cycle,
    ) -> Result<(), ChipsetError> {
        self.check_drive(drive)?;
        let mut delay = delay;
        if self.drives[drive].has_disk() {
            self.drives[drive].eject_disk();
            self.refresh_drive_status();
            delay = delay.max(self.clock.millis(DISK_SWAP_DELAY_MS));
        }
        self.pending_disks[drive] = Some(disk);
        sched.schedule_rel(EventSlot::disk_change(drive), delay, EventId::DiskInsert, 0);
        Ok(())
    }

    pub(crate) fn request_eject(
        &mut self,
        sched: &mut Scheduler<Units>,
        drive: usize,
        delay: Cycle,
    ) -> Result<(), ChipsetError> {
        self.check_drive(drive)?;
        self.pending_disks[drive] = None;
        sched.schedule_rel(EventSlot::disk_change(drive), delay, EventId::DiskEject, 0);
        Ok(())
    }

    pub(crate) fn complete_disk_change(&mut self, drive: usize, insert: bool) {
        if insert {
            if let Some(disk) = self.pending_disks[drive].take() {
                self.drives[drive].insert_disk(disk);
            }
        } else {
            self.drives[drive].eject_disk();
        }
        self.refresh_drive_status();
    }
}

/// First colour clock after now that the copper may use (even `hpos`).
fn next_copper_cycle(sched: &Scheduler<Units>) -> Cycle {
    let at = sched.now().next_cck();
    if sched.geometry().beam(at).h % 2 == 0 {
        at
    } else {
        at + Cycle::cck(1)
    }
}

fn set_high(reg: u32, val: u16) -> u32 {
    (reg & 0x0000_FFFF) | (u32::from(val) << 16)
}

fn set_low(reg: u32, val: u16) -> u32 {
    (reg & 0xFFFF_0000) | u32::from(val & 0xFFFE)
}
