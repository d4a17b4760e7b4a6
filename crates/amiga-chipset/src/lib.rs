//! Amiga OCS chipset on a single event scheduler.
//!
//! [`Chipset`] owns the custom chips, both CIAs, up to four floppy drives
//! and chip RAM, and drives them all from one [`Scheduler`]. Nothing
//! ticks: every unit arms a slot for the next master cycle it has work to
//! do, and [`Chipset::advance`] walks time forward, deciding bus ownership
//! at every colour clock boundary on the way.
//!
//! A CPU core (not part of this crate) sits on the other side of
//! [`Chipset::write_custom_reg`], the CIA accessors, [`Chipset::ipl`] and
//! [`Chipset::set_cpu_request`].

mod config;
mod handlers;
pub mod memory;
mod units;

use core::fmt;

use commodore_agnus_ocs::{
    Agnus, Beam, BeamGeometry, Blitter, BusArbiter, BusInfo, BusOwner, Copper, EventSlot,
    Scheduler, SchedulerInfo, SchedulerState,
};
use commodore_paula_8364::{DiskControllerInfo, Paula8364, PaulaState};
use drive_amiga_floppy::{AmigaFloppyDrive, DiskError, DriveInfo, FloppyDisk};
use emu_core::{Component, Cycle, InfoCell, MasterClock, Observable, Value};
use mos_cia_8520::{Cia8520, CiaInfo};
use thiserror::Error;

pub use commodore_agnus_ocs;
pub use commodore_paula_8364;
pub use drive_amiga_floppy;
pub use mos_cia_8520;

pub use crate::config::{ChipsetConfig, ConfigError};
pub use crate::memory::ChipRam;
pub use crate::units::Units;

use crate::units::{CiaId, Writer};

#[derive(Debug, Error)]
pub enum ChipsetError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("drive {0} is not connected")]
    DriveNotConnected(usize),
    #[error(transparent)]
    Disk(#[from] DiskError),
}

/// Everything a snapshot of the chipset carries.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipsetState {
    pub scheduler: SchedulerState,
    pub bus: BusInfo,
    pub paula: PaulaState,
    pub cia_a: CiaInfo,
    pub cia_b: CiaInfo,
    pub drives: [DriveInfo; 4],
}

/// Read handles for the published info of every unit. Cloneable and
/// `Send`, so a debugger thread can hold one while the chipset runs.
#[derive(Debug, Clone)]
pub struct ChipsetInspector {
    pub scheduler: InfoCell<SchedulerInfo>,
    pub bus: InfoCell<BusInfo>,
    pub disk: InfoCell<DiskControllerInfo>,
    pub cia_a: InfoCell<CiaInfo>,
    pub cia_b: InfoCell<CiaInfo>,
    pub drives: [InfoCell<DriveInfo>; 4],
}

#[derive(Debug)]
pub struct Chipset {
    scheduler: Scheduler<Units>,
    units: Units,
}

impl Chipset {
    pub fn new(config: ChipsetConfig) -> Result<Self, ChipsetError> {
        config.validate()?;
        let geometry = BeamGeometry::for_region(config.region);
        let mut scheduler = Scheduler::new(geometry, handlers::dispatch_table());
        let mut units = Units::new(config);
        units.power_on(&mut scheduler);
        units.bus_cycle(&mut scheduler, Cycle::ZERO);
        log::debug!("chipset: power on, {:?}", units.config.region);
        Ok(Self { scheduler, units })
    }

    /// Run until master cycle `target`, arbitrating every colour clock
    /// boundary passed on the way. Events due exactly on a boundary see
    /// that boundary's bus owner.
    pub fn advance(&mut self, target: Cycle) {
        let mut boundary = self.units.bus_clock + Cycle::cck(1);
        while boundary <= target {
            self.scheduler.advance(boundary - Cycle::new(1), &mut self.units);
            self.units.bus_cycle(&mut self.scheduler, boundary);
            self.scheduler.advance(boundary, &mut self.units);
            boundary += Cycle::cck(1);
        }
        self.scheduler.advance(target, &mut self.units);
    }

    pub fn advance_by(&mut self, delta: Cycle) {
        self.advance(self.now() + delta);
    }

    /// Run to the start of the next frame.
    pub fn run_frame(&mut self) {
        let end = self.scheduler.geometry().next_frame(self.now());
        self.advance(end);
    }

    #[must_use]
    pub fn now(&self) -> Cycle {
        self.scheduler.now()
    }

    #[must_use]
    pub fn beam(&self) -> Beam {
        self.scheduler.beam()
    }

    #[must_use]
    pub fn frame(&self) -> i64 {
        self.scheduler.frame()
    }

    #[must_use]
    pub fn geometry(&self) -> BeamGeometry {
        self.scheduler.geometry()
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        self.units.clock
    }

    #[must_use]
    pub fn config(&self) -> &ChipsetConfig {
        &self.units.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<Units> {
        &self.scheduler
    }

    /// Interrupt level changes still on their way to the CPU, oldest first.
    #[must_use]
    pub fn pending_ipl_changes(&self) -> Vec<(Cycle, u8)> {
        self.units.ipl_pipeline().collect()
    }

    // CPU side

    pub fn write_custom_reg(&mut self, offset: u16, val: u16) {
        self.units.write_custom_reg(&mut self.scheduler, Writer::Cpu, offset, val);
    }

    pub fn read_custom_reg(&mut self, offset: u16) -> u16 {
        self.units.read_custom_reg(&self.scheduler, offset)
    }

    pub fn write_cia_a(&mut self, reg: u8, val: u8) {
        self.units.write_cia(&mut self.scheduler, CiaId::A, reg, val);
    }

    pub fn write_cia_b(&mut self, reg: u8, val: u8) {
        self.units.write_cia(&mut self.scheduler, CiaId::B, reg, val);
    }

    pub fn read_cia_a(&mut self, reg: u8) -> u8 {
        self.units.read_cia(CiaId::A, reg)
    }

    pub fn read_cia_b(&mut self, reg: u8) -> u8 {
        self.units.read_cia(CiaId::B, reg)
    }

    /// Whether the CPU wants the next free bus cycle.
    pub fn set_cpu_request(&mut self, wants: bool) {
        self.units.cpu_request = wants;
    }

    #[must_use]
    pub fn bus_owner(&self) -> BusOwner {
        self.units.arbiter.owner()
    }

    /// Interrupt level currently presented to the CPU.
    #[must_use]
    pub fn ipl(&self) -> u8 {
        self.units.paula.ipl()
    }

    #[must_use]
    pub fn chip_ram(&self) -> &ChipRam {
        &self.units.memory
    }

    pub fn chip_ram_mut(&mut self) -> &mut ChipRam {
        &mut self.units.memory
    }

    // Disks

    /// Insert `disk` into `drive` after `delay`. A disk already in the
    /// drive is ejected now.
    pub fn insert_disk(
        &mut self,
        drive: usize,
        disk: FloppyDisk,
        delay: Cycle,
    ) -> Result<(), ChipsetError> {
        self.units.request_insert(&mut self.scheduler, drive, disk, delay)
    }

    /// Build a disk from raw MFM tracks and insert it.
    pub fn insert_tracks(
        &mut self,
        drive: usize,
        tracks: Vec<Vec<u8>>,
        delay: Cycle,
    ) -> Result<(), ChipsetError> {
        let disk = FloppyDisk::from_tracks(tracks)?;
        self.insert_disk(drive, disk, delay)
    }

    pub fn eject_disk(&mut self, drive: usize, delay: Cycle) -> Result<(), ChipsetError> {
        self.units.request_eject(&mut self.scheduler, drive, delay)
    }

    // Units

    #[must_use]
    pub fn agnus(&self) -> &Agnus {
        &self.units.agnus
    }

    #[must_use]
    pub fn copper(&self) -> &Copper {
        &self.units.copper
    }

    #[must_use]
    pub fn blitter(&self) -> &Blitter {
        &self.units.blitter
    }

    #[must_use]
    pub fn arbiter(&self) -> &BusArbiter {
        &self.units.arbiter
    }

    #[must_use]
    pub fn paula(&self) -> &Paula8364 {
        &self.units.paula
    }

    #[must_use]
    pub fn cia_a(&self) -> &Cia8520 {
        &self.units.cia_a
    }

    #[must_use]
    pub fn cia_b(&self) -> &Cia8520 {
        &self.units.cia_b
    }

    #[must_use]
    pub fn drive(&self, n: usize) -> Option<&AmigaFloppyDrive> {
        self.units.drives.get(n)
    }

    // Inspection

    /// Publish fresh info for every unit now, without waiting for the
    /// inspector slot.
    pub fn inspect(&self) {
        self.units.inspect();
        self.scheduler.inspect();
    }

    #[must_use]
    pub fn inspector(&self) -> ChipsetInspector {
        ChipsetInspector {
            scheduler: self.scheduler.info_cell(),
            bus: self.units.arbiter.info_cell(),
            disk: self.units.paula.disk.info_cell(),
            cia_a: self.units.cia_a.info_cell(),
            cia_b: self.units.cia_b.info_cell(),
            drives: std::array::from_fn(|n| self.units.drives[n].info_cell()),
        }
    }
}

impl Component for Chipset {
    type Snapshot = ChipsetState;

    /// Reset every unit and re-arm the free-running slots. The clock keeps
    /// running from where it was.
    fn reset(&mut self, hard: bool) {
        self.units.reset(hard);
        for slot in EventSlot::ALL {
            self.scheduler.cancel(slot);
        }
        self.units.power_on(&mut self.scheduler);
        log::debug!("chipset: {} reset at {}", if hard { "hard" } else { "soft" }, self.now());
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let beam = self.beam();
        writeln!(
            out,
            "clock {} frame {} beam {:03X}/{:03X}",
            self.now(),
            self.frame(),
            beam.v,
            beam.h
        )?;
        writeln!(
            out,
            "DMACON {:04X} bus {}",
            self.units.agnus.dmacon,
            self.units.arbiter.owner().name()
        )?;
        self.units.paula.dump(out)?;
        self.units.cia_a.dump(out)?;
        self.units.cia_b.dump(out)?;
        for drive in self.units.drives.iter().filter(|d| d.is_connected()) {
            drive.dump(out)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> ChipsetState {
        ChipsetState {
            scheduler: self.scheduler.snapshot(),
            bus: self.units.arbiter.info(),
            paula: self.units.paula.snapshot(),
            cia_a: self.units.cia_a.snapshot(),
            cia_b: self.units.cia_b.snapshot(),
            drives: std::array::from_fn(|n| self.units.drives[n].snapshot()),
        }
    }
}

impl Observable for Chipset {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("bus.") {
            self.units.arbiter.query(rest)
        } else if let Some(rest) = path.strip_prefix("scheduler.") {
            self.scheduler.query(rest)
        } else if let Some(rest) = path.strip_prefix("paula.") {
            self.units.paula.query(rest)
        } else if let Some(rest) = path.strip_prefix("disk.") {
            self.units.paula.disk.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia_a.") {
            self.units.cia_a.query(rest)
        } else if let Some(rest) = path.strip_prefix("cia_b.") {
            self.units.cia_b.query(rest)
        } else if let Some(rest) = path.strip_prefix("agnus.") {
            let agnus = &self.units.agnus;
            match rest {
                "dmacon" => Some(agnus.dmacon.into()),
                "dsk_pt" => Some(agnus.dsk_pt.into()),
                "bplcon0" => Some(agnus.bplcon0.into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("copper.") {
            let copper = &self.units.copper;
            match rest {
                "pc" => Some(copper.pc.into()),
                "state" => Some(format!("{:?}", copper.state).into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("blitter.") {
            match rest {
                "busy" => Some(self.units.blitter.is_busy().into()),
                "remaining" => Some(self.units.blitter.words_remaining().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr = rest.strip_prefix("0x").unwrap_or(rest);
            let addr = u32::from_str_radix(addr, 16).ok()?;
            Some(self.units.memory.read_byte(addr).into())
        } else if let Some(rest) = path.strip_prefix("df") {
            let (n, field) = rest.split_once('.')?;
            self.units.drives.get(n.parse::<usize>().ok()?)?.query(field)
        } else {
            match path {
                "frame" => Some(self.frame().into()),
                "ipl" => Some(self.ipl().into()),
                _ => self.scheduler.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "clock",
            "next_trigger",
            "dispatched",
            "frame",
            "beam.v",
            "beam.h",
            "ipl",
            "slot.<name>",
            "bus.<path>",
            "scheduler.<path>",
            "paula.<path>",
            "disk.<path>",
            "cia_a.<path>",
            "cia_b.<path>",
            "agnus.dmacon",
            "agnus.dsk_pt",
            "agnus.bplcon0",
            "copper.pc",
            "copper.state",
            "blitter.busy",
            "blitter.remaining",
            "df<0-3>.<path>",
            "memory.<address>",
        ]
    }
}
