//! Commodore 8364 Paula - interrupt controller, audio DMA, and disk DMA.
//!
//! Paula manages the Amiga's interrupt priority system, mapping 14 interrupt
//! sources to 6 CPU interrupt levels. It also owns the four audio channels
//! and the disk controller. Paula has no notion of time: the chipset's event
//! slots call into it and carry the interrupt level to the CPU after the
//! hardware's propagation delay.

mod audio;
pub mod disk;

use core::fmt;

use emu_core::{Component, Cycle, Observable, Value};

pub use audio::{AudioChannel, MIN_AUDIO_PERIOD_CCK};
pub use disk::{
    DiskController, DiskControllerInfo, DiskOptions, DriveState, Fifo, Transfer,
    DEFAULT_DSKSYNC, FIFO_CAPACITY, TICKS_PER_BIT_CELL,
};

/// INTENA/INTREQ bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IrqSource {
    Tbe = 0,
    DskBlk = 1,
    Soft = 2,
    Ports = 3,
    Coper = 4,
    Vertb = 5,
    Blit = 6,
    Aud0 = 7,
    Aud1 = 8,
    Aud2 = 9,
    Aud3 = 10,
    Rbf = 11,
    DskSyn = 12,
    Exter = 13,
}

impl IrqSource {
    #[must_use]
    pub const fn mask(self) -> u16 {
        1 << self as u16
    }

    #[must_use]
    pub const fn audio(channel: usize) -> Self {
        match channel {
            0 => Self::Aud0,
            1 => Self::Aud1,
            2 => Self::Aud2,
            _ => Self::Aud3,
        }
    }
}

/// IPL propagation delay from INTREQ/INTENA to the CPU pins.
pub const IPL_DELAY: Cycle = Cycle::cck(2);

const INTF_INTEN: u16 = 0x4000;

/// Register-level state, for snapshots and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaulaState {
    pub intena: u16,
    pub intreq: u16,
    pub adkcon: u16,
    pub ipl: u8,
    pub disk: DiskControllerInfo,
}

#[derive(Debug, Clone)]
pub struct Paula8364 {
    pub intena: u16,
    pub intreq: u16,
    pub adkcon: u16,
    /// Level currently presented to the CPU (lags [`Self::compute_ipl`]).
    ipl: u8,
    pub disk: DiskController,
    audio: [AudioChannel; 4],
}

fn set_clr(reg: &mut u16, val: u16) {
    if val & 0x8000 != 0 {
        *reg |= val & 0x7FFF;
    } else {
        *reg &= !(val & 0x7FFF);
    }
}

impl Paula8364 {
    pub fn new(disk: DiskOptions) -> Self {
        Self {
            intena: 0,
            intreq: 0,
            adkcon: 0,
            ipl: 0,
            disk: DiskController::new(disk),
            audio: [AudioChannel::default(); 4],
        }
    }

    pub fn write_intena(&mut self, val: u16) {
        set_clr(&mut self.intena, val);
    }

    pub fn write_intreq(&mut self, val: u16) {
        set_clr(&mut self.intreq, val);
    }

    pub fn write_adkcon(&mut self, val: u16) {
        set_clr(&mut self.adkcon, val);
    }

    /// Set an INTREQ bit. Visible to every unit immediately; the CPU sees it
    /// once the IPL slot fires.
    pub fn raise(&mut self, source: IrqSource) {
        self.intreq |= source.mask();
    }

    /// Level the CPU is currently being shown.
    #[must_use]
    pub fn ipl(&self) -> u8 {
        self.ipl
    }

    /// Deliver a level computed [`IPL_DELAY`] earlier.
    pub fn set_ipl(&mut self, level: u8) {
        if level != self.ipl {
            log::trace!("paula: IPL {} -> {level}", self.ipl);
        }
        self.ipl = level;
    }

    pub fn compute_ipl(&self) -> u8 {
        // Master enable: bit 14
        if self.intena & INTF_INTEN == 0 {
            return 0;
        }

        let active = self.intena & self.intreq & 0x3FFF;
        if active == 0 {
            return 0;
        }

        // Amiga Hardware Reference Manual interrupt priority mapping:
        //   L6: bit 13 EXTER (CIA-B)
        //   L5: bit 12 DSKSYN, bit 11 RBF
        //   L4: bit 10 AUD3, bit 9 AUD2, bit 8 AUD1, bit 7 AUD0
        //   L3: bit 6 BLIT, bit 5 VERTB, bit 4 COPER
        //   L2: bit 3 PORTS (CIA-A)
        //   L1: bit 2 SOFT, bit 1 DSKBLK, bit 0 TBE
        if active & 0x2000 != 0 {
            return 6;
        } // EXTER
        if active & 0x1800 != 0 {
            return 5;
        } // DSKSYN, RBF
        if active & 0x0780 != 0 {
            return 4;
        } // AUD3-0
        if active & 0x0070 != 0 {
            return 3;
        } // BLIT, VERTB, COPER
        if active & 0x0008 != 0 {
            return 2;
        } // PORTS
        if active & 0x0007 != 0 {
            return 1;
        } // SOFT, DSKBLK, TBE

        0
    }

    // Disk

    pub fn poke_dsklen(&mut self, val: u16) {
        self.disk.poke_dsklen(val, self.adkcon);
    }

    /// Feed one bit from the drive; raises DSKSYN on a sync match.
    pub fn disk_shift_in(&mut self, bit: bool, now: Cycle) {
        if self.disk.shift_in(bit, now) {
            self.raise(IrqSource::DskSyn);
        }
    }

    /// Granted disk read slot. Raises DSKBLK after the last word.
    pub fn disk_dma_read(&mut self) -> Option<u16> {
        let transfer = self.disk.dma_read_word()?;
        if transfer.block_done {
            self.raise(IrqSource::DskBlk);
        }
        Some(transfer.word)
    }

    /// Granted disk write slot. Raises DSKBLK after the last word.
    pub fn disk_dma_write(&mut self, word: u16) {
        if self.disk.dma_write_word(word) {
            self.raise(IrqSource::DskBlk);
        }
    }

    // Audio

    #[must_use]
    pub fn audio(&self, channel: usize) -> &AudioChannel {
        &self.audio[channel]
    }

    /// AUDxEN switched on: start the block and raise the channel interrupt.
    pub fn start_audio(&mut self, channel: usize) {
        self.audio[channel].start_dma();
        self.raise(IrqSource::audio(channel));
    }

    pub fn stop_audio(&mut self, channel: usize) {
        self.audio[channel].stop_dma();
    }

    /// Granted audio slot: store the fetched word.
    pub fn audio_fetch(&mut self, channel: usize, word: u16) {
        if self.audio[channel].fetch_dma_word(word) {
            self.raise(IrqSource::audio(channel));
        }
    }

    /// Period elapsed on `channel`. Returns the delay to the next sample,
    /// or `None` when the channel fell silent.
    pub fn audio_period(&mut self, channel: usize) -> Option<Cycle> {
        let ch = &mut self.audio[channel];
        ch.emit_sample();
        ch.is_playing().then(|| ch.period())
    }

    /// Write one Paula audio register (AUDx*), returning the channel it
    /// belongs to if handled.
    pub fn write_audio_register(&mut self, offset: u16, val: u16) -> Option<usize> {
        let (channel, reg) = audio_register(offset)?;
        let ch = &mut self.audio[channel];

        match reg {
            0 => ch.lc = (ch.lc & 0x0000_FFFF) | (u32::from(val) << 16),
            1 => ch.lc = (ch.lc & 0xFFFF_0000) | u32::from(val & 0xFFFE),
            2 => ch.len_words = val,
            3 => ch.per = val,
            4 => ch.vol = (val & 0x7F).min(64) as u8,
            5 => ch.write_dat(val),
            _ => {}
        }
        Some(channel)
    }
}

fn audio_register(offset: u16) -> Option<(usize, u16)> {
    if !(0x0A0..=0x0DA).contains(&offset) {
        return None;
    }
    let rel = offset - 0x0A0;
    Some((usize::from(rel / 0x10), (rel % 0x10) / 2))
}

impl Default for Paula8364 {
    fn default() -> Self {
        Self::new(DiskOptions::default())
    }
}

impl Component for Paula8364 {
    type Snapshot = PaulaState;

    fn reset(&mut self, hard: bool) {
        self.intena = 0;
        self.intreq = 0;
        self.adkcon = 0;
        self.ipl = 0;
        self.disk.reset(hard);
        self.audio = [AudioChannel::default(); 4];
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "intena: {:#06X}", self.intena)?;
        writeln!(out, "intreq: {:#06X}", self.intreq)?;
        writeln!(out, "adkcon: {:#06X}", self.adkcon)?;
        writeln!(out, "ipl:    {} (pending {})", self.ipl, self.compute_ipl())?;
        self.disk.dump(out)
    }

    fn snapshot(&self) -> PaulaState {
        PaulaState {
            intena: self.intena,
            intreq: self.intreq,
            adkcon: self.adkcon,
            ipl: self.ipl,
            disk: self.disk.info(),
        }
    }
}

impl Observable for Paula8364 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "intena" => Some(self.intena.into()),
            "intreq" => Some(self.intreq.into()),
            "adkcon" => Some(self.adkcon.into()),
            "ipl" => Some(self.ipl.into()),
            _ => {
                if let Some(rest) = path.strip_prefix("disk.") {
                    return self.disk.query(rest);
                }
                let rest = path.strip_prefix("audio")?;
                let (idx, field) = rest.split_once('.')?;
                let ch = self.audio.get(idx.parse::<usize>().ok()?)?;
                match field {
                    "per" => Some(ch.per.into()),
                    "vol" => Some(ch.vol.into()),
                    "dma" => Some(ch.is_dma_active().into()),
                    "sample" => Some(ch.output_sample().into()),
                    _ => None,
                }
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "intena",
            "intreq",
            "adkcon",
            "ipl",
            "disk.<path>",
            "audio<n>.per",
            "audio<n>.vol",
            "audio<n>.dma",
            "audio<n>.sample",
        ]
    }
}
