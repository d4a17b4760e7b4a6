//! Agnus - DMA control registers and the fixed slot map.

pub const DMAF_AUD0EN: u16 = 0x0001;
pub const DMAF_AUD1EN: u16 = 0x0002;
pub const DMAF_AUD2EN: u16 = 0x0004;
pub const DMAF_AUD3EN: u16 = 0x0008;
pub const DMAF_DSKEN: u16 = 0x0010;
pub const DMAF_SPREN: u16 = 0x0020;
pub const DMAF_BLTEN: u16 = 0x0040;
pub const DMAF_COPEN: u16 = 0x0080;
pub const DMAF_BPLEN: u16 = 0x0100;
pub const DMAF_DMAEN: u16 = 0x0200;
pub const DMAF_BLTPRI: u16 = 0x0400;
pub const DMAF_BZERO: u16 = 0x2000;
pub const DMAF_BBUSY: u16 = 0x4000;
pub const DMAF_SETCLR: u16 = 0x8000;

/// Maps ddfseq position (0-7) within an 8-CCK group to bitplane index.
/// From Minimig Verilog: plane = {~ddfseq[0], ~ddfseq[1], ~ddfseq[2]}.
/// None = free slot (available for copper/CPU).
pub const LOWRES_DDF_TO_PLANE: [Option<u8>; 8] = [
    None,    // 0: free
    Some(3), // 1: BPL4
    Some(5), // 2: BPL6
    Some(1), // 3: BPL2
    None,    // 4: free
    Some(2), // 5: BPL3
    Some(4), // 6: BPL5
    Some(0), // 7: BPL1 (triggers shift register load)
];

/// The reserved claim on one colour clock, before any unit asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotClaim {
    /// Nobody reserves this slot; copper, blitter and CPU compete for it.
    Free,
    Refresh,
    Disk,
    Audio(u8),
    Sprite(u8),
    Bitplane(u8),
}

/// Effective DMA enables before and after a DMACON write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaconChange {
    pub before: u16,
    pub after: u16,
}

impl DmaconChange {
    /// `bit` went from off to on.
    #[must_use]
    pub fn switched_on(self, bit: u16) -> bool {
        self.before & bit == 0 && self.after & bit != 0
    }

    /// `bit` went from on to off.
    #[must_use]
    pub fn switched_off(self, bit: u16) -> bool {
        self.before & bit != 0 && self.after & bit == 0
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Agnus {
    pub dmacon: u16,
    pub bplcon0: u16,
    pub bpl_pt: [u32; 6],
    pub ddfstrt: u16,
    pub ddfstop: u16,
    pub bpl1mod: i16,
    pub bpl2mod: i16,
    pub spr_pt: [u32; 8],
    pub dsk_pt: u32,
    /// Bitplane fetches happened on the current line.
    pub fetched_this_line: bool,
}

impl Agnus {
    pub fn new() -> Self {
        Self {
            dmacon: 0,
            bplcon0: 0,
            bpl_pt: [0; 6],
            ddfstrt: 0,
            ddfstop: 0,
            bpl1mod: 0,
            bpl2mod: 0,
            spr_pt: [0; 8],
            dsk_pt: 0,
            fetched_this_line: false,
        }
    }

    pub fn num_bitplanes(&self) -> u8 {
        let bpl_bits = (self.bplcon0 >> 12) & 0x07;
        if bpl_bits > 6 { 6 } else { bpl_bits as u8 }
    }

    pub fn dma_enabled(&self, bit: u16) -> bool {
        (self.dmacon & DMAF_DMAEN) != 0 && (self.dmacon & bit) != 0
    }

    /// Channel enables with the master switch folded in.
    #[must_use]
    pub fn effective_dma(&self) -> u16 {
        if self.dmacon & DMAF_DMAEN != 0 {
            self.dmacon & 0x01FF
        } else {
            0
        }
    }

    /// BLTPRI: the blitter goes ahead of the CPU.
    #[must_use]
    pub fn blitter_nasty(&self) -> bool {
        self.dmacon & DMAF_BLTPRI != 0
    }

    /// SET/CLR write to DMACON.
    pub fn poke_dmacon(&mut self, value: u16) -> DmaconChange {
        let before = self.effective_dma();
        let bits = value & 0x07FF;
        if value & DMAF_SETCLR != 0 {
            self.dmacon |= bits;
        } else {
            self.dmacon &= !bits;
        }
        DmaconChange {
            before,
            after: self.effective_dma(),
        }
    }

    /// DMACONR, with the blitter status bits supplied by the caller.
    #[must_use]
    pub fn dmaconr(&self, blitter_busy: bool, blitter_zero: bool) -> u16 {
        let mut value = self.dmacon & 0x07FF;
        if blitter_busy {
            value |= DMAF_BBUSY;
        }
        if blitter_zero {
            value |= DMAF_BZERO;
        }
        value
    }

    /// Who reserves colour clock `hpos` on the current line.
    pub fn slot_claim(&self, hpos: u16) -> SlotClaim {
        match hpos {
            0x01..=0x03 | 0x1B => SlotClaim::Refresh,
            0x04..=0x06 if self.dma_enabled(DMAF_DSKEN) => SlotClaim::Disk,
            0x07..=0x0A => {
                let channel = (hpos - 0x07) as u8;
                if self.dma_enabled(DMAF_AUD0EN << channel) {
                    SlotClaim::Audio(channel)
                } else {
                    SlotClaim::Free
                }
            }
            0x0B..=0x1A if self.dma_enabled(DMAF_SPREN) => {
                SlotClaim::Sprite(((hpos - 0x0B) / 2) as u8)
            }
            0x1C..=0xE2 => self.bitplane_claim(hpos),
            _ => SlotClaim::Free,
        }
    }

    // Fetch window runs from DDFSTRT to DDFSTOP+7. Within each 8-CCK group,
    // planes are fetched in the interleaved order of LOWRES_DDF_TO_PLANE.
    fn bitplane_claim(&self, hpos: u16) -> SlotClaim {
        let num_bpl = self.num_bitplanes();
        if self.dma_enabled(DMAF_BPLEN)
            && num_bpl > 0
            && hpos >= self.ddfstrt
            && hpos <= self.ddfstop + 7
        {
            let pos_in_group = ((hpos - self.ddfstrt) % 8) as usize;
            if let Some(plane) = LOWRES_DDF_TO_PLANE[pos_in_group]
                && plane < num_bpl
            {
                return SlotClaim::Bitplane(plane);
            }
        }
        SlotClaim::Free
    }

    /// A bitplane fetch was granted; the data itself goes to Denise.
    pub fn bitplane_fetched(&mut self, plane: u8) {
        let idx = usize::from(plane);
        self.bpl_pt[idx] = self.bpl_pt[idx].wrapping_add(2);
        self.fetched_this_line = true;
    }

    /// End of a line: add the bitplane modulos if anything was fetched.
    pub fn end_line(&mut self) {
        if !self.fetched_this_line {
            return;
        }
        for (plane, pt) in self.bpl_pt.iter_mut().enumerate() {
            let modulo = if plane % 2 == 0 { self.bpl1mod } else { self.bpl2mod };
            *pt = pt.wrapping_add_signed(i32::from(modulo));
        }
        self.fetched_this_line = false;
    }

    /// A disk DMA word moved; returns the address it used.
    pub fn next_disk_address(&mut self) -> u32 {
        let addr = self.dsk_pt;
        self.dsk_pt = self.dsk_pt.wrapping_add(2);
        addr
    }
}

impl Default for Agnus {
    fn default() -> Self {
        Self::new()
    }
}
