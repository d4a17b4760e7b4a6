//! Disk controller - DSKLEN/DSKSYNC/DSKBYTR and the read/write sequencer.
//!
//! The controller never looks at the clock on its own. The chipset's disk
//! slot feeds it one bit per bit cell ([`DiskController::shift_in`] while
//! reading, [`DiskController::shift_out`] while writing), and the bus step
//! moves whole words between the FIFO and chip RAM whenever the arbiter
//! grants a disk slot.

use core::fmt;

use emu_core::{Component, Cycle, InfoCell, Observable, Value};

/// One MFM bit cell (2 us) in master ticks.
pub const TICKS_PER_BIT_CELL: i64 = 56;

/// Standard AmigaDOS sync word.
pub const DEFAULT_DSKSYNC: u16 = 0x4489;

/// Bytes the controller buffers between the drive and DMA.
pub const FIFO_CAPACITY: usize = 6;

/// Bits without a sync match before auto-sync fakes one.
const AUTO_SYNC_BITS: u32 = 8 * 20_000;

const ADKF_WORDSYNC: u16 = 0x0400;
const DSKLEN_DMAEN: u16 = 0x8000;
const DSKLEN_WRITE: u16 = 0x4000;
const DSKLEN_COUNT: u16 = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriveState {
    #[default]
    Off,
    WaitSync,
    Read,
    Write,
    /// Last words are in the FIFO, waiting to reach the disk.
    Flush,
}

impl DriveState {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::WaitSync => "wait-sync",
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
        }
    }
}

impl fmt::Display for DriveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte FIFO between the shift register and the DMA channel.
///
/// Index 0 is the oldest byte. Pushing into a full FIFO discards the oldest
/// byte, so the length never exceeds [`FIFO_CAPACITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fifo {
    buf: [u8; FIFO_CAPACITY],
    len: usize,
}

impl Fifo {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == FIFO_CAPACITY
    }

    #[must_use]
    pub fn has_word(&self) -> bool {
        self.len >= 2
    }

    #[must_use]
    pub fn has_room_for_word(&self) -> bool {
        self.len + 2 <= FIFO_CAPACITY
    }

    pub fn push(&mut self, byte: u8) {
        if self.is_full() {
            self.buf.copy_within(1.., 0);
            self.len -= 1;
        }
        self.buf[self.len] = byte;
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[0];
        self.buf.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(byte)
    }

    pub fn push_word(&mut self, word: u16) {
        let [hi, lo] = word.to_be_bytes();
        self.push(hi);
        self.push(lo);
    }

    pub fn pop_word(&mut self) -> Option<u16> {
        if !self.has_word() {
            return None;
        }
        let hi = self.pop()?;
        let lo = self.pop()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Buffered bytes, oldest first.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Behaviour switches taken from the chipset configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskOptions {
    /// Fake a sync match when none has been seen for a long time.
    pub auto_dsksync: bool,
    /// Ignore DSKSYNC writes other than $4489.
    pub lock_dsksync: bool,
}

/// A word moved from the FIFO to chip RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub word: u16,
    /// This was the last word of the block.
    pub block_done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskControllerInfo {
    pub state: DriveState,
    pub selected: Option<u8>,
    pub dsklen: u16,
    pub dsksync: u16,
    pub fifo: Fifo,
    pub shift: u16,
    pub incoming: u8,
    pub byte_ready: bool,
}

#[derive(Debug, Clone)]
pub struct DiskController {
    state: DriveState,
    dsklen: u16,
    dsksync: u16,
    fifo: Fifo,
    // Read side
    shift: u16,
    bit_count: u8,
    incoming: u8,
    byte_ready: bool,
    sync_cycle: Option<Cycle>,
    bits_since_sync: u32,
    // Write side
    out_shift: u8,
    out_bits: u8,
    selected: Option<u8>,
    options: DiskOptions,
    published: InfoCell<DiskControllerInfo>,
}

impl DiskController {
    pub fn new(options: DiskOptions) -> Self {
        Self {
            state: DriveState::Off,
            dsklen: 0,
            dsksync: DEFAULT_DSKSYNC,
            fifo: Fifo::default(),
            shift: 0,
            bit_count: 0,
            incoming: 0,
            byte_ready: false,
            sync_cycle: None,
            bits_since_sync: 0,
            out_shift: 0,
            out_bits: 0,
            selected: None,
            options,
            published: InfoCell::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> DriveState {
        self.state
    }

    #[must_use]
    pub fn fifo(&self) -> &Fifo {
        &self.fifo
    }

    #[must_use]
    pub fn dsklen(&self) -> u16 {
        self.dsklen
    }

    #[must_use]
    pub fn dsksync(&self) -> u16 {
        self.dsksync
    }

    /// Words left in the current block.
    #[must_use]
    pub fn remaining(&self) -> u16 {
        self.dsklen & DSKLEN_COUNT
    }

    /// Drive the head is currently connected to (CIA-B PRB select lines).
    #[must_use]
    pub fn selected(&self) -> Option<u8> {
        self.selected
    }

    pub fn select(&mut self, drive: Option<u8>) {
        self.selected = drive;
    }

    /// Head writes instead of reads.
    #[must_use]
    pub fn is_writing(&self) -> bool {
        matches!(self.state, DriveState::Write | DriveState::Flush)
    }

    fn set_state(&mut self, state: DriveState) {
        if state != self.state {
            log::debug!("disk: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// DSKLEN write. DMA starts on the second consecutive write with bit 15
    /// set; any write with bit 15 clear stops it.
    pub fn poke_dsklen(&mut self, value: u16, adkcon: u16) {
        let old = self.dsklen;
        self.dsklen = value;

        if value & DSKLEN_DMAEN == 0 {
            self.set_state(DriveState::Off);
            self.fifo.clear();
            return;
        }
        if old & DSKLEN_DMAEN == 0 {
            return;
        }

        self.fifo.clear();
        self.out_bits = 0;
        if old & value & DSKLEN_WRITE != 0 {
            self.set_state(DriveState::Write);
        } else if adkcon & ADKF_WORDSYNC != 0 {
            self.set_state(DriveState::WaitSync);
        } else {
            self.set_state(DriveState::Read);
        }
    }

    pub fn poke_dsksync(&mut self, value: u16) {
        if self.options.lock_dsksync && value != DEFAULT_DSKSYNC {
            log::debug!("disk: DSKSYNC write {value:#06X} ignored (locked)");
            return;
        }
        self.dsksync = value;
    }

    /// DSKBYTR. Reading clears the byte-ready flag.
    ///
    /// `dma_enabled` is the DSKEN bit as seen by Agnus.
    pub fn peek_dskbytr(&mut self, dma_enabled: bool, now: Cycle) -> u16 {
        let value = self.spy_dskbytr(dma_enabled, now);
        self.byte_ready = false;
        value
    }

    /// DSKBYTR without side effects.
    #[must_use]
    pub fn spy_dskbytr(&self, dma_enabled: bool, now: Cycle) -> u16 {
        let mut value = u16::from(self.incoming);
        if self.byte_ready {
            value |= 0x8000;
        }
        if dma_enabled && self.state != DriveState::Off {
            value |= 0x4000;
        }
        if self.dsklen & DSKLEN_WRITE != 0 {
            value |= 0x2000;
        }
        if self
            .sync_cycle
            .is_some_and(|at| now - at < Cycle::new(TICKS_PER_BIT_CELL))
        {
            value |= 0x1000;
        }
        value
    }

    /// One bit arrives from the selected drive. Returns `true` when the shift
    /// register matched the sync word (the DSKSYN interrupt).
    pub fn shift_in(&mut self, bit: bool, now: Cycle) -> bool {
        self.shift = (self.shift << 1) | u16::from(bit);
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.bit_count = 0;
            self.incoming = self.shift as u8;
            self.byte_ready = true;
            if self.state == DriveState::Read {
                self.fifo.push(self.incoming);
            }
        }

        self.bits_since_sync = self.bits_since_sync.saturating_add(1);
        let matched = self.shift == self.dsksync;
        let forced = self.options.auto_dsksync && self.bits_since_sync > AUTO_SYNC_BITS;
        if !(matched || forced) {
            return false;
        }

        log::debug!(
            "disk: sync {} (dsklen {:#06X})",
            if matched { "found" } else { "forced" },
            self.dsklen
        );
        self.sync_cycle = Some(now);
        self.bits_since_sync = 0;
        // Data following the sync word starts on a byte boundary.
        self.bit_count = 0;
        if self.state == DriveState::WaitSync {
            self.set_state(DriveState::Read);
            self.fifo.clear();
        }
        true
    }

    /// Next bit for the head while writing, or `None` when there is nothing
    /// to write this cell.
    pub fn shift_out(&mut self) -> Option<bool> {
        if !self.is_writing() {
            return None;
        }
        if self.out_bits == 0 {
            match self.fifo.pop() {
                Some(byte) => {
                    self.out_shift = byte;
                    self.out_bits = 8;
                }
                None => {
                    self.finish_flush();
                    return None;
                }
            }
        }

        let bit = self.out_shift & 0x80 != 0;
        self.out_shift <<= 1;
        self.out_bits -= 1;
        if self.out_bits == 0 && self.fifo.is_empty() {
            self.finish_flush();
        }
        Some(bit)
    }

    fn finish_flush(&mut self) {
        if self.state == DriveState::Flush {
            self.set_state(DriveState::Off);
        }
    }

    /// The controller would use a disk DMA slot this cycle.
    #[must_use]
    pub fn wants_dma(&self) -> bool {
        if self.remaining() == 0 {
            return false;
        }
        match self.state {
            DriveState::Read => self.fifo.has_word(),
            DriveState::Write => self.fifo.has_room_for_word(),
            _ => false,
        }
    }

    /// Granted read slot: take one word out of the FIFO.
    pub fn dma_read_word(&mut self) -> Option<Transfer> {
        if self.state != DriveState::Read || self.remaining() == 0 {
            return None;
        }
        let word = self.fifo.pop_word()?;
        let block_done = self.count_word();
        if block_done {
            self.set_state(DriveState::Off);
        }
        Some(Transfer { word, block_done })
    }

    /// Granted write slot: queue one word read from chip RAM. Returns `true`
    /// when this was the last word of the block.
    pub fn dma_write_word(&mut self, word: u16) -> bool {
        if self.state != DriveState::Write
            || self.remaining() == 0
            || !self.fifo.has_room_for_word()
        {
            return false;
        }
        self.fifo.push_word(word);
        let block_done = self.count_word();
        if block_done {
            self.set_state(DriveState::Flush);
        }
        block_done
    }

    fn count_word(&mut self) -> bool {
        let remaining = self.remaining() - 1;
        self.dsklen = (self.dsklen & !DSKLEN_COUNT) | remaining;
        remaining == 0
    }

    #[must_use]
    pub fn info(&self) -> DiskControllerInfo {
        DiskControllerInfo {
            state: self.state,
            selected: self.selected,
            dsklen: self.dsklen,
            dsksync: self.dsksync,
            fifo: self.fifo,
            shift: self.shift,
            incoming: self.incoming,
            byte_ready: self.byte_ready,
        }
    }

    pub fn inspect(&self) {
        self.published.publish(self.info());
    }

    #[must_use]
    pub fn info_cell(&self) -> InfoCell<DiskControllerInfo> {
        self.published.clone()
    }
}

impl Component for DiskController {
    type Snapshot = DiskControllerInfo;

    fn reset(&mut self, _hard: bool) {
        let published = self.published.clone();
        *self = Self::new(self.options);
        self.published = published;
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "state:    {}", self.state)?;
        writeln!(out, "dsklen:   {:#06X} ({} words left)", self.dsklen, self.remaining())?;
        writeln!(out, "dsksync:  {:#06X}", self.dsksync)?;
        writeln!(out, "fifo:     {:02X?}", self.fifo.contents())?;
        writeln!(out, "shift:    {:#06X}", self.shift)?;
        match self.selected {
            Some(drive) => writeln!(out, "selected: df{drive}"),
            None => writeln!(out, "selected: none"),
        }
    }

    fn snapshot(&self) -> DiskControllerInfo {
        self.info()
    }
}

impl Observable for DiskController {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "state" => Some(self.state.name().into()),
            "dsklen" => Some(self.dsklen.into()),
            "dsksync" => Some(self.dsksync.into()),
            "fifo.len" => Some((self.fifo.len() as u8).into()),
            "fifo" => Some(Value::Array(
                self.fifo.contents().iter().map(|&b| b.into()).collect(),
            )),
            "shift" => Some(self.shift.into()),
            "selected" => Some(self.selected.map_or(Value::from("none"), Value::from)),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["state", "dsklen", "dsksync", "fifo.len", "fifo", "shift", "selected"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Cycle = Cycle::ZERO;

    fn feed_word(dc: &mut DiskController, word: u16, now: Cycle) -> bool {
        let mut synced = false;
        for i in (0..16).rev() {
            synced |= dc.shift_in(word & (1 << i) != 0, now);
        }
        synced
    }

    fn start_read(dc: &mut DiskController, words: u16, adkcon: u16) {
        dc.poke_dsklen(0x8000 | words, adkcon);
        dc.poke_dsklen(0x8000 | words, adkcon);
    }

    #[test]
    fn full_fifo_drops_oldest_byte() {
        let mut fifo = Fifo::default();
        for byte in 1..=6 {
            fifo.push(byte);
        }
        assert!(fifo.is_full());
        fifo.push(7);
        assert_eq!(fifo.len(), 6);
        assert_eq!(fifo.contents(), &[2, 3, 4, 5, 6, 7]);
        assert_eq!(fifo.pop_word(), Some(0x0203));
    }

    #[test]
    fn dma_needs_two_dsklen_writes() {
        let mut dc = DiskController::new(DiskOptions::default());
        dc.poke_dsklen(0x8010, 0);
        assert_eq!(dc.state(), DriveState::Off);
        dc.poke_dsklen(0x8010, 0);
        assert_eq!(dc.state(), DriveState::Read);

        dc.poke_dsklen(0x0000, 0);
        assert_eq!(dc.state(), DriveState::Off);
        assert!(dc.fifo().is_empty());
    }

    #[test]
    fn write_mode_needs_bit_14_in_both_writes() {
        let mut dc = DiskController::new(DiskOptions::default());
        dc.poke_dsklen(0xC004, 0);
        dc.poke_dsklen(0xC004, 0);
        assert_eq!(dc.state(), DriveState::Write);
        assert!(dc.is_writing());
    }

    #[test]
    fn wordsync_waits_for_sync_then_reads_following_bytes() {
        let mut dc = DiskController::new(DiskOptions::default());
        start_read(&mut dc, 2, ADKF_WORDSYNC);
        assert_eq!(dc.state(), DriveState::WaitSync);

        assert!(!feed_word(&mut dc, 0xAAAA, NOW));
        assert!(feed_word(&mut dc, 0x4489, NOW));
        assert_eq!(dc.state(), DriveState::Read);
        assert!(dc.fifo().is_empty());

        feed_word(&mut dc, 0x1234, NOW);
        assert_eq!(dc.fifo().contents(), &[0x12, 0x34]);
        assert!(dc.wants_dma());
    }

    #[test]
    fn last_read_word_signals_block_done() {
        let mut dc = DiskController::new(DiskOptions::default());
        start_read(&mut dc, 2, 0);
        feed_word(&mut dc, 0x1111, NOW);
        feed_word(&mut dc, 0x2222, NOW);

        let first = dc.dma_read_word();
        assert_eq!(first, Some(Transfer { word: 0x1111, block_done: false }));
        let second = dc.dma_read_word();
        assert_eq!(second, Some(Transfer { word: 0x2222, block_done: true }));
        assert_eq!(dc.state(), DriveState::Off);
        assert_eq!(dc.remaining(), 0);
        assert!(!dc.wants_dma());
    }

    #[test]
    fn write_block_flushes_before_turning_off() {
        let mut dc = DiskController::new(DiskOptions::default());
        dc.poke_dsklen(0xC001, 0);
        dc.poke_dsklen(0xC001, 0);
        assert!(dc.dma_write_word(0xF00F));
        assert_eq!(dc.state(), DriveState::Flush);

        let bits: Vec<bool> = std::iter::from_fn(|| dc.shift_out()).collect();
        assert_eq!(bits.len(), 16);
        assert!(bits[0] && !bits[4] && bits[15]);
        assert_eq!(dc.state(), DriveState::Off);
    }

    #[test]
    fn locked_dsksync_ignores_other_values() {
        let mut dc = DiskController::new(DiskOptions {
            lock_dsksync: true,
            ..DiskOptions::default()
        });
        dc.poke_dsksync(0x1234);
        assert_eq!(dc.dsksync(), DEFAULT_DSKSYNC);

        let mut dc = DiskController::new(DiskOptions::default());
        dc.poke_dsksync(0x1234);
        assert_eq!(dc.dsksync(), 0x1234);
    }

    #[test]
    fn dskbytr_reports_byte_ready_once() {
        let mut dc = DiskController::new(DiskOptions::default());
        for i in (0..8).rev() {
            dc.shift_in(0xA5 & (1 << i) != 0, NOW);
        }
        let first = dc.peek_dskbytr(false, NOW);
        assert_eq!(first & 0x80FF, 0x80A5);
        assert_eq!(dc.peek_dskbytr(false, NOW) & 0x8000, 0);
    }

    #[test]
    fn dskbytr_status_bits() {
        let mut dc = DiskController::new(DiskOptions::default());
        dc.poke_dsklen(0xC010, 0);
        dc.poke_dsklen(0xC010, 0);
        let value = dc.spy_dskbytr(true, NOW);
        assert_ne!(value & 0x4000, 0, "DMAON");
        assert_ne!(value & 0x2000, 0, "DSKWRITE");
        assert_eq!(dc.spy_dskbytr(false, NOW) & 0x4000, 0);
    }

    #[test]
    fn wordequal_lasts_one_bit_cell() {
        let mut dc = DiskController::new(DiskOptions::default());
        let at = Cycle::new(1_000);
        feed_word(&mut dc, 0x4489, at);
        assert_ne!(dc.spy_dskbytr(false, at) & 0x1000, 0);
        let later = at + Cycle::new(TICKS_PER_BIT_CELL);
        assert_eq!(dc.spy_dskbytr(false, later) & 0x1000, 0);
    }

    #[test]
    fn auto_sync_fires_without_a_sync_mark() {
        let mut dc = DiskController::new(DiskOptions {
            auto_dsksync: true,
            ..DiskOptions::default()
        });
        start_read(&mut dc, 1, ADKF_WORDSYNC);
        let synced = (0..=AUTO_SYNC_BITS).any(|_| dc.shift_in(false, NOW));
        assert!(synced);
        assert_eq!(dc.state(), DriveState::Read);
    }

    #[test]
    fn stalled_read_overflows_fifo_without_error() {
        let mut dc = DiskController::new(DiskOptions::default());
        start_read(&mut dc, 8, 0);
        for word in [0x0102, 0x0304, 0x0506, 0x0708] {
            feed_word(&mut dc, word, NOW);
        }
        assert_eq!(dc.fifo().contents(), &[3, 4, 5, 6, 7, 8]);
    }
}
