//! Audio channel state machine.
//!
//! Each channel keeps one word playing and one word buffered. The chipset
//! calls [`AudioChannel::emit_sample`] from the channel's audio slot once per
//! period, and [`AudioChannel::fetch_dma_word`] whenever the arbiter granted
//! the channel's fixed DMA slot.

use emu_core::Cycle;

pub const MIN_AUDIO_PERIOD_CCK: u16 = 124;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioChannel {
    pub(crate) lc: u32,
    ptr: u32,
    pub(crate) len_words: u16,
    words_remaining: u32,
    pub(crate) per: u16,
    pub(crate) vol: u8,
    pub(crate) dat: u16,
    current_word: Option<u16>,
    next_word: Option<u16>,
    next_byte_is_hi: bool,
    output_sample: i8,
    dma_active: bool,
}

impl Default for AudioChannel {
    fn default() -> Self {
        Self {
            lc: 0,
            ptr: 0,
            len_words: 0,
            words_remaining: 0,
            per: MIN_AUDIO_PERIOD_CCK,
            vol: 0,
            dat: 0,
            current_word: None,
            next_word: None,
            next_byte_is_hi: true,
            output_sample: 0,
            dma_active: false,
        }
    }
}

impl AudioChannel {
    fn effective_period(&self) -> u16 {
        self.per.max(MIN_AUDIO_PERIOD_CCK)
    }

    /// Time between two samples.
    #[must_use]
    pub fn period(&self) -> Cycle {
        Cycle::cck(i64::from(self.effective_period()))
    }

    fn programmed_length_words(&self) -> u32 {
        if self.len_words == 0 {
            65_536
        } else {
            u32::from(self.len_words)
        }
    }

    #[must_use]
    pub fn is_dma_active(&self) -> bool {
        self.dma_active
    }

    /// Something is queued for output, so the period slot should keep running.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.dma_active || self.current_word.is_some() || self.next_word.is_some()
    }

    #[must_use]
    pub fn output_sample(&self) -> i8 {
        self.output_sample
    }

    pub fn start_dma(&mut self) {
        self.reload();
        self.current_word = None;
        self.next_word = None;
        self.next_byte_is_hi = true;
        self.dma_active = true;
    }

    pub fn stop_dma(&mut self) {
        self.dma_active = false;
        self.current_word = None;
        self.next_word = None;
        self.next_byte_is_hi = true;
    }

    fn reload(&mut self) {
        self.ptr = self.lc & 0x00FF_FFFE;
        self.words_remaining = self.programmed_length_words();
    }

    pub(crate) fn write_dat(&mut self, val: u16) {
        self.dat = val;
        // Without DMA the CPU feeds the DAC through AUDxDAT.
        if !self.dma_active {
            self.current_word = Some(val);
            self.next_word = None;
            self.next_byte_is_hi = true;
        }
    }

    /// One playing word and one buffered word are not both present yet.
    #[must_use]
    pub fn wants_word(&self) -> bool {
        self.dma_active && (self.current_word.is_none() || self.next_word.is_none())
    }

    /// Chip RAM address of the next DMA fetch.
    #[must_use]
    pub fn fetch_address(&self) -> u32 {
        self.ptr
    }

    /// Store a word read at [`Self::fetch_address`]. Returns `true` when the
    /// block ended and the channel reloaded from AUDxLC (audio interrupt).
    pub fn fetch_dma_word(&mut self, word: u16) -> bool {
        if !self.wants_word() {
            return false;
        }

        self.ptr = self.ptr.wrapping_add(2);
        self.words_remaining = self.words_remaining.saturating_sub(1);
        self.dat = word;
        if self.current_word.is_none() {
            self.current_word = Some(word);
            self.next_byte_is_hi = true;
        } else {
            self.next_word = Some(word);
        }

        if self.words_remaining == 0 {
            self.reload();
            return true;
        }
        false
    }

    /// Period elapsed: move the next byte to the DAC.
    pub fn emit_sample(&mut self) {
        if self.current_word.is_none()
            && let Some(next) = self.next_word.take()
        {
            self.current_word = Some(next);
            self.next_byte_is_hi = true;
        }

        let Some(word) = self.current_word else {
            return;
        };

        let [hi, lo] = word.to_be_bytes();
        if self.next_byte_is_hi {
            self.output_sample = hi as i8;
            self.next_byte_is_hi = false;
            return;
        }

        self.output_sample = lo as i8;
        self.next_byte_is_hi = true;
        self.current_word = self.next_word.take();
    }
}
