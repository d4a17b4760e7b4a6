//! Chip RAM as seen by the DMA channels.

use commodore_agnus_ocs::ChipMemory;

#[derive(Clone)]
pub struct ChipRam {
    data: Vec<u8>,
    mask: u32,
}

impl ChipRam {
    /// `size` must be a power of two; addresses wrap at that size.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            mask: (size as u32).wrapping_sub(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.data[(addr & self.mask) as usize]
    }

    pub fn write_byte(&mut self, addr: u32, val: u8) {
        self.data[(addr & self.mask) as usize] = val;
    }

    /// Copy `bytes` in starting at `addr`, wrapping at the top.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), b);
        }
    }

    /// Store big-endian words starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u16]) {
        for (i, &w) in words.iter().enumerate() {
            self.write_word(addr.wrapping_add(2 * i as u32), w);
        }
    }
}

impl ChipMemory for ChipRam {
    fn read_word(&self, addr: u32) -> u16 {
        let addr = addr & !1;
        u16::from_be_bytes([self.read_byte(addr), self.read_byte(addr + 1)])
    }

    fn write_word(&mut self, addr: u32, value: u16) {
        let addr = addr & !1;
        let [hi, lo] = value.to_be_bytes();
        self.write_byte(addr, hi);
        self.write_byte(addr + 1, lo);
    }
}

impl std::fmt::Debug for ChipRam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChipRam").field("size", &self.data.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_big_endian() {
        let mut ram = ChipRam::new(512 * 1024);
        ram.write_word(0x100, 0x1234);
        assert_eq!(ram.read_byte(0x100), 0x12);
        assert_eq!(ram.read_byte(0x101), 0x34);
        assert_eq!(ram.read_word(0x101), 0x1234, "odd address is word aligned");
    }

    #[test]
    fn addresses_wrap_at_installed_size() {
        let mut ram = ChipRam::new(256 * 1024);
        ram.write_byte(0x4_0010, 0xEE);
        assert_eq!(ram.read_byte(0x0010), 0xEE);
    }

    #[test]
    fn load_words_places_consecutive_words() {
        let mut ram = ChipRam::new(256 * 1024);
        ram.load_words(0x2000, &[0xAAAA, 0x4489]);
        assert_eq!(ram.read_word(0x2002), 0x4489);
    }
}
