use amiga_chipset::commodore_agnus_ocs::ChipMemory;
use amiga_chipset::{Chipset, ChipsetConfig};
use emu_core::Cycle;

const REG_DMACONR: u16 = 0x002;
const REG_BLTCON0: u16 = 0x040;
const REG_BLTCON1: u16 = 0x042;
const REG_BLTAFWM: u16 = 0x044;
const REG_BLTALWM: u16 = 0x046;
const REG_BLTAPTH: u16 = 0x050;
const REG_BLTAPTL: u16 = 0x052;
const REG_BLTDPTH: u16 = 0x054;
const REG_BLTDPTL: u16 = 0x056;
const REG_BLTSIZE: u16 = 0x058;
const REG_DMACON: u16 = 0x096;
const REG_INTREQR: u16 = 0x01E;

const DMACONR_BBUSY: u16 = 0x4000;
const INTREQ_BLIT: u16 = 0x0040;

fn start_copy(chipset: &mut Chipset, src: u32, dst: u32, words: u16) {
    chipset.write_custom_reg(REG_BLTCON0, 0x09F0); // USEA | USED, D = A
    chipset.write_custom_reg(REG_BLTCON1, 0);
    chipset.write_custom_reg(REG_BLTAFWM, 0xFFFF);
    chipset.write_custom_reg(REG_BLTALWM, 0xFFFF);
    chipset.write_custom_reg(REG_BLTAPTH, (src >> 16) as u16);
    chipset.write_custom_reg(REG_BLTAPTL, src as u16);
    chipset.write_custom_reg(REG_BLTDPTH, (dst >> 16) as u16);
    chipset.write_custom_reg(REG_BLTDPTL, dst as u16);
    chipset.write_custom_reg(REG_BLTSIZE, (1 << 6) | words);
}

#[test]
fn copy_blit_runs_on_the_bus_and_raises_blit() {
    let mut chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    chipset
        .chip_ram_mut()
        .load_words(0x3000, &[0x1111, 0x2222, 0x3333, 0x4444]);
    chipset.write_custom_reg(REG_DMACON, 0x8240); // DMAEN | BLTEN
    start_copy(&mut chipset, 0x3000, 0x4000, 4);
    assert_ne!(chipset.read_custom_reg(REG_DMACONR) & DMACONR_BBUSY, 0);

    chipset.advance(Cycle::cck(227));

    let copied: Vec<u16> = (0..4)
        .map(|i| chipset.chip_ram().read_word(0x4000 + 2 * i))
        .collect();
    assert_eq!(copied, vec![0x1111, 0x2222, 0x3333, 0x4444]);
    assert_eq!(chipset.read_custom_reg(REG_DMACONR) & DMACONR_BBUSY, 0);
    assert_ne!(chipset.read_custom_reg(REG_INTREQR) & INTREQ_BLIT, 0);
}

#[test]
fn blit_waits_for_blten() {
    let mut chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    chipset.chip_ram_mut().load_words(0x3000, &[0xABCD]);
    start_copy(&mut chipset, 0x3000, 0x4000, 1);

    chipset.advance(Cycle::cck(227));
    assert!(chipset.blitter().is_busy());
    assert_eq!(chipset.chip_ram().read_word(0x4000), 0);

    chipset.write_custom_reg(REG_DMACON, 0x8240);
    chipset.advance_by(Cycle::cck(227));
    assert!(!chipset.blitter().is_busy());
    assert_eq!(chipset.chip_ram().read_word(0x4000), 0xABCD);
}
