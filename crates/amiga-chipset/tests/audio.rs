use amiga_chipset::commodore_agnus_ocs::EventSlot;
use amiga_chipset::{Chipset, ChipsetConfig};
use emu_core::Cycle;

const REG_DMACON: u16 = 0x096;
const REG_INTREQR: u16 = 0x01E;
const REG_AUD0LCH: u16 = 0x0A0;
const REG_AUD0LCL: u16 = 0x0A2;
const REG_AUD0LEN: u16 = 0x0A4;
const REG_AUD0PER: u16 = 0x0A6;
const REG_AUD0VOL: u16 = 0x0A8;

const INTREQ_AUD0: u16 = 0x0080;

fn playing_chipset(period: u16) -> Chipset {
    let mut chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    chipset.chip_ram_mut().load(0x5000, &[0x7F, 0x80, 0x10, 0x20]);
    chipset.write_custom_reg(REG_AUD0LCH, 0);
    chipset.write_custom_reg(REG_AUD0LCL, 0x5000);
    chipset.write_custom_reg(REG_AUD0LEN, 2);
    chipset.write_custom_reg(REG_AUD0PER, period);
    chipset.write_custom_reg(REG_AUD0VOL, 64);
    chipset.write_custom_reg(REG_DMACON, 0x8201); // DMAEN | AUD0EN
    chipset
}

#[test]
fn channel_start_raises_aud0_and_arms_its_slot() {
    let mut chipset = playing_chipset(200);
    assert_ne!(chipset.read_custom_reg(REG_INTREQR) & INTREQ_AUD0, 0);
    assert_eq!(
        chipset.scheduler().trigger(EventSlot::Audio0),
        Cycle::cck(200)
    );
}

#[test]
fn samples_follow_the_period() {
    let mut chipset = playing_chipset(200);
    chipset.advance(Cycle::cck(200));
    assert_eq!(chipset.paula().audio(0).output_sample(), 0x7F);
    chipset.advance(Cycle::cck(400));
    assert_eq!(chipset.paula().audio(0).output_sample(), -128);
}

#[test]
fn stopping_dma_cancels_the_slot() {
    let mut chipset = playing_chipset(200);
    chipset.advance(Cycle::cck(50));
    chipset.write_custom_reg(REG_DMACON, 0x0001);
    assert!(!chipset.scheduler().is_pending(EventSlot::Audio0));
}
