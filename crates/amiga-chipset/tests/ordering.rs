use amiga_chipset::commodore_paula_8364::TICKS_PER_BIT_CELL;
use amiga_chipset::drive_amiga_floppy::FloppyDisk;
use amiga_chipset::{Chipset, ChipsetConfig};
use emu_core::Cycle;

const REG_INTREQR: u16 = 0x01E;
const REG_DSKPTH: u16 = 0x020;
const REG_DSKPTL: u16 = 0x022;
const REG_DSKLEN: u16 = 0x024;
const REG_DMACON: u16 = 0x096;
const REG_INTENA: u16 = 0x09A;

const INTREQ_DSKBLK: u16 = 0x0002;
const INTREQ_PORTS: u16 = 0x0008;

#[test]
fn disk_block_and_tod_alarm_on_one_cycle_follow_slot_order() {
    // Two bit cells per disk slot firing: one word every eight firings.
    let config = ChipsetConfig {
        drive_speed: 2,
        ..ChipsetConfig::default()
    };
    let mut chipset = Chipset::new(config).expect("valid config");
    let frame = Cycle::new(chipset.geometry().ticks_per_frame());
    let word = Cycle::new(8 * TICKS_PER_BIT_CELL);

    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::ZERO)
        .expect("df0 is connected");

    // CIA-A TOD alarm on the first VSYNC pulse.
    chipset.write_cia_a(0x0F, 0x80);
    chipset.write_cia_a(0x0A, 0x00);
    chipset.write_cia_a(0x09, 0x00);
    chipset.write_cia_a(0x08, 0x01);
    chipset.write_cia_a(0x0F, 0x00);
    chipset.write_cia_a(0x0D, 0x84);
    chipset.write_custom_reg(REG_INTENA, 0xC000 | INTREQ_DSKBLK | INTREQ_PORTS);

    // Start df0 so that a word boundary lands on the frame boundary.
    chipset.advance(Cycle::new(frame.get() % word.get()));
    chipset.write_cia_b(0x03, 0xFF);
    chipset.write_cia_b(0x01, 0x77); // /MTR and /SEL0 low

    // One-word read, no sync, started just after the previous word.
    chipset.advance(frame - word + Cycle::cck(1));
    chipset.write_custom_reg(REG_DSKPTH, 0x0000);
    chipset.write_custom_reg(REG_DSKPTL, 0x2000);
    chipset.write_custom_reg(REG_DMACON, 0x8210); // DMAEN | DSKEN
    chipset.write_custom_reg(REG_DSKLEN, 0x8001);
    chipset.write_custom_reg(REG_DSKLEN, 0x8001);

    chipset.advance(frame - Cycle::new(1));
    let intreq = chipset.read_custom_reg(REG_INTREQR);
    assert_eq!(intreq & (INTREQ_DSKBLK | INTREQ_PORTS), 0);
    assert!(chipset.pending_ipl_changes().is_empty());

    chipset.advance(frame);
    let intreq = chipset.read_custom_reg(REG_INTREQR);
    assert_ne!(intreq & INTREQ_DSKBLK, 0);
    assert_ne!(intreq & INTREQ_PORTS, 0);
    assert_eq!(chipset.agnus().dsk_pt, 0x2002);
    // The disk slot ran first: level 1 was queued before the alarm's level 2.
    assert_eq!(
        chipset.pending_ipl_changes(),
        vec![(frame + Cycle::cck(2), 1), (frame + Cycle::cck(2), 2)]
    );

    chipset.advance(frame + Cycle::cck(2));
    assert_eq!(chipset.ipl(), 2);
    assert!(chipset.pending_ipl_changes().is_empty());
}
