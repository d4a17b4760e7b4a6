use amiga_chipset::commodore_agnus_ocs::{EventId, EventSlot};
use amiga_chipset::{Chipset, ChipsetConfig};
use emu_core::Cycle;

const REG_DDFSTRT: u16 = 0x092;
const REG_DMACON: u16 = 0x096;
const REG_INTENA: u16 = 0x09A;
const REG_BPL1MOD: u16 = 0x108;
const REG_BPL2MOD: u16 = 0x10A;

fn chipset() -> Chipset {
    Chipset::new(ChipsetConfig::default()).expect("valid config")
}

#[test]
fn display_registers_land_two_colour_clocks_after_a_cpu_write() {
    let mut chipset = chipset();
    chipset.advance(Cycle::cck(10));
    chipset.write_custom_reg(REG_BPL1MOD, 0x0028);

    let event = chipset.scheduler().event(EventSlot::RegCpu);
    assert_eq!(event.id, EventId::RegWrite);
    assert_eq!(event.trigger, Cycle::cck(12));
    assert_eq!(chipset.agnus().bpl1mod, 0);

    chipset.advance(Cycle::cck(12) - Cycle::new(1));
    assert_eq!(chipset.agnus().bpl1mod, 0);
    chipset.advance(Cycle::cck(12));
    assert_eq!(chipset.agnus().bpl1mod, 0x28);
    assert!(!chipset.scheduler().is_pending(EventSlot::RegCpu));
}

#[test]
fn second_write_lands_the_first_one_early() {
    let mut chipset = chipset();
    chipset.write_custom_reg(REG_BPL1MOD, 0x0010);
    chipset.advance(Cycle::new(4));
    chipset.write_custom_reg(REG_BPL2MOD, 0x0020);

    assert_eq!(chipset.agnus().bpl1mod, 0x10);
    assert_eq!(chipset.agnus().bpl2mod, 0);
    assert_eq!(
        chipset.scheduler().trigger(EventSlot::RegCpu),
        Cycle::new(4) + Cycle::cck(2)
    );

    chipset.advance(Cycle::cck(3));
    assert_eq!(chipset.agnus().bpl2mod, 0x20);
}

#[test]
fn control_registers_take_effect_at_once() {
    let mut chipset = chipset();
    chipset.write_custom_reg(REG_DMACON, 0x8200);
    chipset.write_custom_reg(REG_INTENA, 0xC000);
    assert_eq!(chipset.agnus().dmacon & 0x0200, 0x0200);
    assert_eq!(chipset.paula().intena, 0x4000);
    assert!(!chipset.scheduler().is_pending(EventSlot::RegCpu));
}

#[test]
fn cpu_and_copper_writes_are_tracked_apart() {
    let mut chipset = chipset();
    chipset.write_custom_reg(REG_DDFSTRT, 0x0038);
    assert!(chipset.scheduler().is_pending(EventSlot::RegCpu));
    assert!(!chipset.scheduler().is_pending(EventSlot::RegCopper));

    chipset.advance(Cycle::cck(2));
    assert_eq!(chipset.agnus().ddfstrt, 0x0038);
}
