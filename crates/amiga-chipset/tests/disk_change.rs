use amiga_chipset::commodore_agnus_ocs::{EventId, EventSlot};
use amiga_chipset::drive_amiga_floppy::FloppyDisk;
use amiga_chipset::{Chipset, ChipsetConfig, ChipsetError};
use emu_core::Cycle;

const PRA_CHNG: u8 = 0x04;
const PRA_TK0: u8 = 0x10;

fn chipset() -> Chipset {
    Chipset::new(ChipsetConfig::default()).expect("valid config")
}

fn select_df0(chipset: &mut Chipset) {
    chipset.write_cia_b(0x03, 0xFF);
    chipset.write_cia_b(0x01, 0xF7); // /SEL0 low, motor off
}

fn has_disk(chipset: &Chipset) -> bool {
    chipset.drive(0).is_some_and(|drive| drive.has_disk())
}

#[test]
fn missing_drives_are_rejected() {
    let mut chipset = chipset();
    assert!(matches!(
        chipset.insert_disk(1, FloppyDisk::blank(), Cycle::ZERO),
        Err(ChipsetError::DriveNotConnected(1))
    ));
    assert!(matches!(
        chipset.eject_disk(7, Cycle::ZERO),
        Err(ChipsetError::DriveNotConnected(7))
    ));
}

#[test]
fn bad_track_images_are_rejected() {
    let mut chipset = chipset();
    let result = chipset.insert_tracks(0, vec![vec![0xAA; 16]; 3], Cycle::ZERO);
    assert!(matches!(result, Err(ChipsetError::Disk(_))));
}

#[test]
fn insertion_happens_after_the_delay() {
    let mut chipset = chipset();
    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::cck(100))
        .expect("df0 is connected");

    chipset.advance(Cycle::cck(99));
    assert!(!has_disk(&chipset));
    chipset.advance(Cycle::cck(100));
    assert!(has_disk(&chipset));
}

#[test]
fn disk_change_line_clears_on_step() {
    let mut chipset = chipset();
    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::ZERO)
        .expect("df0 is connected");
    select_df0(&mut chipset);
    chipset.advance(Cycle::cck(1));

    let pra = chipset.read_cia_a(0x00);
    assert_eq!(pra & PRA_CHNG, 0, "change latched since power on");
    assert_eq!(pra & PRA_TK0, 0, "head on cylinder 0");

    chipset.write_cia_b(0x01, 0xF6); // step pulse, outward
    chipset.write_cia_b(0x01, 0xF7);
    assert_ne!(chipset.read_cia_a(0x00) & PRA_CHNG, 0);
}

#[test]
fn swapping_disks_keeps_the_drive_empty_for_a_while() {
    let mut chipset = chipset();
    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::ZERO)
        .expect("df0 is connected");
    chipset.advance(Cycle::cck(10));
    assert!(has_disk(&chipset));

    let protected = FloppyDisk::blank().write_protected(true);
    chipset
        .insert_disk(0, protected, Cycle::ZERO)
        .expect("df0 is connected");
    assert!(!has_disk(&chipset), "old disk comes out at once");

    let event = chipset.scheduler().event(EventSlot::DiskChange0);
    assert_eq!(event.id, EventId::DiskInsert);
    assert_eq!(event.trigger, chipset.now() + chipset.clock().millis(1500));
}

#[test]
fn later_request_replaces_a_pending_one() {
    let mut chipset = chipset();
    chipset
        .eject_disk(0, Cycle::cck(100))
        .expect("df0 is connected");
    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::cck(10))
        .expect("df0 is connected");

    chipset.advance(Cycle::cck(200));
    assert!(has_disk(&chipset));
    assert!(!chipset.scheduler().is_pending(EventSlot::DiskChange0));
}

#[test]
fn eject_removes_the_disk() {
    let mut chipset = chipset();
    chipset
        .insert_disk(0, FloppyDisk::blank(), Cycle::ZERO)
        .expect("df0 is connected");
    chipset.eject_disk(0, Cycle::cck(5)).expect("df0 is connected");
    chipset.advance(Cycle::cck(4));
    assert!(has_disk(&chipset));
    chipset.advance(Cycle::cck(5));
    assert!(!has_disk(&chipset));
}
