use amiga_chipset::{Chipset, ChipsetConfig};
use emu_core::{Component, Cycle};

#[test]
fn inspector_publishes_on_its_interval() {
    let mut chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    let inspector = chipset.inspector();
    let interval = chipset.clock().millis(100);
    assert_eq!(inspector.scheduler.read().clock, Cycle::ZERO);

    chipset.advance(interval - Cycle::new(1));
    assert_eq!(inspector.scheduler.read().clock, Cycle::ZERO);

    chipset.advance(interval);
    let info = inspector.scheduler.read();
    assert_eq!(info.clock, interval);
    assert!(info.dispatched > 0);
    assert_eq!(inspector.cia_a.read().tod.counter, 5);
}

#[test]
fn inspector_handles_work_from_another_thread() {
    let chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    let inspector = chipset.inspector();
    chipset.inspect();

    let handle = std::thread::spawn(move || inspector.drives[0].read().connected);
    assert!(handle.join().expect("reader thread"));
}

#[test]
fn snapshot_carries_scheduler_state() {
    let mut chipset = Chipset::new(ChipsetConfig::default()).expect("valid config");
    chipset.advance(Cycle::cck(1000));
    let state = chipset.snapshot();
    assert_eq!(state.scheduler.clock, Cycle::cck(1000));
    assert_eq!(state.cia_a.tod.counter, 0);
}
