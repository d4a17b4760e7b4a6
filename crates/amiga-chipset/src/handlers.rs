//! One handler per event slot.

use commodore_agnus_ocs::{
    contract_violation, BlitStep, BusOwner, CopperState, DispatchTable, Event, EventId, EventSlot,
    ScheduleError, Scheduler, DMAF_BLTEN, DMAF_COPEN,
};
use commodore_paula_8364::IrqSource;
use emu_core::Cycle;

use crate::units::Units;

type Sched = Scheduler<Units>;

pub(crate) fn dispatch_table() -> DispatchTable<Units> {
    DispatchTable::new()
        .with(EventSlot::Disk, on_disk)
        .with(EventSlot::Audio0, on_audio)
        .with(EventSlot::Audio1, on_audio)
        .with(EventSlot::Audio2, on_audio)
        .with(EventSlot::Audio3, on_audio)
        .with(EventSlot::Raster, on_raster)
        .with(EventSlot::Copper, on_copper)
        .with(EventSlot::Blitter, on_blitter)
        .with(EventSlot::CiaA, on_cia)
        .with(EventSlot::CiaB, on_cia)
        .with(EventSlot::TodA, on_tod)
        .with(EventSlot::TodB, on_tod)
        .with(EventSlot::Motor, on_motor)
        .with(EventSlot::DiskChange0, on_disk_change)
        .with(EventSlot::DiskChange1, on_disk_change)
        .with(EventSlot::DiskChange2, on_disk_change)
        .with(EventSlot::DiskChange3, on_disk_change)
        .with(EventSlot::RegCopper, on_reg_write)
        .with(EventSlot::RegCpu, on_reg_write)
        .with(EventSlot::Irq, on_irq)
        .with(EventSlot::Inspector, on_inspector)
}

fn on_disk(units: &mut Units, sched: &mut Sched, _slot: EventSlot, _event: Event) {
    units.rotate_disk(sched);
}

fn on_audio(units: &mut Units, sched: &mut Sched, slot: EventSlot, _event: Event) {
    let ch = slot.index() - EventSlot::Audio0.index();
    if let Some(period) = units.paula.audio_period(ch) {
        sched.schedule_rel(slot, period, EventId::AudioPeriod, 0);
    }
}

fn on_raster(units: &mut Units, sched: &mut Sched, slot: EventSlot, event: Event) {
    units.agnus.end_line();
    if sched.beam().v == 0 {
        units.copper.restart_cop1();
        units.paula.raise(IrqSource::Vertb);
        units.kick_copper(sched);
        units.sync_ipl(sched);
    }
    sched.schedule_next_line(slot, event.id, 0);
}

fn on_copper(units: &mut Units, sched: &mut Sched, slot: EventSlot, event: Event) {
    if !units.agnus.dma_enabled(DMAF_COPEN) {
        return;
    }
    match event.id {
        EventId::CopperFetch => units.copper_fetch(sched),
        EventId::CopperWakeup => {
            if units.copper.wake(sched.beam()) {
                units.kick_copper(sched);
            } else if units.copper.state == CopperState::Wait {
                units.copper_wait(sched);
            }
        }
        id => contract_violation(ScheduleError::UnexpectedEvent { slot, id }),
    }
}

fn on_blitter(units: &mut Units, sched: &mut Sched, _slot: EventSlot, _event: Event) {
    if !units.blitter.is_busy() || !units.agnus.dma_enabled(DMAF_BLTEN) {
        return;
    }
    if units.blitter.wants_bus() && !units.granted(sched, BusOwner::Blitter) {
        units.schedule_blitter(sched, EventId::BlitterStep);
        return;
    }
    match units.blitter.step(&mut units.memory) {
        BlitStep::Continue => units.schedule_blitter(sched, EventId::BlitterStep),
        BlitStep::Done => {
            log::trace!("blitter: done at {}", sched.now());
            units.paula.raise(IrqSource::Blit);
            units.sync_ipl(sched);
        }
    }
}

fn on_cia(units: &mut Units, sched: &mut Sched, slot: EventSlot, event: Event) {
    let cia = if slot == EventSlot::CiaA {
        &mut units.cia_a
    } else {
        &mut units.cia_b
    };
    cia.tick();
    let active = cia.is_active();
    units.sync_cia_irqs(sched);
    if active {
        sched.schedule_rel(slot, Cycle::eclock(1), event.id, 0);
    }
}

fn on_tod(units: &mut Units, sched: &mut Sched, slot: EventSlot, event: Event) {
    if slot == EventSlot::TodA {
        units.cia_a.tod_pulse();
        sched.schedule_next_frame(slot, event.id, 0);
    } else {
        units.cia_b.tod_pulse();
        sched.schedule_next_line(slot, event.id, 0);
    }
    units.sync_cia_irqs(sched);
}

fn on_motor(units: &mut Units, sched: &mut Sched, _slot: EventSlot, _event: Event) {
    let now = sched.now();
    for drive in &mut units.drives {
        if drive.finish_spin_up(now) {
            log::debug!("df{}: motor at speed", drive.number());
        }
    }
    units.arm_motor(sched);
    units.refresh_drive_status();
}

fn on_disk_change(units: &mut Units, _sched: &mut Sched, slot: EventSlot, event: Event) {
    let drive = slot.index() - EventSlot::DiskChange0.index();
    match event.id {
        EventId::DiskInsert => units.complete_disk_change(drive, true),
        EventId::DiskEject => units.complete_disk_change(drive, false),
        id => contract_violation(ScheduleError::UnexpectedEvent { slot, id }),
    }
}

fn on_reg_write(units: &mut Units, sched: &mut Sched, _slot: EventSlot, event: Event) {
    units.apply_reg_write(sched, event.payload);
}

fn on_irq(units: &mut Units, sched: &mut Sched, _slot: EventSlot, _event: Event) {
    units.deliver_ipl(sched);
}

fn on_inspector(units: &mut Units, sched: &mut Sched, slot: EventSlot, event: Event) {
    units.inspect();
    sched.inspect();
    sched.schedule_rel(slot, units.inspection_interval(), event.id, 0);
}
