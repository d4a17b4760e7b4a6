//! Event scheduler: the only place where chipset time moves forward.
//!
//! Every unit that must act at an exact cycle owns one or more
//! [`EventSlot`]s. A slot holds at most one pending [`Event`]; scheduling
//! into an occupied slot replaces what was there. [`Scheduler::advance`]
//! moves the clock to a target cycle and hands each due event to the
//! handler registered for its slot in the [`DispatchTable`].
//!
//! Events that share a trigger cycle run in slot order (the order of
//! [`EventSlot::ALL`], lowest first). A handler may schedule further events,
//! including into its own slot at the current cycle; anything that falls due
//! at or before the target runs before `advance` returns.

use core::fmt;

use emu_core::{Cycle, InfoCell, Observable, Value};
use thiserror::Error;

use crate::beam::{Beam, BeamGeometry};

pub const SLOT_COUNT: usize = 21;

/// Named single-occupancy event holders, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EventSlot {
    /// Disk controller bit clock.
    Disk,
    Audio0,
    Audio1,
    Audio2,
    Audio3,
    /// Line and frame sync.
    Raster,
    Copper,
    Blitter,
    CiaA,
    CiaB,
    /// CIA-A time-of-day input (VSYNC).
    TodA,
    /// CIA-B time-of-day input (HSYNC).
    TodB,
    /// Drive motor spin-up.
    Motor,
    DiskChange0,
    DiskChange1,
    DiskChange2,
    DiskChange3,
    /// Copper MOVE to a register Agnus samples late.
    RegCopper,
    /// CPU write to a register Agnus samples late.
    RegCpu,
    /// Delayed interrupt level propagation to the CPU.
    Irq,
    Inspector,
}

impl EventSlot {
    pub const ALL: [EventSlot; SLOT_COUNT] = [
        EventSlot::Disk,
        EventSlot::Audio0,
        EventSlot::Audio1,
        EventSlot::Audio2,
        EventSlot::Audio3,
        EventSlot::Raster,
        EventSlot::Copper,
        EventSlot::Blitter,
        EventSlot::CiaA,
        EventSlot::CiaB,
        EventSlot::TodA,
        EventSlot::TodB,
        EventSlot::Motor,
        EventSlot::DiskChange0,
        EventSlot::DiskChange1,
        EventSlot::DiskChange2,
        EventSlot::DiskChange3,
        EventSlot::RegCopper,
        EventSlot::RegCpu,
        EventSlot::Irq,
        EventSlot::Inspector,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Audio slot for `channel` (0-3).
    #[must_use]
    pub const fn audio(channel: usize) -> Self {
        match channel & 3 {
            0 => EventSlot::Audio0,
            1 => EventSlot::Audio1,
            2 => EventSlot::Audio2,
            _ => EventSlot::Audio3,
        }
    }

    /// Disk change slot for drive `drive` (0-3).
    #[must_use]
    pub const fn disk_change(drive: usize) -> Self {
        match drive & 3 {
            0 => EventSlot::DiskChange0,
            1 => EventSlot::DiskChange1,
            2 => EventSlot::DiskChange2,
            _ => EventSlot::DiskChange3,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EventSlot::Disk => "DSK",
            EventSlot::Audio0 => "AUD0",
            EventSlot::Audio1 => "AUD1",
            EventSlot::Audio2 => "AUD2",
            EventSlot::Audio3 => "AUD3",
            EventSlot::Raster => "RAS",
            EventSlot::Copper => "COP",
            EventSlot::Blitter => "BLT",
            EventSlot::CiaA => "CIAA",
            EventSlot::CiaB => "CIAB",
            EventSlot::TodA => "TODA",
            EventSlot::TodB => "TODB",
            EventSlot::Motor => "MOT",
            EventSlot::DiskChange0 => "DCH0",
            EventSlot::DiskChange1 => "DCH1",
            EventSlot::DiskChange2 => "DCH2",
            EventSlot::DiskChange3 => "DCH3",
            EventSlot::RegCopper => "RCOP",
            EventSlot::RegCpu => "RCPU",
            EventSlot::Irq => "IRQ",
            EventSlot::Inspector => "INS",
        }
    }

    /// Whether `id` is meaningful for this slot.
    #[must_use]
    pub const fn accepts(self, id: EventId) -> bool {
        match self {
            EventSlot::Disk => matches!(id, EventId::DiskRotate),
            EventSlot::Audio0 | EventSlot::Audio1 | EventSlot::Audio2 | EventSlot::Audio3 => {
                matches!(id, EventId::AudioPeriod)
            }
            EventSlot::Raster => matches!(id, EventId::LineStart),
            EventSlot::Copper => matches!(id, EventId::CopperFetch | EventId::CopperWakeup),
            EventSlot::Blitter => matches!(id, EventId::BlitterStart | EventId::BlitterStep),
            EventSlot::CiaA | EventSlot::CiaB => matches!(id, EventId::CiaExecute),
            EventSlot::TodA | EventSlot::TodB => matches!(id, EventId::TodPulse),
            EventSlot::Motor => matches!(id, EventId::MotorCheck),
            EventSlot::DiskChange0
            | EventSlot::DiskChange1
            | EventSlot::DiskChange2
            | EventSlot::DiskChange3 => matches!(id, EventId::DiskInsert | EventId::DiskEject),
            EventSlot::RegCopper | EventSlot::RegCpu => matches!(id, EventId::RegWrite),
            EventSlot::Irq => matches!(id, EventId::IplChange),
            EventSlot::Inspector => matches!(id, EventId::Inspect),
        }
    }
}

impl fmt::Display for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What it means for a slot to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventId {
    #[default]
    None,
    DiskRotate,
    AudioPeriod,
    LineStart,
    CopperFetch,
    CopperWakeup,
    BlitterStart,
    BlitterStep,
    CiaExecute,
    TodPulse,
    MotorCheck,
    DiskInsert,
    DiskEject,
    /// Payload: register offset in bits 16-24, value in bits 0-15.
    RegWrite,
    IplChange,
    Inspect,
}

/// One pending activity: when, what, and an opaque value for the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub trigger: Cycle,
    pub id: EventId,
    pub payload: u64,
}

impl Event {
    pub const NONE: Self = Self {
        trigger: Cycle::NEVER,
        id: EventId::None,
        payload: 0,
    };

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.trigger.is_never()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::NONE
    }
}

/// Scheduler contract violations.
///
/// These are bugs in the caller, not emulated hardware conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("{slot}: trigger {trigger} lies before the current cycle {now}")]
    PastTrigger {
        slot: EventSlot,
        trigger: Cycle,
        now: Cycle,
    },
    #[error("advance target {target} lies before the current cycle {now}")]
    TimeReversal { target: Cycle, now: Cycle },
    #[error("advance called from inside a dispatch callback")]
    Reentrant,
    #[error("{slot} does not handle {id:?}")]
    UnexpectedEvent { slot: EventSlot, id: EventId },
    #[error("no handler registered for {slot}")]
    MissingHandler { slot: EventSlot },
    #[error("beam position ({v}, {h}) lies outside the frame")]
    BeamOutOfRange { v: u16, h: u16 },
}

/// Report a contract violation.
///
/// Debug builds stop right here. Release builds log and carry on, and the
/// caller turns the offending operation into a no-op.
#[track_caller]
pub fn contract_violation(err: ScheduleError) {
    if cfg!(debug_assertions) {
        panic!("scheduler contract violation: {err}");
    }
    log::warn!("scheduler contract violation ignored: {err}");
}

/// Callback invoked when a slot's event falls due.
///
/// The slot has already been cleared; the handler reschedules it if the
/// unit wants to run again.
pub type Handler<C> = fn(&mut C, &mut Scheduler<C>, EventSlot, Event);

/// Slot-indexed handler table, built once and handed to [`Scheduler::new`].
pub struct DispatchTable<C> {
    handlers: [Option<Handler<C>>; SLOT_COUNT],
}

impl<C> DispatchTable<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: [None; SLOT_COUNT],
        }
    }

    /// Builder form of [`DispatchTable::register`].
    #[must_use]
    pub fn with(mut self, slot: EventSlot, handler: Handler<C>) -> Self {
        self.register(slot, handler);
        self
    }

    pub fn register(&mut self, slot: EventSlot, handler: Handler<C>) {
        self.handlers[slot.index()] = Some(handler);
    }

    #[must_use]
    pub fn handler(&self, slot: EventSlot) -> Option<Handler<C>> {
        self.handlers[slot.index()]
    }
}

impl<C> Default for DispatchTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for DispatchTable<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers,
        }
    }
}

impl<C> fmt::Debug for DispatchTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = EventSlot::ALL
            .iter()
            .filter(|slot| self.handlers[slot.index()].is_some())
            .map(|slot| slot.name())
            .collect();
        f.debug_struct("DispatchTable")
            .field("registered", &registered)
            .finish()
    }
}

/// Plain copy of the clock and every slot, for an external serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerState {
    pub clock: Cycle,
    pub slots: [Event; SLOT_COUNT],
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotInfo {
    pub slot: EventSlot,
    pub event: Event,
    /// Cycles until the event fires, if pending.
    pub due_in: Option<Cycle>,
    /// Beam position of the trigger, if it falls in the current frame.
    pub beam: Option<Beam>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerInfo {
    pub clock: Cycle,
    pub frame: i64,
    pub beam: Beam,
    pub next_trigger: Cycle,
    pub dispatched: u64,
    pub slots: Vec<SlotInfo>,
}

/// The chipset's clock and event table.
///
/// `C` is the context handed to every handler: whatever owns the units the
/// slots belong to. The scheduler never looks inside it.
pub struct Scheduler<C> {
    clock: Cycle,
    next_trigger: Cycle,
    slots: [Event; SLOT_COUNT],
    table: DispatchTable<C>,
    geometry: BeamGeometry,
    dispatching: bool,
    dispatched: u64,
    published: InfoCell<SchedulerInfo>,
}

impl<C> Scheduler<C> {
    #[must_use]
    pub fn new(geometry: BeamGeometry, table: DispatchTable<C>) -> Self {
        Self {
            clock: Cycle::ZERO,
            next_trigger: Cycle::NEVER,
            slots: [Event::NONE; SLOT_COUNT],
            table,
            geometry,
            dispatching: false,
            dispatched: 0,
            published: InfoCell::default(),
        }
    }

    /// Current master cycle.
    #[must_use]
    pub fn now(&self) -> Cycle {
        self.clock
    }

    /// Earliest pending trigger, or [`Cycle::NEVER`].
    #[must_use]
    pub fn next_trigger(&self) -> Cycle {
        self.next_trigger
    }

    #[must_use]
    pub fn geometry(&self) -> BeamGeometry {
        self.geometry
    }

    #[must_use]
    pub fn beam(&self) -> Beam {
        self.geometry.beam(self.clock)
    }

    #[must_use]
    pub fn frame(&self) -> i64 {
        self.geometry.frame(self.clock)
    }

    #[must_use]
    pub fn is_pending(&self, slot: EventSlot) -> bool {
        self.slots[slot.index()].is_pending()
    }

    #[must_use]
    pub fn trigger(&self, slot: EventSlot) -> Cycle {
        self.slots[slot.index()].trigger
    }

    #[must_use]
    pub fn event(&self, slot: EventSlot) -> Event {
        self.slots[slot.index()]
    }

    /// True while a handler is running.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Total number of events dispatched since power-on.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Schedule `id` on `slot` at absolute cycle `at`, replacing anything
    /// already pending there.
    pub fn schedule_abs(&mut self, slot: EventSlot, at: Cycle, id: EventId, payload: u64) {
        if !slot.accepts(id) {
            contract_violation(ScheduleError::UnexpectedEvent { slot, id });
            return;
        }
        if at.is_never() {
            self.cancel(slot);
            return;
        }

        let mut at = at;
        if at < self.clock {
            contract_violation(ScheduleError::PastTrigger {
                slot,
                trigger: at,
                now: self.clock,
            });
            at = self.clock;
        }

        let old = self.slots[slot.index()].trigger;
        self.slots[slot.index()] = Event {
            trigger: at,
            id,
            payload,
        };
        self.trigger_moved(old, at);
    }

    /// Schedule `delta` cycles from now.
    pub fn schedule_rel(&mut self, slot: EventSlot, delta: Cycle, id: EventId, payload: u64) {
        self.schedule_abs(slot, self.clock + delta, id, payload);
    }

    /// Schedule `delta` cycles after the slot's current trigger (or after
    /// now, if nothing is pending). Keeps periodic events free of drift.
    pub fn schedule_inc(&mut self, slot: EventSlot, delta: Cycle, id: EventId, payload: u64) {
        let base = match self.slots[slot.index()].trigger {
            t if t.is_never() => self.clock,
            t => t,
        };
        self.schedule_abs(slot, base + delta, id, payload);
    }

    /// Move the pending event to `at`, keeping its id and payload.
    pub fn reschedule_abs(&mut self, slot: EventSlot, at: Cycle) {
        let event = self.slots[slot.index()];
        self.schedule_abs(slot, at, event.id, event.payload);
    }

    pub fn reschedule_rel(&mut self, slot: EventSlot, delta: Cycle) {
        self.reschedule_abs(slot, self.clock + delta);
    }

    /// Schedule at beam position `beam` of the current frame.
    pub fn schedule_pos(&mut self, slot: EventSlot, beam: Beam, id: EventId, payload: u64) {
        if !self.geometry.is_valid(beam) {
            contract_violation(ScheduleError::BeamOutOfRange {
                v: beam.v,
                h: beam.h,
            });
            return;
        }
        let at = self.geometry.cycle_in_frame(self.clock, beam);
        self.schedule_abs(slot, at, id, payload);
    }

    /// Schedule at the start of the next line.
    pub fn schedule_next_line(&mut self, slot: EventSlot, id: EventId, payload: u64) {
        let at = self.geometry.next_line(self.clock);
        self.schedule_abs(slot, at, id, payload);
    }

    /// Schedule at the start of the next frame.
    pub fn schedule_next_frame(&mut self, slot: EventSlot, id: EventId, payload: u64) {
        let at = self.geometry.next_frame(self.clock);
        self.schedule_abs(slot, at, id, payload);
    }

    pub fn cancel(&mut self, slot: EventSlot) {
        let old = self.slots[slot.index()].trigger;
        self.slots[slot.index()] = Event::NONE;
        if old == self.next_trigger {
            self.recompute_next_trigger();
        }
    }

    /// Move the clock to `target`, dispatching every event due at or before
    /// it in (trigger, slot) order.
    pub fn advance(&mut self, target: Cycle, ctx: &mut C) {
        if self.dispatching {
            contract_violation(ScheduleError::Reentrant);
            return;
        }
        if target < self.clock {
            contract_violation(ScheduleError::TimeReversal {
                target,
                now: self.clock,
            });
            return;
        }
        if target < self.next_trigger {
            self.clock = target;
            return;
        }

        self.dispatching = true;
        while !self.next_trigger.is_never() && self.next_trigger <= target {
            let due = self.next_trigger;
            self.clock = due;

            let Some(slot) = EventSlot::ALL
                .into_iter()
                .find(|slot| self.slots[slot.index()].trigger == due)
            else {
                // next_trigger always names a pending slot
                self.recompute_next_trigger();
                continue;
            };

            let event = self.slots[slot.index()];
            self.slots[slot.index()] = Event::NONE;
            self.recompute_next_trigger();
            self.dispatch(slot, event, ctx);
        }
        self.clock = target;
        self.dispatching = false;
    }

    fn dispatch(&mut self, slot: EventSlot, event: Event, ctx: &mut C) {
        if !slot.accepts(event.id) {
            contract_violation(ScheduleError::UnexpectedEvent { slot, id: event.id });
            return;
        }
        let Some(handler) = self.table.handler(slot) else {
            contract_violation(ScheduleError::MissingHandler { slot });
            return;
        };
        log::trace!("{slot} {:?} @ {} (payload {})", event.id, event.trigger, event.payload);
        self.dispatched += 1;
        handler(ctx, self, slot, event);
    }

    fn trigger_moved(&mut self, old: Cycle, new: Cycle) {
        if new < self.next_trigger {
            self.next_trigger = new;
        } else if old == self.next_trigger && new > old {
            self.recompute_next_trigger();
        }
    }

    fn recompute_next_trigger(&mut self) {
        self.next_trigger = self
            .slots
            .iter()
            .map(|event| event.trigger)
            .min()
            .unwrap_or(Cycle::NEVER);
    }

    #[must_use]
    pub fn snapshot(&self) -> SchedulerState {
        SchedulerState {
            clock: self.clock,
            slots: self.slots,
        }
    }

    /// Replace the clock and every slot. Not allowed from inside a handler.
    ///
    /// A pending slot must hold an id it accepts and a trigger no earlier
    /// than the restored clock; otherwise nothing is changed. Inert slots
    /// come back as [`Event::NONE`].
    pub fn restore(&mut self, state: &SchedulerState) -> Result<(), ScheduleError> {
        if self.dispatching {
            return Err(ScheduleError::Reentrant);
        }
        for (slot, event) in EventSlot::ALL.into_iter().zip(&state.slots) {
            if !event.is_pending() {
                continue;
            }
            if !slot.accepts(event.id) {
                return Err(ScheduleError::UnexpectedEvent { slot, id: event.id });
            }
            if event.trigger < state.clock {
                return Err(ScheduleError::PastTrigger {
                    slot,
                    trigger: event.trigger,
                    now: state.clock,
                });
            }
        }

        self.clock = state.clock;
        self.slots = state
            .slots
            .map(|event| if event.is_pending() { event } else { Event::NONE });
        self.recompute_next_trigger();
        Ok(())
    }

    #[must_use]
    pub fn info(&self) -> SchedulerInfo {
        let frame_end = self.geometry.next_frame(self.clock);
        let slots = EventSlot::ALL
            .into_iter()
            .map(|slot| {
                let event = self.slots[slot.index()];
                let pending = event.is_pending();
                SlotInfo {
                    slot,
                    event,
                    due_in: pending.then(|| event.trigger - self.clock),
                    beam: (pending && event.trigger < frame_end)
                        .then(|| self.geometry.beam(event.trigger)),
                }
            })
            .collect();

        SchedulerInfo {
            clock: self.clock,
            frame: self.frame(),
            beam: self.beam(),
            next_trigger: self.next_trigger,
            dispatched: self.dispatched,
            slots,
        }
    }

    /// Publish a fresh [`SchedulerInfo`] for inspector threads.
    pub fn inspect(&self) {
        self.published.publish(self.info());
    }

    /// Handle to the published [`SchedulerInfo`].
    #[must_use]
    pub fn info_cell(&self) -> InfoCell<SchedulerInfo> {
        self.published.clone()
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.clock)
            .field("next_trigger", &self.next_trigger)
            .field("dispatching", &self.dispatching)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<C> Observable for Scheduler<C> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "clock" => Some(self.clock.into()),
            "next_trigger" => Some(self.next_trigger.into()),
            "dispatched" => Some(self.dispatched.into()),
            "beam.v" => Some(self.beam().v.into()),
            "beam.h" => Some(self.beam().h.into()),
            _ => {
                let name = path.strip_prefix("slot.")?;
                let slot = EventSlot::ALL.into_iter().find(|s| s.name() == name)?;
                Some(self.trigger(slot).into())
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "clock",
            "next_trigger",
            "dispatched",
            "beam.v",
            "beam.h",
            "slot.<name>",
        ]
    }
}
