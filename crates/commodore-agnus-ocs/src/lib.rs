//! Commodore Agnus OCS - event scheduler, DMA arbitration, copper, and blitter.
//!
//! Agnus is the master DMA controller in the Original Chip Set (OCS). It owns
//! the system bus during DMA slots and defines the beam timing every other
//! unit is synchronised to. This crate holds the chipset's event scheduler,
//! the beam geometry it schedules against, the per-CCK bus arbiter, and the
//! copper and blitter sequencers.

mod agnus;
pub mod arbiter;
pub mod beam;
mod blitter;
mod copper;
pub mod scheduler;

pub use agnus::{
    Agnus, DmaconChange, SlotClaim, DMAF_AUD0EN, DMAF_AUD1EN, DMAF_AUD2EN, DMAF_AUD3EN,
    DMAF_BBUSY, DMAF_BLTEN, DMAF_BLTPRI, DMAF_BPLEN, DMAF_BZERO, DMAF_COPEN, DMAF_DMAEN,
    DMAF_DSKEN, DMAF_SETCLR, DMAF_SPREN, LOWRES_DDF_TO_PLANE,
};
pub use arbiter::{BusArbiter, BusInfo, BusOwner, BusStats, DmaRequests, UnitRequests};
pub use beam::{Beam, BeamGeometry, Region, CCKS_PER_LINE};
pub use blitter::{BlitStep, Blitter};
pub use copper::{Copper, State as CopperState, Step as CopperStep};
pub use scheduler::{
    contract_violation, DispatchTable, Event, EventId, EventSlot, Handler, ScheduleError,
    Scheduler, SchedulerInfo, SchedulerState, SlotInfo, SLOT_COUNT,
};

/// Word-wide access to chip RAM, as seen by the DMA channels.
pub trait ChipMemory {
    fn read_word(&self, addr: u32) -> u16;
    fn write_word(&mut self, addr: u32, value: u16);
}
