//! Core types for cycle-accurate chipset emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.

mod clock;
mod component;
mod cycle;
mod info;
mod observable;

pub use clock::MasterClock;
pub use component::Component;
pub use cycle::{Cycle, TICKS_PER_CCK, TICKS_PER_CPU, TICKS_PER_ECLOCK};
pub use info::InfoCell;
pub use observable::{Observable, Value};
