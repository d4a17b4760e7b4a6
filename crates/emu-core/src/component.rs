//! Lifecycle capability shared by chipset units.

use core::fmt;

/// Power-on/reset/dump lifecycle of a chipset unit.
///
/// Implemented independently by each unit. The scheduler does not use it;
/// it only forwards due events to the unit's dispatch callback.
pub trait Component {
    /// Plain copy of the unit's observable state.
    type Snapshot: Clone;

    /// Return to power-on state. A soft reset keeps state that survives the
    /// RESET line (for example a running TOD counter).
    fn reset(&mut self, hard: bool);

    /// Write a human-readable summary of the unit.
    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    fn snapshot(&self) -> Self::Snapshot;
}
