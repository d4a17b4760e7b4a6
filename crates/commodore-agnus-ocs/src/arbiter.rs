//! Bus arbiter - who owns chip RAM during one colour clock.
//!
//! Runs once per CCK, whether or not any event is due. The decision is a
//! function of the request mask and a static priority table; the only state
//! carried between cycles is the audio round-robin pointer.

use emu_core::{InfoCell, Observable, Value};

use crate::agnus::SlotClaim;

/// Owner of the chip bus for one colour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BusOwner {
    /// Nobody asked for the bus.
    #[default]
    Idle,
    Cpu,
    Refresh,
    Disk,
    Audio(u8),
    Sprite(u8),
    Bitplane(u8),
    Copper,
    Blitter,
}

impl BusOwner {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BusOwner::Idle => "idle",
            BusOwner::Cpu => "cpu",
            BusOwner::Refresh => "refresh",
            BusOwner::Disk => "disk",
            BusOwner::Audio(_) => "audio",
            BusOwner::Sprite(_) => "sprite",
            BusOwner::Bitplane(_) => "bitplane",
            BusOwner::Copper => "copper",
            BusOwner::Blitter => "blitter",
        }
    }
}

/// Requester classes, as they appear in a priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Requester {
    Refresh,
    Disk,
    Audio,
    Sprite,
    Bitplane,
    Copper,
    Blitter,
    Cpu,
}

/// Highest priority first. The CPU goes ahead of the blitter.
pub const PRIORITY: [Requester; 8] = [
    Requester::Refresh,
    Requester::Disk,
    Requester::Audio,
    Requester::Sprite,
    Requester::Bitplane,
    Requester::Copper,
    Requester::Cpu,
    Requester::Blitter,
];

/// BLTPRI set: the blitter goes ahead of the CPU.
pub const PRIORITY_BLITTER_NASTY: [Requester; 8] = [
    Requester::Refresh,
    Requester::Disk,
    Requester::Audio,
    Requester::Sprite,
    Requester::Bitplane,
    Requester::Copper,
    Requester::Blitter,
    Requester::Cpu,
];

/// Which units actually want the bus this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitRequests {
    pub disk: bool,
    /// Bit n = audio channel n needs a sample word.
    pub audio: u8,
    pub copper: bool,
    pub blitter: bool,
    pub cpu: bool,
}

/// Request mask for one colour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaRequests {
    pub refresh: bool,
    pub disk: bool,
    pub audio: u8,
    pub sprite: Option<u8>,
    pub bitplane: Option<u8>,
    pub copper: bool,
    pub blitter: bool,
    pub cpu: bool,
}

impl DmaRequests {
    /// Combine the slot's reserved claim with what the units want.
    ///
    /// Fixed channels only request in their own slot. The copper may only
    /// use even colour clocks.
    #[must_use]
    pub fn for_slot(claim: SlotClaim, hpos: u16, wants: UnitRequests) -> Self {
        let mut req = DmaRequests {
            copper: wants.copper && hpos % 2 == 0,
            blitter: wants.blitter,
            cpu: wants.cpu,
            ..Self::default()
        };
        match claim {
            SlotClaim::Free => {}
            SlotClaim::Refresh => req.refresh = true,
            SlotClaim::Disk => req.disk = wants.disk,
            SlotClaim::Audio(channel) => req.audio = wants.audio & (1 << channel),
            SlotClaim::Sprite(n) => req.sprite = Some(n),
            SlotClaim::Bitplane(plane) => req.bitplane = Some(plane),
        }
        req
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Grant counters per owner class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusStats {
    pub idle: u64,
    pub cpu: u64,
    pub refresh: u64,
    pub disk: u64,
    pub audio: u64,
    pub sprite: u64,
    pub bitplane: u64,
    pub copper: u64,
    pub blitter: u64,
}

impl BusStats {
    fn record(&mut self, owner: BusOwner) {
        let counter = match owner {
            BusOwner::Idle => &mut self.idle,
            BusOwner::Cpu => &mut self.cpu,
            BusOwner::Refresh => &mut self.refresh,
            BusOwner::Disk => &mut self.disk,
            BusOwner::Audio(_) => &mut self.audio,
            BusOwner::Sprite(_) => &mut self.sprite,
            BusOwner::Bitplane(_) => &mut self.bitplane,
            BusOwner::Copper => &mut self.copper,
            BusOwner::Blitter => &mut self.blitter,
        };
        *counter += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusInfo {
    pub owner: BusOwner,
    pub stats: BusStats,
}

#[derive(Debug, Clone)]
pub struct BusArbiter {
    last_audio: u8,
    owner: BusOwner,
    stats: BusStats,
    published: InfoCell<BusInfo>,
}

impl BusArbiter {
    pub fn new() -> Self {
        Self {
            // so that channel 0 is first in the rotation
            last_audio: 3,
            owner: BusOwner::Idle,
            stats: BusStats::default(),
            published: InfoCell::default(),
        }
    }

    /// Pick this cycle's owner and remember it.
    pub fn arbitrate(&mut self, req: &DmaRequests, table: &[Requester; 8]) -> BusOwner {
        let owner = table
            .iter()
            .find_map(|&requester| self.grant(requester, req))
            .unwrap_or(BusOwner::Idle);
        if let BusOwner::Audio(channel) = owner {
            self.last_audio = channel;
        }
        self.owner = owner;
        self.stats.record(owner);
        owner
    }

    fn grant(&self, requester: Requester, req: &DmaRequests) -> Option<BusOwner> {
        match requester {
            Requester::Refresh => req.refresh.then_some(BusOwner::Refresh),
            Requester::Disk => req.disk.then_some(BusOwner::Disk),
            Requester::Audio => self.next_audio(req.audio).map(BusOwner::Audio),
            Requester::Sprite => req.sprite.map(BusOwner::Sprite),
            Requester::Bitplane => req.bitplane.map(BusOwner::Bitplane),
            Requester::Copper => req.copper.then_some(BusOwner::Copper),
            Requester::Blitter => req.blitter.then_some(BusOwner::Blitter),
            Requester::Cpu => req.cpu.then_some(BusOwner::Cpu),
        }
    }

    // Round-robin: the first requesting channel after the last one served.
    fn next_audio(&self, mask: u8) -> Option<u8> {
        (1..=4)
            .map(|k| (self.last_audio + k) % 4)
            .find(|&channel| mask & (1 << channel) != 0)
    }

    /// Owner chosen by the most recent [`BusArbiter::arbitrate`].
    #[must_use]
    pub fn owner(&self) -> BusOwner {
        self.owner
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    #[must_use]
    pub fn info(&self) -> BusInfo {
        BusInfo {
            owner: self.owner,
            stats: self.stats,
        }
    }

    pub fn inspect(&self) {
        self.published.publish(self.info());
    }

    #[must_use]
    pub fn info_cell(&self) -> InfoCell<BusInfo> {
        self.published.clone()
    }

    pub fn reset(&mut self) {
        self.last_audio = 3;
        self.owner = BusOwner::Idle;
        self.stats = BusStats::default();
    }
}

impl Default for BusArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for BusArbiter {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "owner" => Some(self.owner.name().into()),
            "stats.cpu" => Some(self.stats.cpu.into()),
            "stats.disk" => Some(self.stats.disk.into()),
            "stats.copper" => Some(self.stats.copper.into()),
            "stats.blitter" => Some(self.stats.blitter.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["owner", "stats.cpu", "stats.disk", "stats.copper", "stats.blitter"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_channels_beat_copper_and_cpu() {
        let mut arb = BusArbiter::new();
        let wants = UnitRequests {
            disk: true,
            copper: true,
            cpu: true,
            ..UnitRequests::default()
        };
        let req = DmaRequests::for_slot(SlotClaim::Disk, 0x04, wants);
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Disk);
    }

    #[test]
    fn reserved_slot_without_a_request_falls_through() {
        let mut arb = BusArbiter::new();
        let wants = UnitRequests {
            disk: false,
            cpu: true,
            ..UnitRequests::default()
        };
        let req = DmaRequests::for_slot(SlotClaim::Disk, 0x05, wants);
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Cpu);
    }

    #[test]
    fn copper_only_requests_on_even_cycles() {
        let wants = UnitRequests {
            copper: true,
            ..UnitRequests::default()
        };
        let mut arb = BusArbiter::new();
        let odd = DmaRequests::for_slot(SlotClaim::Free, 0x31, wants);
        assert_eq!(arb.arbitrate(&odd, &PRIORITY), BusOwner::Idle);
        let even = DmaRequests::for_slot(SlotClaim::Free, 0x30, wants);
        assert_eq!(arb.arbitrate(&even, &PRIORITY), BusOwner::Copper);
    }

    #[test]
    fn bitplane_beats_copper() {
        let wants = UnitRequests {
            copper: true,
            ..UnitRequests::default()
        };
        let mut arb = BusArbiter::new();
        let req = DmaRequests::for_slot(SlotClaim::Bitplane(0), 0x24, wants);
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Bitplane(0));
    }

    #[test]
    fn blitter_nasty_mode_swaps_cpu_and_blitter() {
        let req = DmaRequests {
            blitter: true,
            cpu: true,
            ..DmaRequests::default()
        };
        let mut arb = BusArbiter::new();
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Cpu);
        assert_eq!(arb.arbitrate(&req, &PRIORITY_BLITTER_NASTY), BusOwner::Blitter);
    }

    #[test]
    fn idle_blitter_leaves_the_slot_to_a_lower_priority_cpu() {
        let req = DmaRequests {
            cpu: true,
            ..DmaRequests::default()
        };
        let mut arb = BusArbiter::new();
        assert_eq!(arb.arbitrate(&req, &PRIORITY_BLITTER_NASTY), BusOwner::Cpu);
    }

    #[test]
    fn audio_channels_rotate() {
        let req = DmaRequests {
            audio: 0b0101,
            ..DmaRequests::default()
        };
        let mut arb = BusArbiter::new();
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Audio(0));
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Audio(2));
        assert_eq!(arb.arbitrate(&req, &PRIORITY), BusOwner::Audio(0));
    }

    #[test]
    fn stats_count_every_decision() {
        let mut arb = BusArbiter::new();
        arb.arbitrate(&DmaRequests::default(), &PRIORITY);
        let cpu = DmaRequests {
            cpu: true,
            ..DmaRequests::default()
        };
        arb.arbitrate(&cpu, &PRIORITY);
        arb.arbitrate(&cpu, &PRIORITY);

        assert_eq!(arb.stats().idle, 1);
        assert_eq!(arb.stats().cpu, 2);
        assert_eq!(arb.query("owner"), Some(Value::String("cpu".into())));
    }
}
