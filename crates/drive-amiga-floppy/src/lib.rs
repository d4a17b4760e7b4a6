//! Amiga floppy drive mechanism emulator.
//!
//! Emulates the physical drive: head positioning, motor control, disk
//! change detection, and the rotating raw bit stream under the head.
//! Control signals come from CIA-B port B; status signals feed back to
//! CIA-A port A. The drive has no clock of its own: the chipset rotates it
//! one bit cell at a time and tells it when the motor reached speed.

mod disk;

use core::fmt;

use emu_core::{Component, Cycle, InfoCell, Observable, Value};

pub use disk::{DiskError, FloppyDisk, CYLINDERS, HEADS, TRACK_BYTES, TRACK_COUNT};

/// E-clock ticks for motor spin-up (~500ms at 709 kHz).
pub const MOTOR_SPINUP_ECLOCKS: i64 = 350_000;

/// Identification code of a 3.5" double-density drive.
pub const DRIVE_ID_DD: u32 = 0xFFFF_FFFF;

/// Drive status bits for CIA-A PRA (active-low: 0 = asserted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveStatus {
    /// PA2: /DSKCHANGE: low when disk has been removed since last step.
    pub disk_change: bool,
    /// PA3: /DSKPROT: low when disk is write-protected.
    pub write_protect: bool,
    /// PA4: /DSKTRACK0: low when head is at cylinder 0.
    pub track0: bool,
    /// PA5: /DSKRDY: low when motor is at speed.
    pub ready: bool,
}

impl DriveStatus {
    /// PRA bits 2-5 as the pins read, with asserted lines pulled low.
    #[must_use]
    pub fn pra_bits(self) -> u8 {
        let mut bits = 0x3C;
        if self.disk_change {
            bits &= !0x04;
        }
        if self.write_protect {
            bits &= !0x08;
        }
        if self.track0 {
            bits &= !0x10;
        }
        if self.ready {
            bits &= !0x20;
        }
        bits
    }
}

/// Motor state latched by a select edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorChange {
    Unchanged,
    On,
    Off,
}

/// Bit under the head before it moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub bit: bool,
    /// The head passed the index hole.
    pub index: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriveInfo {
    pub number: u8,
    pub connected: bool,
    pub has_disk: bool,
    pub write_protected: bool,
    pub cylinder: u32,
    pub head: u32,
    pub offset: usize,
    pub selected: bool,
    pub motor_on: bool,
    pub spinning: bool,
    pub disk_changed: bool,
}

#[derive(Debug, Clone)]
pub struct AmigaFloppyDrive {
    number: u8,
    connected: bool,
    disk: Option<FloppyDisk>,
    cylinder: u32,
    head: u32,
    offset: usize,
    motor_on: bool,
    motor_spinning: bool,
    spin_ready_at: Option<Cycle>,
    selected: bool,
    disk_changed: bool,
    prev_step: bool,
    id_mode: bool,
    id_count: u32,
    published: InfoCell<DriveInfo>,
}

impl AmigaFloppyDrive {
    pub fn new(number: u8, connected: bool) -> Self {
        Self {
            number,
            connected,
            disk: None,
            cylinder: 0,
            head: 0,
            offset: 0,
            motor_on: false,
            motor_spinning: false,
            spin_ready_at: None,
            selected: false,
            disk_changed: true, // No disk at power-on
            prev_step: false,
            id_mode: true,
            id_count: 32,
            published: InfoCell::default(),
        }
    }

    #[must_use]
    pub fn number(&self) -> u8 {
        self.number
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Put a disk in, returning the one it replaced. The change line stays
    /// asserted until the next step pulse.
    pub fn insert_disk(&mut self, disk: FloppyDisk) -> Option<FloppyDisk> {
        let old = self.eject_disk();
        log::info!(
            "df{}: disk inserted{}",
            self.number,
            if disk.is_write_protected() { " (write protected)" } else { "" }
        );
        self.disk = Some(disk);
        old
    }

    pub fn eject_disk(&mut self) -> Option<FloppyDisk> {
        let old = self.disk.take();
        if old.is_some() {
            log::info!("df{}: disk ejected", self.number);
            self.disk_changed = true;
        }
        old
    }

    #[must_use]
    pub fn disk(&self) -> Option<&FloppyDisk> {
        self.disk.as_ref()
    }

    /// Update control signals from CIA-B PRB.
    /// All active-low: the boolean parameters are true when the signal
    /// is asserted (pin driven low).
    pub fn update_control(
        &mut self,
        step: bool,
        dir_inward: bool,
        side_upper: bool,
        sel: bool,
        motor: bool,
    ) -> MotorChange {
        if !self.connected {
            return MotorChange::Unchanged;
        }

        let mut change = MotorChange::Unchanged;
        if sel && !self.selected {
            // Falling edge of /SELx latches /MTR
            change = self.latch_motor(motor);
        } else if !sel && self.selected && self.id_mode && self.id_count > 0 {
            // Rising edge shifts out the next identification bit
            self.id_count -= 1;
        }
        self.selected = sel;

        let step_edge = step && !self.prev_step;
        self.prev_step = step;
        if !sel {
            return change;
        }

        // Head side: 0 = upper (head 1), 1 = lower (head 0)
        // The parameter is already decoded: side_upper = true means DSKSIDE* asserted (low)
        self.head = u32::from(side_upper);

        // Step on falling edge (prev was high/deasserted, now low/asserted)
        if step_edge {
            if dir_inward {
                if self.cylinder < 79 {
                    self.cylinder += 1;
                }
            } else if self.cylinder > 0 {
                self.cylinder -= 1;
            }
            // Any step pulse clears DSKCHANGE when a disk is present
            if self.disk.is_some() {
                self.disk_changed = false;
            }
        }
        change
    }

    fn latch_motor(&mut self, motor: bool) -> MotorChange {
        if motor && !self.motor_on {
            log::debug!("df{}: motor on", self.number);
            self.motor_on = true;
            self.id_mode = false;
            self.id_count = 0;
            MotorChange::On
        } else if !motor && self.motor_on {
            log::debug!("df{}: motor off", self.number);
            self.motor_on = false;
            self.motor_spinning = false;
            self.spin_ready_at = None;
            self.id_mode = true;
            self.id_count = 32;
            MotorChange::Off
        } else {
            MotorChange::Unchanged
        }
    }

    /// Motor was switched on; it reaches speed at `ready_at`.
    pub fn begin_spin_up(&mut self, ready_at: Cycle) {
        if self.motor_on && !self.motor_spinning {
            self.spin_ready_at = Some(ready_at);
        }
    }

    #[must_use]
    pub fn spin_up_deadline(&self) -> Option<Cycle> {
        self.spin_ready_at
    }

    /// Mark the motor at speed if its deadline passed. Returns `true` when
    /// that happened now.
    pub fn finish_spin_up(&mut self, now: Cycle) -> bool {
        match self.spin_ready_at {
            Some(at) if at <= now => {
                self.spin_ready_at = None;
                self.motor_spinning = true;
                true
            }
            _ => false,
        }
    }

    /// Current drive status for CIA-A PRA input.
    /// All values are active-low booleans (true = signal asserted = pin low).
    pub fn status(&self) -> DriveStatus {
        if !self.connected {
            return DriveStatus::default();
        }
        let ready = if self.id_mode {
            self.id_count < 32 && DRIVE_ID_DD & (1 << self.id_count) != 0
        } else {
            self.motor_spinning && self.disk.is_some()
        };
        DriveStatus {
            disk_change: self.disk_changed,
            write_protect: self.disk.as_ref().is_none_or(FloppyDisk::is_write_protected),
            track0: self.cylinder == 0,
            ready,
        }
    }

    fn track(&self) -> usize {
        (self.cylinder * 2 + self.head) as usize
    }

    fn track_bits(&self) -> usize {
        self.disk
            .as_ref()
            .map_or(TRACK_BYTES * 8, |disk| disk.track_bits(self.track()))
    }

    // Advance one bit cell; `true` when the head passed the index.
    fn rotate(&mut self) -> bool {
        self.offset += 1;
        if self.offset >= self.track_bits() {
            self.offset = 0;
            return true;
        }
        false
    }

    /// Read the bit under the head, then move on by one bit cell. An empty
    /// drive reads all ones.
    pub fn read_bit_and_rotate(&mut self) -> Rotation {
        let bits = self.track_bits();
        self.offset %= bits;
        let bit = self
            .disk
            .as_ref()
            .is_none_or(|disk| disk.read_bit(self.track(), self.offset));
        Rotation {
            bit,
            index: self.rotate(),
        }
    }

    /// Write a bit under the head, then move on by one bit cell. Returns
    /// `true` when the head passed the index.
    pub fn write_bit_and_rotate(&mut self, bit: bool) -> bool {
        let bits = self.track_bits();
        self.offset %= bits;
        let track = self.track();
        let offset = self.offset;
        if let Some(disk) = self.disk.as_mut() {
            disk.write_bit(track, offset, bit);
        }
        self.rotate()
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn cylinder(&self) -> u32 {
        self.cylinder
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    #[must_use]
    pub fn info(&self) -> DriveInfo {
        DriveInfo {
            number: self.number,
            connected: self.connected,
            has_disk: self.disk.is_some(),
            write_protected: self.disk.as_ref().is_some_and(FloppyDisk::is_write_protected),
            cylinder: self.cylinder,
            head: self.head,
            offset: self.offset,
            selected: self.selected,
            motor_on: self.motor_on,
            spinning: self.motor_spinning,
            disk_changed: self.disk_changed,
        }
    }

    pub fn inspect(&self) {
        self.published.publish(self.info());
    }

    #[must_use]
    pub fn info_cell(&self) -> InfoCell<DriveInfo> {
        self.published.clone()
    }
}

impl Component for AmigaFloppyDrive {
    type Snapshot = DriveInfo;

    /// The disk stays in the drive across resets.
    fn reset(&mut self, _hard: bool) {
        let disk = self.disk.take();
        let disk_changed = self.disk_changed;
        let published = self.published.clone();
        *self = Self::new(self.number, self.connected);
        self.disk = disk;
        self.disk_changed = disk_changed;
        self.published = published;
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if !self.connected {
            return writeln!(out, "df{}: not connected", self.number);
        }
        writeln!(
            out,
            "df{}: cyl {} head {} offset {} motor {}{} {}",
            self.number,
            self.cylinder,
            self.head,
            self.offset,
            if self.motor_on { "on" } else { "off" },
            if self.motor_spinning { " (ready)" } else { "" },
            if self.disk.is_some() { "disk" } else { "empty" },
        )
    }

    fn snapshot(&self) -> DriveInfo {
        self.info()
    }
}

impl Observable for AmigaFloppyDrive {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "cylinder" => Some(self.cylinder.into()),
            "head" => Some(self.head.into()),
            "offset" => Some((self.offset as u64).into()),
            "motor" => Some(self.motor_on.into()),
            "ready" => Some(self.motor_spinning.into()),
            "selected" => Some(self.selected.into()),
            "disk" => Some(self.disk.is_some().into()),
            "status" => Some(self.status().pra_bits().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["cylinder", "head", "offset", "motor", "ready", "selected", "disk", "status"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive() -> AmigaFloppyDrive {
        AmigaFloppyDrive::new(0, true)
    }

    #[test]
    fn step_toward_center() {
        let mut drive = drive();
        assert_eq!(drive.cylinder(), 0);

        // Select drive, motor on, direction inward
        drive.update_control(false, true, false, true, true);
        // Step pulse: deasserted -> asserted (falling edge)
        drive.update_control(true, true, false, true, true);
        assert_eq!(drive.cylinder(), 1);
    }

    #[test]
    fn step_toward_edge() {
        let mut drive = drive();
        // First move inward
        drive.update_control(false, true, false, true, true);
        drive.update_control(true, true, false, true, true);
        drive.update_control(false, true, false, true, true);
        drive.update_control(true, true, false, true, true);
        assert_eq!(drive.cylinder(), 2);

        // Now step toward edge (dir_inward = false)
        drive.update_control(false, false, false, true, true);
        drive.update_control(true, false, false, true, true);
        assert_eq!(drive.cylinder(), 1);
    }

    #[test]
    fn no_step_below_zero() {
        let mut drive = drive();
        drive.update_control(false, false, false, true, true);
        drive.update_control(true, false, false, true, true);
        assert_eq!(drive.cylinder(), 0);
    }

    #[test]
    fn no_step_above_79() {
        let mut drive = drive();
        // Move to track 79
        for _ in 0..80 {
            drive.update_control(false, true, false, true, true);
            drive.update_control(true, true, false, true, true);
        }
        assert_eq!(drive.cylinder(), 79);
    }

    #[test]
    fn unselected_drive_ignores_step() {
        let mut drive = drive();
        drive.update_control(false, true, false, false, false);
        drive.update_control(true, true, false, false, false);
        assert_eq!(drive.cylinder(), 0);
    }

    #[test]
    fn track0_status() {
        let drive = drive();
        assert!(drive.status().track0);
    }

    #[test]
    fn motor_latches_on_select_edge_and_spins_up_at_deadline() {
        let mut drive = drive();
        drive.insert_disk(FloppyDisk::blank());
        assert_eq!(drive.update_control(false, false, false, true, true), MotorChange::On);
        assert_eq!(
            drive.update_control(false, false, false, true, false),
            MotorChange::Unchanged,
            "MTR is only sampled on the select edge"
        );
        assert!(!drive.status().ready);

        let ready_at = Cycle::eclock(MOTOR_SPINUP_ECLOCKS);
        drive.begin_spin_up(ready_at);
        assert!(!drive.finish_spin_up(ready_at - Cycle::new(1)));
        assert!(drive.finish_spin_up(ready_at));
        assert!(drive.status().ready);
        assert_eq!(drive.spin_up_deadline(), None);
    }

    #[test]
    fn disk_change_cleared_by_step() {
        let mut drive = drive();
        assert!(drive.status().disk_change);

        drive.insert_disk(FloppyDisk::blank());
        assert!(drive.status().disk_change, "change still set until step");

        // Step clears change flag
        drive.update_control(false, true, false, true, true);
        drive.update_control(true, true, false, true, true);
        assert!(!drive.status().disk_change);

        drive.eject_disk();
        assert!(drive.status().disk_change);
    }

    #[test]
    fn rotation_reads_track_bits_and_reports_index() {
        let mut tracks = vec![vec![0x00; 1]; TRACK_COUNT];
        tracks[0] = vec![0x81];
        let mut drive = drive();
        drive.insert_disk(FloppyDisk::from_tracks(tracks).expect("valid"));

        let bits: Vec<Rotation> = (0..8).map(|_| drive.read_bit_and_rotate()).collect();
        assert!(bits[0].bit && bits[7].bit);
        assert!(bits[1..7].iter().all(|r| !r.bit));
        assert!(bits[7].index);
        assert!(!bits[6].index);
    }

    #[test]
    fn writes_land_under_the_head() {
        let mut drive = drive();
        drive.insert_disk(FloppyDisk::blank());
        drive.write_bit_and_rotate(false); // 0xAA bit 0 is set
        assert!(!drive.disk().expect("disk").read_bit(0, 0));
    }

    #[test]
    fn empty_drive_reads_ones_and_reports_protected() {
        let mut drive = drive();
        assert!(drive.read_bit_and_rotate().bit);
        assert!(drive.status().write_protect);
    }

    #[test]
    fn identification_mode_shifts_id_on_deselect() {
        let mut drive = drive();
        // Motor off: every select cycle clocks out an id bit on RDY
        drive.update_control(false, false, false, true, false);
        drive.update_control(false, false, false, false, false);
        assert!(drive.status().ready);
    }

    #[test]
    fn disconnected_drive_is_silent() {
        let mut drive = AmigaFloppyDrive::new(2, false);
        assert_eq!(drive.update_control(false, false, false, true, true), MotorChange::Unchanged);
        assert_eq!(drive.status().pra_bits(), 0x3C);
    }

    #[test]
    fn status_bits_are_active_low() {
        let status = DriveStatus {
            disk_change: true,
            write_protect: false,
            track0: true,
            ready: false,
        };
        assert_eq!(status.pra_bits(), 0x28);
    }

    #[test]
    fn head_select() {
        let mut drive = drive();
        // side_upper = true means upper head (head 1)
        drive.update_control(false, false, false, true, true);
        drive.update_control(false, false, true, true, true);
        assert_eq!(drive.head(), 1);
        // side_upper = false means lower head (head 0)
        drive.update_control(false, false, false, true, true);
        assert_eq!(drive.head(), 0);
    }
}
