//! Configuration for the chipset.

use commodore_agnus_ocs::Region;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("drive speed {0} is not one of 1, 2, 4 or 8")]
    DriveSpeed(u8),
    #[error("{0} KiB of chip RAM is not one of 256, 512, 1024 or 2048")]
    ChipRam(u32),
    #[error("drive 0 must be connected")]
    NoBootDrive,
    #[error("inspection interval must be at least 1 ms")]
    InspectionInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChipsetConfig {
    pub region: Region,
    /// Bit cells shifted per disk slot firing. Above 1 the disk FIFO is
    /// drained directly instead of waiting for the disk DMA slots.
    pub drive_speed: u8,
    pub auto_dsksync: bool,
    pub lock_dsksync: bool,
    pub connected_drives: [bool; 4],
    pub chip_ram_kib: u32,
    /// Emulated time between two inspector publications.
    pub inspection_interval_ms: u64,
}

impl ChipsetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.drive_speed, 1 | 2 | 4 | 8) {
            return Err(ConfigError::DriveSpeed(self.drive_speed));
        }
        if !matches!(self.chip_ram_kib, 256 | 512 | 1024 | 2048) {
            return Err(ConfigError::ChipRam(self.chip_ram_kib));
        }
        if !self.connected_drives[0] {
            return Err(ConfigError::NoBootDrive);
        }
        if self.inspection_interval_ms == 0 {
            return Err(ConfigError::InspectionInterval);
        }
        Ok(())
    }

    #[must_use]
    pub fn turbo_disk(&self) -> bool {
        self.drive_speed > 1
    }
}

impl Default for ChipsetConfig {
    fn default() -> Self {
        Self {
            region: Region::Pal,
            drive_speed: 1,
            auto_dsksync: false,
            lock_dsksync: false,
            connected_drives: [true, false, false, false],
            chip_ram_kib: 512,
            inspection_interval_ms: 100,
        }
    }
}
