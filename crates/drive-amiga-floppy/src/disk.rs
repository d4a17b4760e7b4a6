//! Raw bit-stream floppy media.
//!
//! A disk is 160 tracks of already-encoded flux data, one byte buffer per
//! track, read and written a bit at a time, MSB first.

use thiserror::Error;

pub const CYLINDERS: usize = 80;
pub const HEADS: usize = 2;
pub const TRACK_COUNT: usize = CYLINDERS * HEADS;

/// Raw length of a standard double-density track.
pub const TRACK_BYTES: usize = 12_668;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiskError {
    #[error("expected 160 tracks, found {0}")]
    TrackCount(usize),
    #[error("track {0} is empty")]
    EmptyTrack(usize),
    #[error("track {track} holds {len} bytes, limit is {max}")]
    TrackTooLong { track: usize, len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FloppyDisk {
    tracks: Vec<Vec<u8>>,
    write_protected: bool,
}

impl FloppyDisk {
    /// Unformatted disk: every track holds MFM gap filler.
    pub fn blank() -> Self {
        Self {
            tracks: vec![vec![0xAA; TRACK_BYTES]; TRACK_COUNT],
            write_protected: false,
        }
    }

    /// Disk from pre-encoded tracks, indexed `cylinder * 2 + head`.
    ///
    /// Track lengths may differ from [`TRACK_BYTES`], but a track is never
    /// empty or longer than one and a half standard tracks.
    pub fn from_tracks(tracks: Vec<Vec<u8>>) -> Result<Self, DiskError> {
        if tracks.len() != TRACK_COUNT {
            return Err(DiskError::TrackCount(tracks.len()));
        }
        let max = TRACK_BYTES + TRACK_BYTES / 2;
        for (track, data) in tracks.iter().enumerate() {
            if data.is_empty() {
                return Err(DiskError::EmptyTrack(track));
            }
            if data.len() > max {
                return Err(DiskError::TrackTooLong {
                    track,
                    len: data.len(),
                    max,
                });
            }
        }
        Ok(Self {
            tracks,
            write_protected: false,
        })
    }

    #[must_use]
    pub fn write_protected(mut self, protected: bool) -> Self {
        self.write_protected = protected;
        self
    }

    #[must_use]
    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    #[must_use]
    pub fn track(&self, track: usize) -> &[u8] {
        &self.tracks[track]
    }

    /// Length of `track` in bits.
    #[must_use]
    pub fn track_bits(&self, track: usize) -> usize {
        self.tracks[track].len() * 8
    }

    #[must_use]
    pub fn read_bit(&self, track: usize, bit: usize) -> bool {
        let byte = self.tracks[track][bit / 8];
        byte & (0x80 >> (bit % 8)) != 0
    }

    /// Returns `false` without touching the data when the disk is protected.
    pub fn write_bit(&mut self, track: usize, bit: usize, value: bool) -> bool {
        if self.write_protected {
            return false;
        }
        let mask = 0x80 >> (bit % 8);
        let byte = &mut self.tracks[track][bit / 8];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        true
    }
}

impl Default for FloppyDisk {
    fn default() -> Self {
        Self::blank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_disk_is_gap_filler() {
        let disk = FloppyDisk::blank();
        assert_eq!(disk.track(0).len(), TRACK_BYTES);
        assert!(disk.track(159).iter().all(|&b| b == 0xAA));
        assert!(disk.read_bit(5, 0));
        assert!(!disk.read_bit(5, 1));
    }

    #[test]
    fn from_tracks_validates_shape() {
        assert_eq!(
            FloppyDisk::from_tracks(vec![vec![0; 10]; 3]),
            Err(DiskError::TrackCount(3))
        );

        let mut tracks = vec![vec![0x44; 100]; TRACK_COUNT];
        tracks[7].clear();
        assert_eq!(FloppyDisk::from_tracks(tracks), Err(DiskError::EmptyTrack(7)));

        let mut tracks = vec![vec![0x44; 100]; TRACK_COUNT];
        tracks[3] = vec![0; TRACK_BYTES * 2];
        assert!(matches!(
            FloppyDisk::from_tracks(tracks),
            Err(DiskError::TrackTooLong { track: 3, .. })
        ));
    }

    #[test]
    fn protected_disk_ignores_writes() {
        let mut disk = FloppyDisk::blank().write_protected(true);
        assert!(!disk.write_bit(0, 1, true));
        assert!(!disk.read_bit(0, 1));

        disk.set_write_protected(false);
        assert!(disk.write_bit(0, 1, true));
        assert!(disk.read_bit(0, 1));
    }
}
