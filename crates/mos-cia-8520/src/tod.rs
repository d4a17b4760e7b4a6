//! 24-bit time-of-day counter.
//!
//! The 8520 TOD is a plain binary counter split into three bytes, clocked by
//! an external pulse (VSYNC on CIA-A, HSYNC on CIA-B). Reads and writes go
//! through a latch/stop protocol so that the CPU sees consistent values.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TodInfo {
    pub counter: u32,
    pub latch: u32,
    pub alarm: u32,
    pub stopped: bool,
    pub latched: bool,
    pub matching: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tod {
    counter: [u8; 3], // lo, mid, hi
    latch: [u8; 3],
    alarm: [u8; 3],
    stopped: bool,
    latched: bool,
    matching: bool,
}

fn join(bytes: [u8; 3]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

fn split(value: u32) -> [u8; 3] {
    let [lo, mid, hi, _] = value.to_le_bytes();
    [lo, mid, hi]
}

impl Tod {
    pub fn new() -> Self {
        Self::default()
    }

    /// One external pulse. Returns `true` on the pulse that made the counter
    /// equal to the alarm (the ICR bit 2 edge).
    pub fn increment(&mut self) -> bool {
        if self.stopped {
            return false;
        }

        for byte in &mut self.counter {
            *byte = byte.wrapping_add(1);
            if *byte != 0 {
                break;
            }
        }
        self.check_alarm()
    }

    fn check_alarm(&mut self) -> bool {
        if self.counter != self.alarm {
            self.matching = false;
            return false;
        }
        let edge = !self.matching;
        self.matching = true;
        edge
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        join(self.counter)
    }

    #[must_use]
    pub fn alarm(&self) -> u32 {
        join(self.alarm)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Read one counter byte (0 = LSB). Reading the MSB freezes the value
    /// the next two reads return; reading the LSB releases it.
    pub fn read(&mut self, index: usize, alarm_select: bool) -> u8 {
        if index == 2 && !alarm_select && !self.latched {
            self.latch = self.counter;
            self.latched = true;
        }
        let value = self.peek(index);
        if index == 0 {
            self.latched = false;
        }
        value
    }

    /// Counter byte as a read would return it, without touching the latch.
    #[must_use]
    pub fn peek(&self, index: usize) -> u8 {
        if self.latched {
            self.latch[index]
        } else {
            self.counter[index]
        }
    }

    /// Write one byte (0 = LSB) of the counter, or of the alarm when CRB bit
    /// 7 is set. Writing the counter MSB stops it until the LSB is written.
    ///
    /// Returns `true` when the LSB write restarts the counter on the alarm
    /// value (the ICR bit 2 edge). Alarm writes never raise it.
    pub fn write(&mut self, index: usize, value: u8, alarm_select: bool) -> bool {
        if alarm_select {
            self.alarm[index] = value;
            return false;
        }
        self.counter[index] = value;
        match index {
            2 => {
                self.stopped = true;
                false
            }
            0 => {
                self.stopped = false;
                self.check_alarm()
            }
            _ => false,
        }
    }

    pub fn set_counter(&mut self, value: u32) {
        self.counter = split(value);
    }

    pub fn set_alarm(&mut self, value: u32) {
        self.alarm = split(value);
    }

    #[must_use]
    pub fn info(&self) -> TodInfo {
        TodInfo {
            counter: self.counter(),
            latch: join(self.latch),
            alarm: self.alarm(),
            stopped: self.stopped,
            latched: self.latched,
            matching: self.matching,
        }
    }
}

impl fmt::Display for Tod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [lo, mid, hi] = self.counter;
        write!(f, "{hi:02X}:{mid:02X}:{lo:02X}")?;
        if self.stopped {
            f.write_str(" (stopped)")?;
        }
        Ok(())
    }
}
