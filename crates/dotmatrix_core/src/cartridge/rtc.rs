use crate::error::Error;
use crate::state::{StateReader, StateWriter};

/// Size of the persisted RTC record.
pub(crate) const RTC_RECORD_SIZE: usize = 16;

/// Wall-clock backed real-time clock for MBC3 timer cartridges.
///
/// The clock is stored as a unix base time plus game-written offset
/// fields, so it keeps running while the emulator is closed. `offset_days`
/// carries the day counter's ninth bit in bit 8 and the sticky day-carry
/// flag in bit 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RtcState {
    pub base_time_unix: u64,
    pub offset_seconds: u8,
    pub offset_minutes: u8,
    pub offset_hours: u8,
    pub offset_days: u16,
    pub halted: bool,
    /// Wall-clock time captured when the halt flag was last set. Not
    /// persisted; a state loaded with `halted` set freezes at load time.
    pub halt_time_unix: u64,
}

/// A point in time as the RTC registers expose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RtcTime {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days: u32,
}

impl RtcState {
    pub(crate) fn new(now_unix: u64) -> Self {
        Self {
            base_time_unix: now_unix,
            offset_seconds: 0,
            offset_minutes: 0,
            offset_hours: 0,
            offset_days: 0,
            halted: false,
            halt_time_unix: now_unix,
        }
    }

    /// Current clock value. While halted the clock is frozen at the moment
    /// the halt flag was set.
    pub(crate) fn current_time(&self, now_unix: u64) -> RtcTime {
        let now = if self.halted {
            self.halt_time_unix
        } else {
            now_unix
        };

        let mut t = now.saturating_sub(self.base_time_unix);
        t += self.offset_seconds as u64;
        t += self.offset_minutes as u64 * 60;
        t += self.offset_hours as u64 * 3600;
        t += (self.offset_days & 0x01FF) as u64 * 86400;

        RtcTime {
            seconds: (t % 60) as u8,
            minutes: ((t / 60) % 60) as u8,
            hours: ((t / 3600) % 24) as u8,
            days: (t / 86400) as u32,
        }
    }

    /// Sticky day-carry flag (offset_days bit 9).
    pub(crate) fn day_carry(&self) -> bool {
        self.offset_days & 0x0200 != 0
    }

    /// Apply a game write to one of the RTC offset registers (selector
    /// 0x08..=0x0C). Returns `true` when a stored field changed and the
    /// record should be persisted.
    pub(crate) fn write_register(&mut self, selector: u8, value: u8, now_unix: u64) -> bool {
        match selector {
            0x08 => {
                let changed = self.offset_seconds != value;
                self.offset_seconds = value;
                changed
            }
            0x09 => {
                let changed = self.offset_minutes != value;
                self.offset_minutes = value;
                changed
            }
            0x0A => {
                let changed = self.offset_hours != value;
                self.offset_hours = value;
                changed
            }
            0x0B => {
                let new_days = (self.offset_days & 0x0300) | value as u16;
                let changed = self.offset_days != new_days;
                self.offset_days = new_days;
                changed
            }
            0x0C => {
                // Bit 0 is day bit 8, bit 7 the sticky carry; bit 6 halts
                // the clock.
                let new_days = (self.offset_days & 0x00FF)
                    | ((value & 0x01) as u16) << 8
                    | ((value & 0x80) as u16) << 2;
                let changed = self.offset_days != new_days;
                self.offset_days = new_days;
                self.set_halted(value & 0x40 != 0, now_unix);
                changed
            }
            _ => false,
        }
    }

    /// Toggle the halt flag. Setting it freezes the clock at `now_unix`;
    /// clearing it shifts the base time forward so the halted interval
    /// never elapsed from the game's point of view.
    fn set_halted(&mut self, halted: bool, now_unix: u64) {
        if halted == self.halted {
            return;
        }
        if halted {
            self.halt_time_unix = now_unix;
        } else {
            let frozen_for = now_unix.saturating_sub(self.halt_time_unix);
            self.base_time_unix = self.base_time_unix.saturating_add(frozen_for);
        }
        self.halted = halted;
    }

    /// Encode the 16-byte persistence record.
    pub(crate) fn to_record(&self) -> [u8; RTC_RECORD_SIZE] {
        let mut w = StateWriter::new();
        self.write_fields(&mut w);
        let bytes = w.into_bytes();
        let mut record = [0u8; RTC_RECORD_SIZE];
        record[..bytes.len()].copy_from_slice(&bytes);
        record
    }

    pub(crate) fn from_record(record: &[u8], now_unix: u64) -> Result<Self, Error> {
        let mut r = StateReader::new(record, "RTC record");
        Self::read_fields(&mut r, now_unix)
    }

    /// Field layout shared by the RTC file and the save-state stream:
    /// `u64 base_time_unix, u8 seconds, u8 minutes, u8 hours, u16 days,
    /// u8 halted, u8 reserved[2]`, little-endian throughout.
    pub(crate) fn write_fields(&self, w: &mut StateWriter) {
        w.write_u64(self.base_time_unix);
        w.write_u8(self.offset_seconds);
        w.write_u8(self.offset_minutes);
        w.write_u8(self.offset_hours);
        w.write_u16(self.offset_days);
        w.write_bool(self.halted);
        w.write_u8(0);
        w.write_u8(0);
    }

    pub(crate) fn read_fields(r: &mut StateReader<'_>, now_unix: u64) -> Result<Self, Error> {
        let base_time_unix = r.read_u64()?;
        let offset_seconds = r.read_u8()?;
        let offset_minutes = r.read_u8()?;
        let offset_hours = r.read_u8()?;
        let offset_days = r.read_u16()?;
        let halted = r.read_bool()?;
        r.read_u8()?;
        r.read_u8()?;
        Ok(Self {
            base_time_unix,
            offset_seconds,
            offset_minutes,
            offset_hours,
            offset_days,
            halted,
            halt_time_unix: now_unix,
        })
    }
}
