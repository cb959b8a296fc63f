use serde::{Deserialize, Serialize};

/// T-cycles per emulated RTC second (the Sharp LR35902 runs at 4.194304 MHz).
const CYCLES_PER_SECOND: u32 = 4_194_304;

/// Represents the Real-Time Clock registers for MBC3.
///
/// Advances off the emulated cycle budget handed to `advance()` rather than
/// wall-clock time, so headless runs and save-state round trips stay
/// deterministic regardless of how long a session sits idle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RtcRegisters {
    seconds: u8, // 0x08 (0-59)
    minutes: u8, // 0x09 (0-59)
    hours: u8,   // 0x0A (0-23)
    dl: u8,      // 0x0B (Lower 8 bits of day counter)
    dh: u8,      // 0x0C (Upper 1 bit of day counter + flags)

    cycle_accumulator: u32,
}

impl RtcRegisters {
    const DAY_CARRY_BIT: u8 = 0b0000_0001; // Bit 0: Day Counter Carry Bit (1=Counter overflowed)
    const HALT_BIT: u8 = 0b0100_0000; // Bit 6: Halt (0=Active, 1=Stop Timer)
    const DAY_OVERFLOW_BIT: u8 = 0b1000_0000; // Bit 7: Day Counter Overflow (Read Only?)

    /// Creates a new, zeroed RTC register set.
    pub fn new() -> Self {
        RtcRegisters::default()
    }

    /// Advances the clock by `cycles` T-cycles, cascading through
    /// seconds/minutes/hours/days exactly as real wall-clock elapsed time would.
    pub fn advance(&mut self, cycles: u32) {
        if (self.dh & RtcRegisters::HALT_BIT) != 0 {
            return;
        }

        self.cycle_accumulator += cycles;
        let elapsed_secs = (self.cycle_accumulator / CYCLES_PER_SECOND) as u64;
        if elapsed_secs == 0 {
            return;
        }
        self.cycle_accumulator %= CYCLES_PER_SECOND;

        let total_seconds = u64::from(self.seconds) + elapsed_secs;
        self.seconds = (total_seconds % 60) as u8;

        let total_minutes = u64::from(self.minutes) + (total_seconds / 60);
        self.minutes = (total_minutes % 60) as u8;

        let total_hours = u64::from(self.hours) + (total_minutes / 60);
        self.hours = (total_hours % 24) as u8;

        // Handle day counter (9 bits total: DH bit 0 + DL)
        let mut days = u64::from(self.dl) | (u64::from(self.dh & RtcRegisters::DAY_CARRY_BIT) << 8);
        days += total_hours / 24;

        if days >= 512 {
            // Day counter wraps around after 511 days
            days %= 512;
            self.dh |= RtcRegisters::DAY_OVERFLOW_BIT; // Set overflow flag
        }

        self.dl = (days & 0xFF) as u8;
        // Update DH: Preserve Halt bit, clear old carry, set new carry from bit 8 of days
        self.dh = (self.dh & RtcRegisters::HALT_BIT) | // Keep Halt bit
                  ((days >> 8) as u8 & RtcRegisters::DAY_CARRY_BIT) | // Set new Carry bit
                  (self.dh & RtcRegisters::DAY_OVERFLOW_BIT); // Keep potentially set Overflow bit
    }

    /// Reads the value of a selected RTC register.
    pub fn read(&self, reg_select: u8) -> u8 {
        match reg_select {
            0x08 => self.seconds,
            0x09 => self.minutes,
            0x0A => self.hours,
            0x0B => self.dl,
            0x0C => self.dh,
            _ => 0xFF, // Invalid RTC register selection
        }
    }

    /// Writes a value to a selected RTC register.
    pub fn write(&mut self, reg_select: u8, value: u8) {
        match reg_select {
            0x08 => self.seconds = value.min(59), // Clamp to valid range
            0x09 => self.minutes = value.min(59),
            0x0A => self.hours = value.min(23),
            0x0B => self.dl = value, // Full 8 bits writeable
            0x0C => {
                // Only Day Carry (bit 0) and Halt (bit 6) are writeable
                self.dh = (value & (RtcRegisters::DAY_CARRY_BIT | RtcRegisters::HALT_BIT))
                    | (self.dh & RtcRegisters::DAY_OVERFLOW_BIT); // Preserve read-only overflow bit
            }
            _ => {} // Invalid RTC register selection
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_rolls_seconds_into_minutes() {
        let mut rtc = RtcRegisters::new();
        rtc.advance(CYCLES_PER_SECOND * 61);
        assert_eq!(rtc.read(0x08), 1);
        assert_eq!(rtc.read(0x09), 1);
    }

    #[test]
    fn halt_bit_stops_advancement() {
        let mut rtc = RtcRegisters::new();
        rtc.write(0x0C, RtcRegisters::HALT_BIT);
        rtc.advance(CYCLES_PER_SECOND * 5);
        assert_eq!(rtc.read(0x08), 0);
    }
}
