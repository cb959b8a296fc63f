// src/mbc.rs

use crate::error::EmulatorError;
use serde::{Deserialize, Serialize};

/// Defines the Memory Bank Controller type used by the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc3,
    Mbc5,
}

impl MbcType {
    /// Determines MBC Type, RAM presence, and Battery presence from the cartridge type code.
    pub fn from_header(cartridge_type_code: u8) -> Result<(Self, bool, bool), EmulatorError> {
        let result = match cartridge_type_code {
            0x00 => (MbcType::NoMbc, false, false),
            0x01 => (MbcType::Mbc1, false, false),
            0x02 => (MbcType::Mbc1, true, false),
            0x03 => (MbcType::Mbc1, true, true),
            0x08 => (MbcType::NoMbc, true, false), // ROM+RAM
            0x09 => (MbcType::NoMbc, true, true),  // ROM+RAM+BATT
            0x0F => (MbcType::Mbc3, false, true),  // MBC3+TIMER+BATT
            0x10 => (MbcType::Mbc3, true, true),   // MBC3+TIMER+RAM+BATT
            0x11 => (MbcType::Mbc3, false, false), // MBC3
            0x12 => (MbcType::Mbc3, true, false),  // MBC3+RAM
            0x13 => (MbcType::Mbc3, true, true),   // MBC3+RAM+BATT
            0x19 => (MbcType::Mbc5, false, false), // MBC5
            0x1A => (MbcType::Mbc5, true, false),  // MBC5+RAM
            0x1B => (MbcType::Mbc5, true, true),   // MBC5+RAM+BATT
            0x1C => (MbcType::Mbc5, false, false), // MBC5+RUMBLE
            0x1D => (MbcType::Mbc5, true, false),  // MBC5+RUMBLE+RAM
            0x1E => (MbcType::Mbc5, true, true),   // MBC5+RUMBLE+RAM+BATT
            _ => return Err(EmulatorError::UnsupportedMbc(cartridge_type_code)),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mbc3_rtc_only_on_timer_codes() {
        // 0x0F/0x10 carry a real-time clock; 0x11-0x13 are RTC-less MBC3.
        assert_eq!(MbcType::from_header(0x0F).unwrap(), (MbcType::Mbc3, false, true));
        assert_eq!(MbcType::from_header(0x10).unwrap(), (MbcType::Mbc3, true, true));
        assert_eq!(MbcType::from_header(0x11).unwrap(), (MbcType::Mbc3, false, false));
    }

    #[test]
    fn unknown_cartridge_type_is_rejected() {
        assert!(matches!(MbcType::from_header(0xFF), Err(EmulatorError::UnsupportedMbc(0xFF))));
    }
}
