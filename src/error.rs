//! Error types shared across the emulator core.

use thiserror::Error;

/// Everything that can go wrong while loading a cartridge, executing code,
/// or restoring a save state.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("malformed cartridge: {0}")]
    MalformedCartridge(String),

    #[error("unsupported MBC / cartridge type byte {0:#04X}")]
    UnsupportedMbc(u8),

    #[error("save state mismatch: {0}")]
    SaveStateMismatch(String),

    #[error("unknown opcode {opcode:#04X} at PC={pc:#06X}")]
    UnknownOpcode { opcode: u8, pc: u16 },
}
