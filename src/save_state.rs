//! Versioned save-state snapshots covering CPU, pixel unit, timer, and bus
//! state. Cartridge ROM contents are never serialized; a save state instead
//! embeds the ROM title and is rejected at load time if it doesn't match the
//! ROM currently loaded on the bus.

use crate::cpu::Cpu;
use crate::error::EmulatorError;
use crate::memory_bus::{MemoryBus, MemoryBusSnapshot};
use crate::ppu::{Ppu, PpuState};
use crate::timer::Timer;
use serde::{Deserialize, Serialize};

/// Bumped whenever the shape of `SaveState` or any nested snapshot changes
/// in a way that would make an old save file unsafe to load.
pub const SAVE_STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub struct SaveState {
    version: u32,
    rom_title: String,
    cpu: Cpu,
    ppu: PpuState,
    timer: Timer,
    memory: MemoryBusSnapshot,
}

/// Captures the current state of every device into a versioned, ROM-tagged
/// snapshot suitable for `serde_json::to_writer`/`to_vec`.
pub fn save_state(cpu: &Cpu, ppu: &Ppu, timer: &Timer, memory_bus: &MemoryBus) -> SaveState {
    SaveState {
        version: SAVE_STATE_VERSION,
        rom_title: memory_bus.rom_title(),
        cpu: cpu.clone(),
        ppu: ppu.snapshot_state(),
        timer: timer.clone(),
        memory: memory_bus.snapshot(),
    }
}

/// Restores a previously captured snapshot onto already-constructed devices.
/// The caller must have loaded the same ROM onto `memory_bus` beforehand
/// (cartridge contents are not part of the snapshot); a title or version
/// mismatch is reported as `EmulatorError::SaveStateMismatch` and leaves
/// every device untouched.
pub fn load_state(
    state: SaveState,
    cpu: &mut Cpu,
    ppu: &mut Ppu,
    timer: &mut Timer,
    memory_bus: &mut MemoryBus,
) -> Result<(), EmulatorError> {
    if state.version != SAVE_STATE_VERSION {
        return Err(EmulatorError::SaveStateMismatch(format!(
            "save state version {} is not supported (expected {})",
            state.version, SAVE_STATE_VERSION
        )));
    }
    let current_title = memory_bus.rom_title();
    if state.rom_title != current_title {
        return Err(EmulatorError::SaveStateMismatch(format!(
            "save state is for ROM '{}', but '{}' is loaded",
            state.rom_title, current_title
        )));
    }

    *cpu = state.cpu;
    ppu.restore_state(state.ppu);
    *timer = state.timer;
    memory_bus.restore_snapshot(state.memory);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100] = 0x00; // NOP
        let title = b"TEST";
        rom[0x0134..0x0134 + title.len()].copy_from_slice(title);
        rom[0x0147] = 0x00; // ROM only
        rom[0x0148] = 0x00; // 32 KiB, 2 banks
        rom[0x0149] = 0x00; // no RAM
        rom
    }

    #[test]
    fn round_trip_preserves_cpu_and_bus_state() {
        let mut memory_bus = MemoryBus::new();
        memory_bus.load_rom(&test_rom()).unwrap();
        let mut cpu = Cpu::new(true);
        let ppu = Ppu::new();
        let timer = Timer::new();

        cpu.step(&mut memory_bus).unwrap(); // executes the NOP at 0x0100
        assert_eq!(cpu.pc(), 0x0101);

        let state = save_state(&cpu, &ppu, &timer, &memory_bus);
        let bytes = serde_json::to_vec(&state).unwrap();
        let restored: SaveState = serde_json::from_slice(&bytes).unwrap();

        // A fresh set of devices, as a freshly launched emulator would have.
        let mut cpu2 = Cpu::new(true);
        let mut ppu2 = Ppu::new();
        let mut timer2 = Timer::new();
        let mut bus2 = MemoryBus::new();
        bus2.load_rom(&test_rom()).unwrap();

        load_state(restored, &mut cpu2, &mut ppu2, &mut timer2, &mut bus2).unwrap();

        assert_eq!(cpu2.pc(), 0x0101);
        assert_eq!(bus2.read_byte(0xFF0F), memory_bus.read_byte(0xFF0F));
    }

    #[test]
    fn mismatched_title_is_rejected() {
        let mut memory_bus = MemoryBus::new();
        memory_bus.load_rom(&test_rom()).unwrap();
        let cpu = Cpu::new(true);
        let ppu = Ppu::new();
        let timer = Timer::new();
        let mut state = save_state(&cpu, &ppu, &timer, &memory_bus);
        state.rom_title = "OTHER".to_string();

        let mut cpu2 = Cpu::new(true);
        let mut ppu2 = Ppu::new();
        let mut timer2 = Timer::new();
        let mut bus2 = MemoryBus::new();
        bus2.load_rom(&test_rom()).unwrap();

        let result = load_state(state, &mut cpu2, &mut ppu2, &mut timer2, &mut bus2);
        assert!(matches!(result, Err(EmulatorError::SaveStateMismatch(_))));
    }
}
