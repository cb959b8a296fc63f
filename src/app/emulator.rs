use super::constants; // Use constants from sibling module
use gb_core::apu::Apu;
use gb_core::cpu::Cpu;
use gb_core::error::EmulatorError;
use gb_core::memory_bus::MemoryBus;
use gb_core::ppu::Ppu;
use gb_core::save_state::{self, SaveState};
use gb_core::timer::Timer;
use std::fs;
use std::path::Path;

/// Represents the core Game Boy emulator components.
pub struct Emulator {
    pub cpu: Cpu,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub memory_bus: MemoryBus,
}

impl Emulator {
    /// Creates a new Emulator instance, loads the ROM, and initializes components.
    pub fn new(rom_path: &Path, skip_boot_rom: bool) -> Result<Self, String> {
        println!("Initializing APU...");
        let apu = Apu::new();

        println!("Initializing memory bus...");
        let mut memory_bus = MemoryBus::new();

        println!("Loading ROM: {}", rom_path.display());
        let rom_data = fs::read(rom_path)
            .map_err(|e| format!("Failed to read ROM '{}': {}", rom_path.display(), e))?;
        let rom_size = rom_data.len();
        memory_bus
            .load_rom(&rom_data)
            .map_err(|e| format!("Failed to load ROM '{}': {}", rom_path.display(), e))?;
        println!("ROM loaded successfully ({} bytes)", rom_size);

        println!("Initializing CPU (skip_boot_rom={})...", skip_boot_rom);
        let cpu = Cpu::new(skip_boot_rom);

        if skip_boot_rom {
            println!("Skipping boot ROM - initializing I/O registers post-boot...");
            Cpu::initialize_post_boot_io(&mut memory_bus);
        }

        println!("Initializing PPU...");
        let ppu = Ppu::new();

        println!("Initializing timer...");
        let timer = Timer::new();

        Ok(Emulator {
            cpu,
            ppu,
            apu,
            timer,
            memory_bus,
        })
    }

    /// Runs the emulator components for approximately one frame's worth of CPU cycles.
    /// Returns `Ok(())` or the error the CPU encountered.
    pub fn run_frame(&mut self) -> Result<(), EmulatorError> {
        let mut cycles_this_frame: u32 = 0;
        while cycles_this_frame < constants::CYCLES_PER_FRAME {
            let executed_cycles = self.cpu.step(&mut self.memory_bus)? as u32;

            self.timer.step(executed_cycles, &mut self.memory_bus);
            self.ppu.step(executed_cycles, &mut self.memory_bus);
            self.apu.step(executed_cycles, &mut self.memory_bus);

            cycles_this_frame += executed_cycles;
        }
        self.memory_bus.tick_rtc(cycles_this_frame);
        Ok(())
    }

    /// Captures a versioned, ROM-tagged snapshot of every device.
    pub fn save_state(&self) -> SaveState {
        save_state::save_state(&self.cpu, &self.ppu, &self.timer, &self.memory_bus)
    }

    /// Restores a snapshot previously returned by `save_state`. The ROM
    /// currently loaded must match the one the snapshot was taken against.
    pub fn load_state(&mut self, state: SaveState) -> Result<(), EmulatorError> {
        save_state::load_state(state, &mut self.cpu, &mut self.ppu, &mut self.timer, &mut self.memory_bus)
    }
}
