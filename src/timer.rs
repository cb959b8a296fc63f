use crate::memory_bus::MemoryBus;
use crate::memory_map::{DIV_ADDR, TAC_ADDR, TIMA_ADDR, TIMER_INTERRUPT_BIT, TMA_ADDR};
use serde::{Deserialize, Serialize};

/// Cycles per DIV increment: 4194304 Hz / 16384 Hz.
const DIV_PERIOD: u32 = 256;

/// TIMA increment periods selected by TAC's low two bits, in CPU cycles.
const TIMA_PERIODS: [u32; 4] = [1024, 16, 64, 256];

/// Drives the DIV/TIMA/TMA/TAC registers off the shared cycle budget.
#[derive(Clone, Serialize, Deserialize)]
pub struct Timer {
    div_counter: u32,
    tima_counter: u32,
    div: u8,
    tima: u8,
    tma: u8,
    tac: u8,
}

impl Timer {
    pub fn new() -> Self {
        Timer {
            div_counter: 0,
            tima_counter: 0,
            div: 0xAC, // Matches the post-boot DIV value MemoryBus seeds on startup
            tima: 0x00,
            tma: 0x00,
            tac: 0x00,
        }
    }

    /// Advances the timer by the given number of CPU cycles, requesting a
    /// timer interrupt on TIMA overflow.
    pub fn step(&mut self, cycles: u32, memory_bus: &mut MemoryBus) {
        // Registers are still addressable through the bus (the CPU writes
        // DIV/TIMA/TMA/TAC directly), so pull the authoritative values first.
        self.tma = memory_bus.read_byte(TMA_ADDR);
        self.tac = memory_bus.read_byte(TAC_ADDR);

        // A CPU write to DIV resets it to 0 regardless of the written value;
        // the bus zeroes the register on write, which we detect here since
        // our own increments never produce a mismatch with the bus's copy.
        if memory_bus.read_byte(DIV_ADDR) != self.div {
            self.div = 0;
            self.div_counter = 0;
        }

        self.div_counter += cycles;
        while self.div_counter >= DIV_PERIOD {
            self.div_counter -= DIV_PERIOD;
            self.div = self.div.wrapping_add(1);
        }
        memory_bus.set_io_reg_direct(DIV_ADDR, self.div);

        let enabled = (self.tac & 0x04) != 0;
        if enabled {
            let period = TIMA_PERIODS[(self.tac & 0x03) as usize];
            self.tima_counter += cycles;
            while self.tima_counter >= period {
                self.tima_counter -= period;
                let (next, overflowed) = self.tima.overflowing_add(1);
                if overflowed {
                    self.tima = self.tma;
                    memory_bus.request_interrupt(TIMER_INTERRUPT_BIT);
                } else {
                    self.tima = next;
                }
            }
        }
        memory_bus.set_io_reg_direct(TIMA_ADDR, self.tima);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_bus::MemoryBus;
    use crate::memory_map::IF_ADDR;

    #[test]
    fn tima_overflow_reloads_from_tma_and_requests_interrupt() {
        let mut timer = Timer::new();
        let mut bus = MemoryBus::new();
        bus.write_byte(TAC_ADDR, 0x05); // enabled, clock/16
        bus.write_byte(TMA_ADDR, 0xFE);
        bus.write_byte(IF_ADDR, 0x00);

        // clock/16: 256 cycles advance TIMA by 16 ticks, overflowing 0xFF once per 16*256 cycles.
        for _ in 0..16 {
            timer.step(256, &mut bus);
        }

        assert_eq!(bus.read_byte(TIMA_ADDR), 0xFE);
        assert_ne!(bus.read_byte(IF_ADDR) & (1 << TIMER_INTERRUPT_BIT), 0);
    }
}
