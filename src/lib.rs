//! Core of a cycle-driven Sharp LR35902 ("Game Boy") emulator.
//!
//! This crate implements the CPU, pixel unit, timer, sound unit, input
//! latch, memory bus / bank controllers, and the frame driver that ties
//! them together. It has no dependency on any particular display, audio,
//! or input backend; those are supplied by a host application (see the
//! `gb_core_app` binary for an SDL2-based one).

pub mod apu;
pub mod cpu;
pub mod error;
pub mod joypad;
pub mod mbc;
pub mod memory_bus;
pub mod memory_map;
pub mod ppu;
pub mod rtc;
pub mod save_state;
pub mod timer;
