//! Cycle-stepped Oric-1 / Atmos emulator core.
//!
//! The master clock ticks at CPU cycle rate (1 MHz). The 6502, the 6522
//! VIA and the Microdisc's WD1793 all advance once per tick; the AY sound
//! chip is reached only through the VIA's port A and CA2/CB2 lines. One PAL
//! frame is 312 lines x 64 cycles = 19,968 CPU cycles.

pub mod ay;
mod bus;
pub mod config;
mod keyboard;
mod microdisc;
mod oric;
pub mod tape;

pub use ay::{AyBus, SoundChip};
pub use bus::{AddressBus, ChipSelect, Device};
pub use config::{ConfigError, OricConfig, OricModel, RomRoutines, RomType};
pub use keyboard::{KeyboardMatrix, KeyboardScan};
pub use microdisc::Microdisc;
pub use oric::{CYCLES_PER_FRAME, FrameTimer, IRQ_SOURCE_DISK, IRQ_SOURCE_VIA, Oric, VideoChip};
pub use tape::{SharedTapeDeck, TapeDeck};
