//! Sound chip bus decoder.
//!
//! The AY-3-8912 shares VIA port A as its data bus. VIA CA2 drives BC1 and
//! CB2 drives BDIR:
//!
//! | BDIR | BC1 | Cycle |
//! |------|-----|-------|
//! | 0    | 0   | Inactive |
//! | 0    | 1   | Read register onto port A |
//! | 1    | 0   | Write port A to the latched register |
//! | 1    | 1   | Latch register address from port A |
//!
//! The decoder keeps a copy of every register written so the keyboard
//! column select (I/O port A, register 14) is available whether or not a
//! sound chip is attached.

use mos_via_6522::Via6522;
use tracing::debug;

/// Register holding the I/O port A output (keyboard columns on the Oric).
pub const IO_PORT_A: u8 = 14;

/// Sound chip driven through the bus decoder.
pub trait SoundChip {
    fn write_register(&mut self, reg: u8, value: u8);
    fn read_register(&mut self, reg: u8) -> u8;
    /// Advance one CPU cycle.
    fn tick(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusCycle {
    Inactive,
    Read,
    Write,
    Latch,
}

/// BDIR/BC1 decoder between the VIA and the sound chip.
#[derive(Debug, Clone)]
pub struct AyBus {
    address_latch: u8,
    registers: [u8; 16],
    cycle: BusCycle,
}

impl Default for AyBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AyBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address_latch: 0,
            registers: [0; 16],
            cycle: BusCycle::Inactive,
        }
    }

    /// Sample the VIA control lines and act on a new bus cycle. Each cycle
    /// type acts once when entered, so holding BDIR high writes once.
    pub fn decode(&mut self, via: &mut Via6522, sound: Option<&mut dyn SoundChip>) {
        let cycle = match (via.cb2(), via.ca2()) {
            (false, false) => BusCycle::Inactive,
            (false, true) => BusCycle::Read,
            (true, false) => BusCycle::Write,
            (true, true) => BusCycle::Latch,
        };
        if cycle == self.cycle {
            return;
        }
        self.cycle = cycle;

        match cycle {
            BusCycle::Inactive => {}
            BusCycle::Latch => self.address_latch = via.port_a_pins() & 0x0F,
            BusCycle::Write => {
                let value = via.port_a_pins();
                self.registers[usize::from(self.address_latch)] = value;
                if let Some(sound) = sound {
                    sound.write_register(self.address_latch, value);
                }
            }
            BusCycle::Read => {
                let value = match sound {
                    Some(sound) => sound.read_register(self.address_latch),
                    None => self.registers[usize::from(self.address_latch)],
                };
                debug!(reg = self.address_latch, value, "sound chip read cycle");
                via.set_port_a_input(value);
            }
        }
    }

    /// Keyboard column select, active low.
    #[must_use]
    pub fn io_port_a(&self) -> u8 {
        self.registers[usize::from(IO_PORT_A)]
    }

    /// Last value written to a register.
    #[must_use]
    pub fn register(&self, reg: u8) -> u8 {
        self.registers[usize::from(reg & 0x0F)]
    }

    #[must_use]
    pub fn address_latch(&self) -> u8 {
        self.address_latch
    }
}
