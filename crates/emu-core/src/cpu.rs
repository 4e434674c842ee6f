//! Processor core trait.

use crate::Bus;

/// A processor core.
///
/// Unlike other `Tickable` components, a CPU takes the bus in its tick
/// method: it performs exactly one bus access per cycle, and the bus is
/// shared with the rest of the machine between cycles.
pub trait Cpu {
    /// Register snapshot type.
    type Registers;

    /// Advance by one clock cycle.
    fn tick<B: Bus>(&mut self, bus: &mut B);

    /// Current program counter.
    fn pc(&self) -> u16;

    /// Snapshot of all registers.
    fn registers(&self) -> Self::Registers;

    /// True once the core has stopped (jammed) and will not fetch again.
    fn is_halted(&self) -> bool;

    /// Reset the core, loading the program counter from the reset vector.
    fn reset<B: Bus>(&mut self, bus: &mut B);
}
