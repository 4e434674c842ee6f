//! Cycle-stepped NMOS 6502.
//!
//! Each `tick()` is one clock cycle and one bus access. The core keeps its
//! position inside the current instruction between ticks, samples the
//! interrupt lines every cycle, and can hand control to host routines
//! registered at fixed addresses (traps).

mod cpu;
pub mod flags;
mod registers;
mod trap;

pub use cpu::{Interrupt, Mos6502};
pub use flags::Status;
pub use registers::Registers;
pub use trap::{TrapContext, TrapRoutine, TrapTable};
