//! Shared traits for the cycle-stepped Oric hardware core.
//!
//! One call to a component's `tick` is one processor cycle. Every chip is
//! advanced in lock-step by the machine loop; nothing runs on its own clock.

mod bus;
mod cpu;
mod observable;
mod tickable;

pub use bus::{Bus, SimpleBus};
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use tickable::Tickable;
