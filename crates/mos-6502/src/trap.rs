//! Address traps.
//!
//! A trap replaces whatever code lives at an address with a host routine.
//! When the core is about to fetch an opcode from a trapped address it
//! runs the routine instead, spending that fetch cycle, and continues at
//! the address the routine returns.

use std::collections::HashMap;
use std::fmt;

use emu_core::Bus;

use crate::Registers;

/// A host routine. Returns the address to continue at.
pub type TrapRoutine = Box<dyn FnMut(&mut TrapContext<'_>) -> u16>;

/// What a trap routine may touch.
pub struct TrapContext<'a> {
    pub regs: &'a mut Registers,
    pub bus: &'a mut dyn Bus,
    remove: bool,
}

impl TrapContext<'_> {
    /// Deregister this routine once it returns.
    pub fn remove_trap(&mut self) {
        self.remove = true;
    }
}

/// Address to routine map. At most one routine per address.
#[derive(Default)]
pub struct TrapTable {
    routines: HashMap<u16, TrapRoutine>,
}

impl TrapTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `routine` at `address`, replacing any previous one.
    /// Returns true if a routine was replaced.
    pub fn insert(&mut self, address: u16, routine: TrapRoutine) -> bool {
        self.routines.insert(address, routine).is_some()
    }

    /// Returns true if a routine was registered.
    pub fn remove(&mut self, address: u16) -> bool {
        self.routines.remove(&address).is_some()
    }

    #[must_use]
    pub fn contains(&self, address: u16) -> bool {
        self.routines.contains_key(&address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Run the routine at `address`, if any, and return its continuation.
    pub(crate) fn run(
        &mut self,
        address: u16,
        regs: &mut Registers,
        bus: &mut dyn Bus,
    ) -> Option<u16> {
        let routine = self.routines.get_mut(&address)?;
        let mut ctx = TrapContext {
            regs,
            bus,
            remove: false,
        };
        let next = routine(&mut ctx);
        if ctx.remove {
            self.routines.remove(&address);
        }
        Some(next)
    }
}

impl fmt::Debug for TrapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut addresses: Vec<_> = self.routines.keys().copied().collect();
        addresses.sort_unstable();
        f.debug_struct("TrapTable")
            .field("addresses", &addresses)
            .finish()
    }
}
