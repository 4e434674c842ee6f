//! Processor status register (P).

/// Carry.
pub const C: u8 = 0x01;
/// Zero.
pub const Z: u8 = 0x02;
/// IRQ disable. NMI ignores it.
pub const I: u8 = 0x04;
/// Decimal mode for ADC/SBC.
pub const D: u8 = 0x08;
/// Break. Exists only in the copy pushed by BRK and PHP.
pub const B: u8 = 0x10;
/// Unused, always reads as 1.
pub const U: u8 = 0x20;
/// Overflow.
pub const V: u8 = 0x40;
/// Negative.
pub const N: u8 = 0x80;

/// Live processor status. Bit 5 is always set; B is never stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl Status {
    #[must_use]
    pub const fn new() -> Self {
        Self(U)
    }

    /// Status as pulled by PLP/RTI: B dropped, U forced.
    #[must_use]
    pub const fn from_byte(value: u8) -> Self {
        Self((value | U) & !B)
    }

    /// Copy pushed by BRK and PHP.
    #[must_use]
    pub const fn to_byte_brk(self) -> u8 {
        self.0 | U | B
    }

    /// Copy pushed on IRQ and NMI entry.
    #[must_use]
    pub const fn to_byte_irq(self) -> u8 {
        (self.0 | U) & !B
    }

    #[must_use]
    pub const fn is_set(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn set_if(&mut self, flag: u8, condition: bool) {
        if condition {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// Set N and Z from a result byte.
    pub fn update_nz(&mut self, value: u8) {
        self.set_if(N, value & 0x80 != 0);
        self.set_if(Z, value == 0);
    }
}
